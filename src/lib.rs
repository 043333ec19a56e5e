//! Entrypoint for the scoring API container.
//!
//! Brings the container filesystem into a known ownership/permission state,
//! blocks until external readiness conditions hold, then replaces itself
//! with the scoring service. A `bash` escape hatch is provided for debugging
//! inside the container.
//!
//! Exposed as a library so the binary shim stays thin and the integration
//! tests can reach the same types.

pub mod cli;
pub mod config;
pub mod error;
pub mod launch;
#[cfg(unix)]
pub mod permissions;
pub mod readiness;

use std::sync::Once;

use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use crate::cli::{Cli, Command, LogFormat};
use crate::config::{CHECKPOINT_THRESHOLD, Config};
use crate::error::StartupError;

static INIT_TRACING: Once = Once::new();

fn init_tracing(format: LogFormat) {
    INIT_TRACING.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The entrypoint's main function; called from the binary shim.
///
/// # Errors
///
/// Returns the startup failure, which the shim maps to the exit status.
pub fn inner_main(invocation: Cli) -> Result<(), StartupError> {
    init_tracing(invocation.log_format);

    match invocation.command.unwrap_or_default() {
        Command::Start => start_sequence(),
        Command::Bash { tokens } => match launch::run_shell(&tokens)? {},
    }
}

/// The ordering here is fixed: permissions are normalized before any wait,
/// the wallet gate precedes the (tier-gated) checkpoint gate, and handoff
/// comes last.
fn start_sequence() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    info!(
        "starting {} {} (tier {:?})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.tier
    );

    #[cfg(unix)]
    permissions::normalize_permissions(&config)?;

    readiness::wait_for_wallet_directory(&config.wallet_dir, config.wallet_wait)?;

    if config.tier.gates_on_checkpoint() {
        readiness::wait_for_checkpoint(
            &config.checkpoint_file,
            CHECKPOINT_THRESHOLD,
            config.checkpoint_wait,
        )?;
    } else {
        info!(
            "deployment tier {:?} skips the checkpoint gate",
            config.tier
        );
    }

    match launch::launch(&config)? {}
}
