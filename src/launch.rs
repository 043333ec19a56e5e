//! Process handoff: building the scoring service invocation and replacing
//! the entrypoint with it, or with a debugging shell.

use std::convert::Infallible;
use std::process::Command;
use std::thread;

use tracing::{debug, info};

use crate::config::{Config, WALLET_HOTKEY};
use crate::error::StartupError;

/// Module executed by the configured interpreter.
const SERVICE_MODULE: &str = "src.api";

/// Identity the handed-off process runs under.
///
/// Kept as a capability of its own rather than a hard-coded mechanism:
/// `Inherit` leaves the entrypoint's identity untouched, `Group` is the
/// `sg <group>` shape used to grant the service access to the
/// container-runtime socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchIdentity {
    Inherit,
    /// Run with the named group as the process group id.
    Group(String),
}

impl LaunchIdentity {
    /// # Errors
    ///
    /// Fails when the named group cannot be resolved (exit status 2).
    pub fn apply(&self, command: &mut Command) -> Result<(), StartupError> {
        match self {
            Self::Inherit => Ok(()),
            Self::Group(name) => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::CommandExt as _;

                    let group = nix::unistd::Group::from_name(name)
                        .map_err(|errno| StartupError::LaunchGroup {
                            name: name.clone(),
                            reason: errno.to_string(),
                        })?
                        .ok_or_else(|| StartupError::LaunchGroup {
                            name: name.clone(),
                            reason: "no such group".to_string(),
                        })?;
                    command.gid(group.gid.as_raw());
                    Ok(())
                }
                #[cfg(not(unix))]
                {
                    let _ = command;
                    Err(StartupError::LaunchGroup {
                        name: name.clone(),
                        reason: "group switching is unsupported on this platform".to_string(),
                    })
                }
            }
        }
    }
}

/// Builds the scoring service invocation from the resolved configuration.
#[must_use]
pub fn service_command(config: &Config) -> Command {
    let mut command = Command::new(&config.python_bin);
    command
        .arg("-m")
        .arg(SERVICE_MODULE)
        .arg("--wallet.name")
        .arg(&config.wallet_name)
        .arg("--wallet.path")
        .arg(&config.wallet_dir)
        .arg("--wallet.hotkey")
        .arg(WALLET_HOTKEY)
        .arg("--subtensor.network")
        .arg(&config.subtensor_endpoint)
        .arg("--netuid")
        .arg(config.netuid.to_string())
        .arg("--scoring_api.port")
        .arg(config.api_port.to_string())
        .arg("--scoring_api.epoch_length")
        .arg(config.epoch_length.to_string())
        .arg("--validator.cache_dir")
        .arg(config.cache_dir())
        .arg("--validator.hf_repo_id")
        .arg(&config.hf_repo_id);
    command
}

/// Hands control to the scoring service after the settle delay.
///
/// On success this never returns: the entrypoint's process image is replaced
/// by the service, running under the configured launch group.
///
/// # Errors
///
/// Fails when the launch group cannot be resolved or the exec itself fails
/// (both exit status 2).
pub fn launch(config: &Config) -> Result<Infallible, StartupError> {
    info!(
        "readiness confirmed, settling for {:?} before handoff",
        config.settle_delay
    );
    thread::sleep(config.settle_delay);

    let mut command = service_command(config);
    LaunchIdentity::Group(config.launch_group.clone()).apply(&mut command)?;

    info!(
        "handing off to {} -m {SERVICE_MODULE} (group {})",
        config.python_bin, config.launch_group
    );
    exec(command, &config.python_bin)
}

/// Runs `bash` with the given tokens in place of the entrypoint; no tokens
/// means an interactive shell. The shell's exit code becomes the container's.
///
/// # Errors
///
/// Fails only when the shell itself cannot be executed (exit status 2).
pub fn run_shell(tokens: &[String]) -> Result<Infallible, StartupError> {
    debug!("dropping into bash with {} token(s)", tokens.len());
    let mut command = Command::new("bash");
    command.args(tokens);
    exec(command, "bash")
}

#[cfg(unix)]
fn exec(mut command: Command, program: &str) -> Result<Infallible, StartupError> {
    use std::os::unix::process::CommandExt as _;

    // exec only returns on failure.
    Err(StartupError::Exec {
        program: program.to_string(),
        source: command.exec(),
    })
}

#[cfg(not(unix))]
fn exec(mut command: Command, program: &str) -> Result<Infallible, StartupError> {
    // No process replacement available: forward the child's exit code instead.
    let status = command.status().map_err(|source| StartupError::Exec {
        program: program.to_string(),
        source,
    })?;
    std::process::exit(status.code().unwrap_or(crate::error::EXIT_OPERATIONAL));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::ffi::{OsStr, OsString};

    fn default_config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn service_command_carries_the_full_flag_set() {
        let command = service_command(&default_config());

        assert_eq!(command.get_program(), OsStr::new("python"));
        let args: Vec<OsString> = command.get_args().map(OsString::from).collect();
        let expected: Vec<OsString> = [
            "-m",
            "src.api",
            "--wallet.name",
            "scoring-api",
            "--wallet.path",
            "/var/lib/btcli/wallets",
            "--wallet.hotkey",
            "default",
            "--subtensor.network",
            "ws://subtensor:9944",
            "--netuid",
            "2",
            "--scoring_api.port",
            "47920",
            "--scoring_api.epoch_length",
            "60",
            "--validator.cache_dir",
            "/var/lib/rest-scoring-api/.cache",
            "--validator.hf_repo_id",
            "redteamsubnet61/rest-scoring-api",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn inherit_identity_changes_nothing() {
        let mut command = Command::new("true");
        LaunchIdentity::Inherit.apply(&mut command).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn unknown_group_is_an_operational_error() {
        let mut command = Command::new("true");
        let result =
            LaunchIdentity::Group("no-such-group-for-sure".to_string()).apply(&mut command);
        let Err(error) = result else {
            panic!("expected a launch group error");
        };
        assert!(matches!(error, StartupError::LaunchGroup { .. }));
        assert_eq!(error.exit_code(), crate::error::EXIT_OPERATIONAL);
    }
}
