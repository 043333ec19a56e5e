//! Binary shim for the entrypoint.
//!
//! Maps CLI parse failures to the usage exit status (clap would default to
//! 2, which is reserved for operational failures here) and startup failures
//! to their own codes.

use std::process;

use clap::Parser as _;
use clap::error::ErrorKind;
use tracing::error;

use scoring_api_entrypoint::cli::Cli;
use scoring_api_entrypoint::error::EXIT_USAGE;
use scoring_api_entrypoint::inner_main;

fn main() {
    let invocation = match Cli::try_parse() {
        Ok(invocation) => invocation,
        Err(parse_error) => {
            let code = match parse_error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            drop(parse_error.print());
            process::exit(code);
        }
    };

    if let Err(startup_error) = inner_main(invocation) {
        error!("startup failed: {startup_error}");
        process::exit(startup_error.exit_code());
    }
}
