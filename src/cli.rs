//! Command-line surface of the entrypoint.
//!
//! Three modes: the default `start` sequence, a `bash` escape hatch for
//! debugging inside the container, and a usage error for anything else.

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    /// Log output format.
    #[arg(
        long = "log-format",
        env = "RT_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Compact,
        global = true
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available startup modes; no subcommand means `start`.
#[derive(Debug, Default, Subcommand)]
pub enum Command {
    /// Normalize permissions, wait for readiness, then hand off to the
    /// scoring service.
    #[default]
    #[command(visible_aliases = ["run", "up"])]
    Start,

    /// Drop into a shell, or run the given tokens under `bash` and forward
    /// the exit code.
    #[command(visible_aliases = ["shell", "sh"])]
    Bash {
        /// Passed through to `bash` verbatim (e.g. `-c "echo hi"`).
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },
}

/// Supported log output formats for the startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match *self {
            Self::Compact => "compact",
            Self::Json => "json",
            Self::Pretty => "pretty",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_defaults_to_start() {
        let invocation = Cli::try_parse_from(["entrypoint"]).unwrap();
        assert!(invocation.command.is_none());
        assert_eq!(invocation.log_format, LogFormat::Compact);
    }

    #[test]
    fn start_family_tokens_select_start() {
        for token in ["start", "run", "up"] {
            let invocation = Cli::try_parse_from(["entrypoint", token]).unwrap();
            assert!(matches!(invocation.command, Some(Command::Start)), "token {token}");
        }
    }

    #[test]
    fn bash_tokens_pass_through_hyphen_values() {
        let invocation = Cli::try_parse_from(["entrypoint", "bash", "-c", "echo hi"]).unwrap();
        let Some(Command::Bash { tokens }) = invocation.command else {
            panic!("expected bash mode");
        };
        assert_eq!(tokens, ["-c", "echo hi"]);
    }

    #[test]
    fn bash_without_tokens_is_interactive() {
        let invocation = Cli::try_parse_from(["entrypoint", "shell"]).unwrap();
        let Some(Command::Bash { tokens }) = invocation.command else {
            panic!("expected bash mode");
        };
        assert!(tokens.is_empty());
    }

    #[test]
    fn unrecognized_tokens_are_rejected() {
        assert!(Cli::try_parse_from(["entrypoint", "--frobnicate"]).is_err());
        assert!(Cli::try_parse_from(["entrypoint", "frobnicate"]).is_err());
    }

    #[test]
    fn log_format_is_selectable() {
        let invocation =
            Cli::try_parse_from(["entrypoint", "--log-format", "json", "start"]).unwrap();
        assert_eq!(invocation.log_format, LogFormat::Json);
    }
}
