//! Startup failure taxonomy.
//!
//! The two non-zero exit statuses are kept deliberately distinct so the
//! orchestration layer can tell misconfiguration from operational failure.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Usage errors, malformed configuration, and readiness timeouts.
pub const EXIT_USAGE: i32 = 1;
/// Filesystem mutation, traversal, and handoff failures.
pub const EXIT_OPERATIONAL: i32 = 2;

/// Everything that can abort the startup sequence.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot resolve {kind} {name:?}: {reason}")]
    OwnerLookup {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("wallet directory {} did not appear within {attempts} polls", .path.display())]
    WalletWaitTimeout { path: PathBuf, attempts: u32 },

    #[error("checkpoint {} did not reach {threshold} within {attempts} polls", .path.display())]
    CheckpointWaitTimeout {
        path: PathBuf,
        threshold: i64,
        attempts: u32,
    },

    #[error("failed to traverse {}: {source}", .path.display())]
    Traversal { path: PathBuf, source: io::Error },

    #[error("failed to change ownership of {}: {source}", .path.display())]
    Chown { path: PathBuf, source: io::Error },

    #[error("failed to change mode of {}: {source}", .path.display())]
    Chmod { path: PathBuf, source: io::Error },

    #[error("cannot resolve launch group {name:?}: {reason}")]
    LaunchGroup { name: String, reason: String },

    #[error("failed to exec {program}: {source}")]
    Exec { program: String, source: io::Error },
}

impl StartupError {
    /// Process exit status reported for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidEnv { .. }
            | Self::OwnerLookup { .. }
            | Self::WalletWaitTimeout { .. }
            | Self::CheckpointWaitTimeout { .. } => EXIT_USAGE,
            Self::Traversal { .. }
            | Self::Chown { .. }
            | Self::Chmod { .. }
            | Self::LaunchGroup { .. }
            | Self::Exec { .. } => EXIT_OPERATIONAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_misconfiguration_exit_one() {
        let timeout = StartupError::WalletWaitTimeout {
            path: PathBuf::from("/var/lib/btcli/wallets"),
            attempts: 60,
        };
        assert_eq!(timeout.exit_code(), EXIT_USAGE);

        let invalid = StartupError::InvalidEnv {
            var: "RT_SCORING_API_PORT",
            value: "not-a-port".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(invalid.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn operational_failures_exit_two() {
        let chown = StartupError::Chown {
            path: PathBuf::from("/app"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(chown.exit_code(), EXIT_OPERATIONAL);

        let group = StartupError::LaunchGroup {
            name: "docker".to_string(),
            reason: "no such group".to_string(),
        };
        assert_eq!(group.exit_code(), EXIT_OPERATIONAL);
    }
}
