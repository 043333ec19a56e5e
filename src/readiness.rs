//! Blocking readiness gates polled before the service is launched.
//!
//! Both gates are synchronous sleeps on the only thread of control; ordering
//! relative to the rest of startup is fixed by the caller.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::error::StartupError;

/// Cadence of a polling wait.
///
/// A `max_attempts` of `None` polls until the condition holds. The checkpoint
/// gate is unbounded by default but accepts a bound from the environment, so
/// a deployment can impose a deadline without changing the polling logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    /// Log progress every this many attempts.
    pub log_every: u32,
}

/// Blocks until the wallet directory exists.
///
/// Only existence is consulted, never contents. The first check happens
/// immediately, so a directory present at call time returns without sleeping.
///
/// # Errors
///
/// Times out (exit status 1) once the attempt budget is exhausted.
pub fn wait_for_wallet_directory(path: &Path, schedule: PollSchedule) -> Result<(), StartupError> {
    let budget = schedule.max_attempts.unwrap_or(u32::MAX);
    let cadence = schedule.log_every.max(1);
    for attempt in 1..=budget {
        if path.is_dir() {
            info!("wallet directory {} is present", path.display());
            return Ok(());
        }
        if attempt % cadence == 0 {
            info!(
                "waiting for wallet directory {} ({attempt}/{budget})",
                path.display()
            );
        }
        if attempt < budget {
            thread::sleep(schedule.interval);
        }
    }
    Err(StartupError::WalletWaitTimeout {
        path: path.to_path_buf(),
        attempts: budget,
    })
}

/// Blocks until the checkpoint file holds a value of at least `threshold`.
///
/// A missing, unreadable or unparsable file counts as "not ready" rather than
/// an error. Progress is logged only every `log_every` attempts to keep the
/// gate from flooding the log.
///
/// # Errors
///
/// Only when the schedule carries an attempt bound and it is exhausted.
pub fn wait_for_checkpoint(
    path: &Path,
    threshold: i64,
    schedule: PollSchedule,
) -> Result<(), StartupError> {
    let cadence = schedule.log_every.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match read_checkpoint(path) {
            Some(value) if value >= threshold => {
                info!(
                    "checkpoint {} reached {value} (threshold {threshold})",
                    path.display()
                );
                return Ok(());
            }
            value => {
                if attempt % cadence == 0 {
                    info!(
                        "checkpoint {} at {value:?}, waiting for {threshold} (attempt {attempt})",
                        path.display()
                    );
                }
            }
        }
        if let Some(budget) = schedule.max_attempts
            && attempt >= budget
        {
            return Err(StartupError::CheckpointWaitTimeout {
                path: path.to_path_buf(),
                threshold,
                attempts: budget,
            });
        }
        thread::sleep(schedule.interval);
    }
}

fn read_checkpoint(path: &Path) -> Option<i64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast(max_attempts: Option<u32>) -> PollSchedule {
        PollSchedule {
            interval: Duration::ZERO,
            max_attempts,
            log_every: 10,
        }
    }

    #[test]
    fn wallet_present_at_time_zero_returns_without_sleeping() {
        let wallets = tempfile::tempdir().unwrap();
        let slow = PollSchedule {
            interval: Duration::from_secs(30),
            max_attempts: Some(60),
            log_every: 1,
        };

        let started = Instant::now();
        wait_for_wallet_directory(wallets.path(), slow).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wallet_never_appearing_exhausts_the_budget() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("wallets");

        let result = wait_for_wallet_directory(&missing, fast(Some(3)));
        let Err(StartupError::WalletWaitTimeout { path, attempts }) = result else {
            panic!("expected a wallet timeout");
        };
        assert_eq!(path, missing);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn wallet_path_must_be_a_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let file = scratch.path().join("wallets");
        fs::write(&file, b"not a directory").unwrap();

        let result = wait_for_wallet_directory(&file, fast(Some(2)));
        assert!(matches!(result, Err(StartupError::WalletWaitTimeout { .. })));
    }

    #[test]
    fn checkpoint_at_threshold_is_ready() {
        let scratch = tempfile::tempdir().unwrap();
        let checkpoint = scratch.path().join("checkpoint");

        for content in ["4", "5", " 4\n"] {
            fs::write(&checkpoint, content).unwrap();
            wait_for_checkpoint(&checkpoint, 4, fast(None)).unwrap();
        }
    }

    #[test]
    fn checkpoint_below_threshold_keeps_polling_until_the_bound() {
        let scratch = tempfile::tempdir().unwrap();
        let checkpoint = scratch.path().join("checkpoint");
        fs::write(&checkpoint, "3").unwrap();

        let result = wait_for_checkpoint(&checkpoint, 4, fast(Some(5)));
        let Err(StartupError::CheckpointWaitTimeout { attempts, .. }) = result else {
            panic!("expected a checkpoint timeout");
        };
        assert_eq!(attempts, 5);
    }

    #[test]
    fn absent_checkpoint_counts_as_not_ready() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("checkpoint");

        let result = wait_for_checkpoint(&missing, 4, fast(Some(2)));
        assert!(matches!(result, Err(StartupError::CheckpointWaitTimeout { .. })));
    }

    #[test]
    fn garbage_checkpoint_counts_as_not_ready() {
        let scratch = tempfile::tempdir().unwrap();
        let checkpoint = scratch.path().join("checkpoint");
        fs::write(&checkpoint, "almost there").unwrap();

        let result = wait_for_checkpoint(&checkpoint, 4, fast(Some(2)));
        assert!(matches!(result, Err(StartupError::CheckpointWaitTimeout { .. })));
    }
}
