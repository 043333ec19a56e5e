//! Immutable startup configuration, populated once from the environment.
//!
//! Every tunable comes from an `RT_`-prefixed variable with the deployment's
//! default (the tier marker `ENV` is the one image-level exception). Nothing
//! else in the crate reads ambient environment state; the resolved `Config`
//! is passed explicitly to every step of the startup sequence.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StartupError;
use crate::readiness::PollSchedule;

/// Hotkey the service always runs under.
pub const WALLET_HOTKEY: &str = "default";
/// Checkpoint value that marks the external bootstrap as complete.
pub const CHECKPOINT_THRESHOLD: i64 = 4;

const DEFAULT_UID: u32 = 10001;
const DEFAULT_GID: u32 = 10001;

/// Deployment tier the container runs in, from `ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentTier {
    Production,
    Staging,
    /// Anything else, including an unset `ENV`.
    Other,
}

impl DeploymentTier {
    fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.eq_ignore_ascii_case("production") => Self::Production,
            Some(value) if value.eq_ignore_ascii_case("staging") => Self::Staging,
            _ => Self::Other,
        }
    }

    /// Whether startup must wait for the checkpoint counter.
    #[must_use]
    pub fn gates_on_checkpoint(self) -> bool {
        matches!(self, Self::Other)
    }
}

/// Ownership applied during permission normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Resolved configuration for one container start.
#[derive(Debug, Clone)]
pub struct Config {
    pub tier: DeploymentTier,

    pub home_dir: PathBuf,
    pub configs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub owner: Owner,

    pub wallet_dir: PathBuf,
    pub wallet_name: String,
    pub checkpoint_file: PathBuf,

    pub subtensor_endpoint: String,
    pub netuid: u16,
    pub api_port: u16,
    pub epoch_length: u64,
    pub hf_repo_id: String,

    pub python_bin: String,
    pub launch_group: String,

    pub wallet_wait: PollSchedule,
    pub checkpoint_wait: PollSchedule,
    pub settle_delay: Duration,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (exit status 1) for malformed values.
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for values that fail to parse, and for
    /// owner names that cannot be resolved to ids.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StartupError> {
        let tier = DeploymentTier::from_raw(lookup("ENV").as_deref());

        let home_dir = dir_var(&lookup, "RT_HOME_DIR", "/app");
        let configs_dir = dir_var(&lookup, "RT_CONFIGS_DIR", "/app/configs");
        let data_dir = dir_var(&lookup, "RT_DATA_DIR", "/var/lib/rest-scoring-api");
        let logs_dir = dir_var(&lookup, "RT_LOGS_DIR", "/var/log/rest-scoring-api");
        let tmp_dir = dir_var(&lookup, "RT_TMP_DIR", "/tmp/rest-scoring-api");

        let owner = Owner {
            uid: id_var(&lookup, "RT_UID", "RT_USER", IdKind::User)?,
            gid: id_var(&lookup, "RT_GID", "RT_GROUP", IdKind::Group)?,
        };

        let checkpoint_dir =
            lookup("RT_CHECKPOINT_DIR").map_or_else(|| tmp_dir.clone(), PathBuf::from);
        let checkpoint_file = checkpoint_dir
            .join(lookup("RT_CHECKPOINT_FILENAME").unwrap_or_else(|| "checkpoint".to_string()));

        let btcli_data_dir = dir_var(&lookup, "RT_BTCLI_DATA_DIR", "/var/lib/btcli");
        let wallet_dir = lookup("RT_BTCLI_WALLET_DIR")
            .map_or_else(|| btcli_data_dir.join("wallets"), PathBuf::from);

        // Validated even when the composed form is overridden below.
        let subtensor_port: u16 = parsed_var(&lookup, "RT_SUBTENSOR_PORT", 9944)?;
        let subtensor_endpoint = lookup("RT_SUBTENSOR_NETWORK").unwrap_or_else(|| {
            format!(
                "{}://{}:{}",
                lookup("RT_SUBTENSOR_SCHEME").unwrap_or_else(|| "ws".to_string()),
                lookup("RT_SUBTENSOR_HOST").unwrap_or_else(|| "subtensor".to_string()),
                subtensor_port,
            )
        });

        let wallet_attempts = positive_var(&lookup, "RT_STARTUP_WALLET_WAIT_ATTEMPTS", 60)?;
        let wallet_interval: u64 = parsed_var(&lookup, "RT_STARTUP_WALLET_WAIT_INTERVAL_SECS", 1)?;
        let checkpoint_interval: u64 =
            parsed_var(&lookup, "RT_STARTUP_CHECKPOINT_INTERVAL_SECS", 1)?;
        let checkpoint_max: Option<u32> =
            optional_var(&lookup, "RT_STARTUP_CHECKPOINT_MAX_ATTEMPTS")?;
        let settle_secs: u64 = parsed_var(&lookup, "RT_STARTUP_SETTLE_SECS", 5)?;

        Ok(Self {
            tier,
            home_dir,
            configs_dir,
            data_dir,
            logs_dir,
            tmp_dir,
            owner,
            wallet_dir,
            wallet_name: lookup("RT_WALLET_NAME").unwrap_or_else(|| "scoring-api".to_string()),
            checkpoint_file,
            subtensor_endpoint,
            netuid: parsed_var(&lookup, "RT_SUBNET_NETUID", 2)?,
            api_port: parsed_var(&lookup, "RT_SCORING_API_PORT", 47920)?,
            epoch_length: parsed_var(&lookup, "RT_SCORING_API_EPOCH_LENGTH", 60)?,
            hf_repo_id: lookup("RT_HF_REPO_ID")
                .unwrap_or_else(|| "redteamsubnet61/rest-scoring-api".to_string()),
            python_bin: lookup("RT_PYTHON_BIN").unwrap_or_else(|| "python".to_string()),
            launch_group: lookup("RT_LAUNCH_GROUP").unwrap_or_else(|| "docker".to_string()),
            wallet_wait: PollSchedule {
                interval: Duration::from_secs(wallet_interval),
                max_attempts: Some(wallet_attempts),
                log_every: 1,
            },
            checkpoint_wait: PollSchedule {
                interval: Duration::from_secs(checkpoint_interval),
                max_attempts: checkpoint_max,
                log_every: 10,
            },
            settle_delay: Duration::from_secs(settle_secs),
        })
    }

    /// Scoring result cache location handed to the service.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(".cache")
    }
}

fn dir_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> PathBuf {
    lookup(var).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

fn parsed_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, StartupError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(parse_error) => Err(StartupError::InvalidEnv {
                var,
                reason: parse_error.to_string(),
                value,
            }),
        },
    }
}

fn positive_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u32,
) -> Result<u32, StartupError> {
    let parsed = parsed_var::<u32>(lookup, var, default)?;
    if parsed == 0 {
        return Err(StartupError::InvalidEnv {
            var,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(parsed)
}

fn optional_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, StartupError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(parse_error) => Err(StartupError::InvalidEnv {
                var,
                reason: parse_error.to_string(),
                value,
            }),
        },
    }
}

#[derive(Debug, Clone, Copy)]
enum IdKind {
    User,
    Group,
}

impl IdKind {
    const fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

/// Numeric id variables take precedence; a name is only resolved when the
/// numeric variable is unset, and the built-in default needs no lookup at all.
fn id_var(
    lookup: &impl Fn(&str) -> Option<String>,
    numeric_var: &'static str,
    name_var: &'static str,
    kind: IdKind,
) -> Result<u32, StartupError> {
    if let Some(value) = lookup(numeric_var) {
        return match value.trim().parse::<u32>() {
            Ok(id) => Ok(id),
            Err(parse_error) => Err(StartupError::InvalidEnv {
                var: numeric_var,
                reason: parse_error.to_string(),
                value,
            }),
        };
    }
    match lookup(name_var) {
        Some(name) => resolve_id(&name, kind),
        None => Ok(match kind {
            IdKind::User => DEFAULT_UID,
            IdKind::Group => DEFAULT_GID,
        }),
    }
}

#[cfg(unix)]
fn resolve_id(name: &str, kind: IdKind) -> Result<u32, StartupError> {
    let resolved = match kind {
        IdKind::User => {
            nix::unistd::User::from_name(name).map(|entry| entry.map(|user| user.uid.as_raw()))
        }
        IdKind::Group => {
            nix::unistd::Group::from_name(name).map(|entry| entry.map(|group| group.gid.as_raw()))
        }
    };
    match resolved {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(StartupError::OwnerLookup {
            kind: kind.label(),
            name: name.to_string(),
            reason: "no such entry".to_string(),
        }),
        Err(errno) => Err(StartupError::OwnerLookup {
            kind: kind.label(),
            name: name.to_string(),
            reason: errno.to_string(),
        }),
    }
}

#[cfg(not(unix))]
fn resolve_id(name: &str, kind: IdKind) -> Result<u32, StartupError> {
    Err(StartupError::OwnerLookup {
        kind: kind.label(),
        name: name.to_string(),
        reason: "name lookup is unsupported on this platform".to_string(),
    })
}
