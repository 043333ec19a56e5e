//! Ownership and mode normalization for the fixed directory roots.
//!
//! Runs before anything else at startup. The pass is all-or-nothing: the
//! first failed metadata operation aborts with the operational exit status,
//! with no retry and no partial-success continuation.

use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use tracing::{info, warn};

use crate::config::{Config, Owner};
use crate::error::StartupError;

/// Entry names never entered or touched: VCS metadata, virtualenvs, vendored
/// modules, volume mount points, and env-file links.
const EXCLUDED_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".venv",
    "venv",
    "node_modules",
    "vendor",
    "volumes",
    ".env",
];

/// Modes applied to one root's subtree.
#[derive(Debug, Clone, Copy)]
struct TreeModes {
    dir: u32,
    file: u32,
}

/// Group-writable, setgid directories; the service and its sidecars share
/// state through these.
const STRICT: TreeModes = TreeModes {
    dir: 0o2770,
    file: 0o660,
};
/// Logs and scratch space additionally allow world reads.
const RELAXED: TreeModes = TreeModes {
    dir: 0o2775,
    file: 0o664,
};

/// Applies ownership and modes over all five roots.
///
/// Roots that do not exist are skipped with a warning; they are provisioned
/// by the image, not created here.
///
/// # Errors
///
/// The first failed traversal, ownership or mode change aborts the pass
/// (exit status 2).
pub fn normalize_permissions(config: &Config) -> Result<(), StartupError> {
    let roots = [
        (&config.home_dir, STRICT),
        (&config.configs_dir, STRICT),
        (&config.data_dir, STRICT),
        (&config.logs_dir, RELAXED),
        (&config.tmp_dir, RELAXED),
    ];
    for (root, modes) in roots {
        if root.symlink_metadata().is_err() {
            warn!("skipping missing directory root {}", root.display());
            continue;
        }
        apply_tree(root, config.owner, modes)?;
        info!("normalized ownership and modes under {}", root.display());
    }
    Ok(())
}

fn apply_tree(path: &Path, owner: Owner, modes: TreeModes) -> Result<(), StartupError> {
    let metadata = path
        .symlink_metadata()
        .map_err(|source| StartupError::Traversal {
            path: path.to_path_buf(),
            source,
        })?;
    // Symlinks are never followed; chown/chmod through one would escape the tree.
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    // chown first: ownership changes clear set-id bits.
    std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid)).map_err(|source| {
        StartupError::Chown {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let mode = if metadata.is_dir() {
        modes.dir
    } else {
        modes.file
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
        StartupError::Chmod {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if metadata.is_dir() {
        let entries = fs::read_dir(path).map_err(|source| StartupError::Traversal {
            path: path.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StartupError::Traversal {
                path: path.to_path_buf(),
                source,
            })?;
            if is_excluded(&entry.file_name()) {
                continue;
            }
            apply_tree(&entry.path(), owner, modes)?;
        }
    }
    Ok(())
}

fn is_excluded(name: &OsStr) -> bool {
    EXCLUDED_NAMES
        .iter()
        .any(|excluded| name == OsStr::new(excluded))
}
