//! Configuration types

use crate::error::{ConfigError, LiveStateError, LiveStateResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Permission bits for a newly created backing file.
pub const DEFAULT_FILE_MODE: u32 = 0o660;

/// Permission bits for parent directories created on first write.
pub const DEFAULT_DIR_MODE: u32 = 0o770;

const MAX_MODE: u32 = 0o7777;

static DEFAULT_BASE_DIR: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Set the process-wide base directory for relative state paths.
///
/// Only consulted when a live file is constructed without an explicit
/// base directory. Existing instances are not affected.
pub fn set_default_base_dir(dir: Option<PathBuf>) {
    let mut guard = match DEFAULT_BASE_DIR.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = dir;
}

/// Current process-wide base directory, if one is set.
pub fn default_base_dir() -> Option<PathBuf> {
    match DEFAULT_BASE_DIR.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Resolve a state path against an optional base directory.
///
/// Absolute paths are returned unchanged. Relative paths are joined onto
/// `base_dir` when it is set and non-empty.
pub fn resolve_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(base) if !path.is_absolute() && !base.as_os_str().is_empty() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// Construction-time settings for a live file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStateConfig {
    /// Base directory for relative paths. `None` keeps them cwd-relative.
    pub base_dir: Option<PathBuf>,
    /// Mode used when the backing file is created.
    pub file_mode: u32,
    /// Mode used when missing parent directories are created.
    pub dir_mode: u32,
}

impl Default for LiveStateConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}

impl LiveStateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Resolve `path` against this config's base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(path, self.base_dir.as_deref())
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - both modes fit in 0o7777
    /// - file_mode grants the owner read and write
    /// - dir_mode grants the owner read, write and traverse
    pub fn validate(&self) -> LiveStateResult<()> {
        if self.file_mode > MAX_MODE {
            return Err(invalid_mode("file_mode", self.file_mode, "mode must fit in 0o7777"));
        }

        if self.file_mode & 0o600 != 0o600 {
            return Err(invalid_mode(
                "file_mode",
                self.file_mode,
                "owner must be able to read and write the state file",
            ));
        }

        if self.dir_mode > MAX_MODE {
            return Err(invalid_mode("dir_mode", self.dir_mode, "mode must fit in 0o7777"));
        }

        if self.dir_mode & 0o700 != 0o700 {
            return Err(invalid_mode(
                "dir_mode",
                self.dir_mode,
                "owner must have rwx on created directories",
            ));
        }

        Ok(())
    }
}

fn invalid_mode(field: &str, mode: u32, reason: &str) -> LiveStateError {
    LiveStateError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: format!("{:#o}", mode),
        reason: reason.to_string(),
    })
}
