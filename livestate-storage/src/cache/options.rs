//! Construction options for [`LiveFile`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use livestate_core::{default_base_dir, LiveStateConfig, LiveStateResult};

use super::freshness::Watermark;
use super::live_file::{LiveFile, State};
use super::policy::{AccessContext, ErrorPolicy, PanicPolicy};
use crate::fs::{FileSystem, OsFileSystem};

/// Produces the value used when the backing file is missing or empty.
pub type DefaultFn<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Observer fired after every successful reload, with the lock still held.
pub type LoadedCallback<T> = Box<dyn Fn(&AccessContext<'_>, &T) + Send + Sync>;

/// Builder for a [`LiveFile`].
///
/// # Example
///
/// ```ignore
/// let settings = LiveFile::builder("settings.json", Settings::default)
///     .base_dir("/var/lib/myapp")
///     .error_policy(LogPolicy)
///     .on_loaded(|ctx, s: &Settings| tracing::info!(path = %ctx.path.display(), ?s, "reloaded"))
///     .build()?;
/// ```
pub struct LiveFileBuilder<T> {
    path: PathBuf,
    default_fn: DefaultFn<T>,
    error_policy: Arc<dyn ErrorPolicy>,
    on_loaded: Option<LoadedCallback<T>>,
    filesystem: Arc<dyn FileSystem>,
    config: LiveStateConfig,
}

impl<T> LiveFileBuilder<T> {
    pub fn new<F>(path: impl Into<PathBuf>, default_fn: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            default_fn: Box::new(default_fn),
            error_policy: Arc::new(PanicPolicy),
            on_loaded: None,
            filesystem: Arc::new(OsFileSystem),
            config: LiveStateConfig::default(),
        }
    }

    /// Replace the error policy. Defaults to [`PanicPolicy`].
    pub fn error_policy<P>(mut self, policy: P) -> Self
    where
        P: ErrorPolicy + 'static,
    {
        self.error_policy = Arc::new(policy);
        self
    }

    /// Register an observer for every successful reload from disk.
    pub fn on_loaded<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AccessContext<'_>, &T) + Send + Sync + 'static,
    {
        self.on_loaded = Some(Box::new(callback));
        self
    }

    /// Replace the filesystem. Defaults to [`OsFileSystem`].
    pub fn filesystem<F>(mut self, filesystem: F) -> Self
    where
        F: FileSystem + 'static,
    {
        self.filesystem = Arc::new(filesystem);
        self
    }

    /// Base directory for a relative path. Overrides the process default.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.base_dir = Some(dir.into());
        self
    }

    /// Replace the whole config (base directory and permission modes).
    pub fn config(mut self, config: LiveStateConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the config and create the controller.
    ///
    /// Performs no file I/O; the backing file need not exist.
    pub fn build(self) -> LiveStateResult<LiveFile<T>> {
        self.config.validate()?;
        Ok(self.into_live_file())
    }

    pub(crate) fn into_live_file(self) -> LiveFile<T> {
        let base_dir = self.config.base_dir.clone().or_else(default_base_dir);
        let path = livestate_core::resolve_path(&self.path, base_dir.as_deref());
        let cached = (self.default_fn)();

        LiveFile {
            path,
            filesystem: self.filesystem,
            file_mode: self.config.file_mode,
            dir_mode: self.config.dir_mode,
            state: Mutex::new(State {
                cached,
                watermark: Watermark::zero(),
            }),
            default_fn: self.default_fn,
            error_policy: self.error_policy,
            on_loaded: self.on_loaded,
        }
    }
}

impl<T: Default + 'static> LiveFileBuilder<T> {
    /// Builder whose default value is `T::default()`.
    pub fn with_zero_default(path: impl Into<PathBuf>) -> Self {
        Self::new(path, T::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::LogPolicy;
    use std::path::Path;

    #[test]
    fn test_build_resolves_relative_path() {
        let live = LiveFileBuilder::new("app/state.json", || 0u32)
            .base_dir("/srv")
            .build()
            .unwrap();
        assert_eq!(live.path(), Path::new("/srv/app/state.json"));
    }

    #[test]
    fn test_build_keeps_absolute_path() {
        let live = LiveFileBuilder::new("/etc/state.json", || 0u32)
            .base_dir("/srv")
            .build()
            .unwrap();
        assert_eq!(live.path(), Path::new("/etc/state.json"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = LiveFileBuilder::new("state.json", || 0u32)
            .config(LiveStateConfig::new().with_file_mode(0o444))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_default() {
        let live = LiveFileBuilder::<Vec<String>>::with_zero_default("/nowhere/state.json")
            .error_policy(LogPolicy)
            .build()
            .unwrap();
        assert!(live.last_modified().is_none());
    }
}
