//! livestate Core - Shared Types
//!
//! Pure data structures shared by the storage crate: the error taxonomy,
//! construction-time configuration and the modification-time type.
//! This crate performs no file I/O.

use chrono::{DateTime, Utc};
use std::time::SystemTime;

pub mod config;
pub mod error;

pub use config::{
    default_base_dir, resolve_path, set_default_base_dir, LiveStateConfig, DEFAULT_DIR_MODE,
    DEFAULT_FILE_MODE,
};
pub use error::{
    CodecError, ConfigError, ErrorCategory, LiveStateError, LiveStateResult, StorageError,
};

/// File modification timestamp, in UTC.
pub type ModTime = DateTime<Utc>;

/// Convert a filesystem timestamp into a [`ModTime`].
pub fn mod_time_from_system(time: SystemTime) -> ModTime {
    DateTime::<Utc>::from(time)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::{Path, PathBuf};

    proptest! {
        /// Relative paths always land under the base directory.
        #[test]
        fn prop_relative_paths_resolve_under_base(
            base in "/[a-z]{1,8}(/[a-z]{1,8}){0,3}",
            rel in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.json",
        ) {
            let resolved = resolve_path(Path::new(&rel), Some(Path::new(&base)));
            prop_assert!(resolved.starts_with(&base));
            prop_assert!(resolved.ends_with(&rel));
        }

        /// Absolute paths are never rewritten.
        #[test]
        fn prop_absolute_paths_untouched(
            base in "/[a-z]{1,8}",
            abs in "/[a-z]{1,8}/[a-z]{1,8}\\.json",
        ) {
            let resolved = resolve_path(Path::new(&abs), Some(Path::new(&base)));
            prop_assert_eq!(resolved, PathBuf::from(&abs));
        }
    }
}
