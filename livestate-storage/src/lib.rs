//! livestate Storage - File-Backed State Cache
//!
//! A process-local, mutually exclusive cache over one JSON-encoded value.
//! Reads pick up external edits to the file, updates are transactional,
//! and all I/O goes through an injectable [`FileSystem`].

pub mod cache;
pub mod fs;

pub use cache::{
    AccessContext, ErrorPolicy, LiveFile, LiveFileBuilder, LogPolicy, Operation, PanicPolicy,
    UpdateError, Watermark,
};
pub use fs::{FileStat, FileSystem, InMemoryFileSystem, OsFileSystem, ReadFile, WriteFile};

// Re-export core types so callers need only this crate.
pub use livestate_core::{
    ErrorCategory, LiveStateConfig, LiveStateError, LiveStateResult, ModTime,
};
