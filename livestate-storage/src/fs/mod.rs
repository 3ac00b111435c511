//! Injectable filesystem layer.
//!
//! [`OsFileSystem`] is the production implementation; [`InMemoryFileSystem`]
//! is a deterministic substitute for tests.

pub mod memory;
pub mod os;
pub mod traits;

pub use memory::{InMemoryFileSystem, MemFile};
pub use os::{OsFile, OsFileSystem};
pub use traits::{FileStat, FileSystem, ReadFile, WriteFile};
