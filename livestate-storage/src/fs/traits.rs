//! Filesystem capability traits.
//!
//! The cache controller never calls `std::fs` directly. Everything it needs
//! from storage goes through [`FileSystem`], so tests can swap in an
//! in-memory tree or inject faults.

use std::io::{self, Read, Seek, Write};
use std::path::Path;

use livestate_core::ModTime;

/// Metadata the controller needs from an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Current length in bytes.
    pub len: u64,
    /// Last modification time.
    pub modified: ModTime,
}

impl FileStat {
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A readable, seekable, stat-able file handle.
pub trait ReadFile: Read + Seek + Send {
    fn stat(&self) -> io::Result<FileStat>;
}

/// A read-write handle that can also be truncated and synced.
pub trait WriteFile: ReadFile + Write {
    /// Truncate or extend the file to `size` bytes.
    fn set_len(&mut self, size: u64) -> io::Result<()>;

    /// Flush data and metadata to the underlying storage.
    fn sync_all(&mut self) -> io::Result<()>;
}

/// Storage capability used by the cache controller.
///
/// # Contract
///
/// - `open` on a missing path fails with [`io::ErrorKind::NotFound`].
/// - `open_rw` creates the file when absent but does not create parent
///   directories; a missing parent is reported as `NotFound`.
/// - `create_dir_all` succeeds when the directory already exists.
/// - Implementations must be thread-safe.
pub trait FileSystem: Send + Sync {
    /// Open an existing file read-only.
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>>;

    /// Open a file read-write, creating it with `mode` if it does not exist.
    fn open_rw(&self, path: &Path, mode: u32) -> io::Result<Box<dyn WriteFile>>;

    /// Create `path` and all missing ancestors.
    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> io::Result<()>;
}
