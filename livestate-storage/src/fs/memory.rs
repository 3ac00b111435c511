//! In-memory filesystem for deterministic tests.
//!
//! Mirrors the parts of host filesystem semantics the controller relies on:
//! files need an existing parent directory, open handles survive removal,
//! and every write advances the file's modification time. The modification
//! clock is strictly monotonic, so two writes never share a timestamp.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{TimeDelta, Utc};
use livestate_core::ModTime;

use super::traits::{FileStat, FileSystem, ReadFile, WriteFile};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file or directory", path.display()),
    )
}

/// Strictly increasing wall clock.
#[derive(Debug)]
struct Clock {
    last: Mutex<ModTime>,
}

impl Clock {
    fn new() -> Self {
        Self {
            last: Mutex::new(ModTime::MIN_UTC),
        }
    }

    fn tick(&self) -> ModTime {
        let mut last = lock(&self.last);
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + TimeDelta::nanoseconds(1)
        };
        *last = next;
        next
    }
}

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    modified: ModTime,
}

#[derive(Debug, Default)]
struct Tree {
    files: HashMap<PathBuf, Arc<Mutex<Node>>>,
    dirs: HashSet<PathBuf>,
}

impl Tree {
    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() => true,
            Some(parent) if parent.parent().is_none() => true,
            Some(parent) => self.dirs.contains(parent),
        }
    }

    fn add_dir_all(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() || ancestor.parent().is_none() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

/// Thread-safe in-memory [`FileSystem`].
///
/// Cloning yields another handle onto the same tree.
#[derive(Debug, Clone)]
pub struct InMemoryFileSystem {
    tree: Arc<Mutex<Tree>>,
    clock: Arc<Clock>,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::default())),
            clock: Arc::new(Clock::new()),
        }
    }
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a file's contents as an outside writer would.
    ///
    /// Missing ancestors are created. The modification time advances.
    pub fn write_external(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = path.as_ref();
        let modified = self.clock.tick();
        let mut tree = lock(&self.tree);
        if let Some(parent) = path.parent() {
            tree.add_dir_all(parent);
        }
        match tree.files.get(path) {
            Some(node) => {
                let mut node = lock(node);
                node.data = contents.as_ref().to_vec();
                node.modified = modified;
            }
            None => {
                tree.files.insert(
                    path.to_path_buf(),
                    Arc::new(Mutex::new(Node {
                        data: contents.as_ref().to_vec(),
                        modified,
                    })),
                );
            }
        }
    }

    /// Force a file's modification time, e.g. to simulate clock skew.
    pub fn set_modified(&self, path: impl AsRef<Path>, modified: ModTime) -> io::Result<()> {
        let path = path.as_ref();
        let tree = lock(&self.tree);
        let node = tree.files.get(path).ok_or_else(|| not_found(path))?;
        lock(node).modified = modified;
        Ok(())
    }

    /// Current contents of a file, if it exists.
    pub fn read_bytes(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let tree = lock(&self.tree);
        tree.files.get(path.as_ref()).map(|node| lock(node).data.clone())
    }

    /// Current modification time of a file, if it exists.
    pub fn modified(&self, path: impl AsRef<Path>) -> Option<ModTime> {
        let tree = lock(&self.tree);
        tree.files.get(path.as_ref()).map(|node| lock(node).modified)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.tree).files.contains_key(path.as_ref())
    }

    pub fn dir_exists(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.tree).dirs.contains(path.as_ref())
    }
}

impl FileSystem for InMemoryFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>> {
        let tree = lock(&self.tree);
        let node = tree.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(MemFile {
            node: Arc::clone(node),
            pos: 0,
            clock: Arc::clone(&self.clock),
        }))
    }

    fn open_rw(&self, path: &Path, _mode: u32) -> io::Result<Box<dyn WriteFile>> {
        let mut tree = lock(&self.tree);
        if let Some(node) = tree.files.get(path) {
            return Ok(Box::new(MemFile {
                node: Arc::clone(node),
                pos: 0,
                clock: Arc::clone(&self.clock),
            }));
        }
        if !tree.parent_exists(path) {
            return Err(not_found(path));
        }

        let node = Arc::new(Mutex::new(Node {
            data: Vec::new(),
            modified: self.clock.tick(),
        }));
        tree.files.insert(path.to_path_buf(), Arc::clone(&node));
        Ok(Box::new(MemFile {
            node,
            pos: 0,
            clock: Arc::clone(&self.clock),
        }))
    }

    fn create_dir_all(&self, path: &Path, _mode: u32) -> io::Result<()> {
        let mut tree = lock(&self.tree);
        if tree.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{}: file exists", path.display()),
            ));
        }
        tree.add_dir_all(path);
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut tree = lock(&self.tree);
        tree.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }
}

/// Open handle onto an in-memory file.
#[derive(Debug)]
pub struct MemFile {
    node: Arc<Mutex<Node>>,
    pos: u64,
    clock: Arc<Clock>,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let node = lock(&self.node);
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX);
        if start >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - start);
        buf[..n].copy_from_slice(&node.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = lock(&self.node).data.len() as i128;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::End(delta) => len + delta as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let modified = self.clock.tick();
        let mut node = lock(&self.node);
        let start = usize::try_from(self.pos)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
        let end = start + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[start..end].copy_from_slice(buf);
        node.modified = modified;
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ReadFile for MemFile {
    fn stat(&self) -> io::Result<FileStat> {
        let node = lock(&self.node);
        Ok(FileStat {
            len: node.data.len() as u64,
            modified: node.modified,
        })
    }
}

impl WriteFile for MemFile {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        let modified = self.clock.tick();
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length too large"))?;
        let mut node = lock(&self.node);
        node.data.resize(size, 0);
        node.modified = modified;
        Ok(())
    }

    fn sync_all(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_is_not_found() {
        let fs = InMemoryFileSystem::new();
        let err = fs.open(Path::new("/state/app.json")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_open_rw_requires_parent_dir() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("/state/app.json");

        let err = fs.open_rw(path, 0o660).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs.create_dir_all(Path::new("/state"), 0o770).unwrap();
        assert!(fs.open_rw(path, 0o660).is_ok());
        assert!(fs.exists(path));
    }

    #[test]
    fn test_top_level_files_need_no_dir() {
        let fs = InMemoryFileSystem::new();
        assert!(fs.open_rw(Path::new("/app.json"), 0o660).is_ok());
        assert!(fs.open_rw(Path::new("relative.json"), 0o660).is_ok());
    }

    #[test]
    fn test_create_dir_all_registers_ancestors() {
        let fs = InMemoryFileSystem::new();
        fs.create_dir_all(Path::new("/a/b/c"), 0o770).unwrap();
        assert!(fs.dir_exists("/a"));
        assert!(fs.dir_exists("/a/b"));
        assert!(fs.dir_exists("/a/b/c"));
    }

    #[test]
    fn test_write_read_seek() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("/data.json");
        let mut file = fs.open_rw(path, 0o660).unwrap();
        file.write_all(b"hello world").unwrap();

        file.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = String::new();
        file.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "world");

        assert_eq!(fs.read_bytes(path).unwrap(), b"hello world");
    }

    #[test]
    fn test_set_len_truncates() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("/data.json");
        let mut file = fs.open_rw(path, 0o660).unwrap();
        file.write_all(b"0123456789").unwrap();
        file.set_len(0).unwrap();
        assert!(file.stat().unwrap().is_empty());
    }

    #[test]
    fn test_every_write_advances_mtime() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("/data.json");
        let mut file = fs.open_rw(path, 0o660).unwrap();

        let t0 = file.stat().unwrap().modified;
        file.write_all(b"a").unwrap();
        let t1 = file.stat().unwrap().modified;
        fs.write_external(path, b"b");
        let t2 = fs.modified(path).unwrap();

        assert!(t1 > t0);
        assert!(t2 > t1);
    }

    #[test]
    fn test_handle_survives_remove() {
        let fs = InMemoryFileSystem::new();
        let path = Path::new("/data.json");
        fs.write_external(path, b"kept");

        let mut file = fs.open(path).unwrap();
        fs.remove(path).unwrap();
        assert!(!fs.exists(path));

        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "kept");
    }

    #[test]
    fn test_negative_seek_is_rejected() {
        let fs = InMemoryFileSystem::new();
        fs.write_external("/x.json", b"{}");
        let mut file = fs.open(Path::new("/x.json")).unwrap();
        assert!(file.seek(SeekFrom::Current(-1)).is_err());
    }
}
