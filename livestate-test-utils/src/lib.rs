//! livestate Test Utilities
//!
//! Shared test infrastructure for the livestate workspace:
//! - Fixture state type matching the on-disk `{"Value":..,"Name":..}` shape
//! - Temp-dir path helpers
//! - A recording error policy
//! - A fault-injecting filesystem wrapper
//! - Proptest generators

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

pub use livestate_core::{ErrorCategory, LiveStateError};
pub use livestate_storage::{
    AccessContext, ErrorPolicy, FileStat, FileSystem, InMemoryFileSystem, LiveFile, Operation,
    ReadFile, WriteFile,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// State type used throughout the tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestData {
    pub value: i64,
    pub name: String,
}

impl TestData {
    pub fn new(value: i64, name: impl Into<String>) -> Self {
        Self {
            value,
            name: name.into(),
        }
    }
}

/// A temp directory plus a state file path inside it.
///
/// The directory is removed when this is dropped.
pub struct TempState {
    dir: TempDir,
    path: PathBuf,
}

impl TempState {
    pub fn new() -> Self {
        Self::with_name("testfile.json")
    }

    pub fn with_name(name: &str) -> Self {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => panic!("failed to create temp dir: {}", e),
        };
        let path = dir.path().join(name);
        Self { dir, path }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the state file from outside the controller.
    pub fn write(&self, contents: &str) {
        if let Err(e) = std::fs::write(&self.path, contents) {
            panic!("failed to write {}: {}", self.path.display(), e);
        }
    }

    pub fn read(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Default for TempState {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a fmt subscriber writing to the test harness. Idempotent.
///
/// Honors `RUST_LOG`; defaults to `livestate_storage=debug`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("livestate_storage=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// RECORDING ERROR POLICY
// ============================================================================

/// One error observed by [`RecordingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub operation: Operation,
    pub category: ErrorCategory,
    pub message: String,
}

/// Error policy that records instead of panicking.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPolicy {
    errors: Arc<Mutex<Vec<RecordedError>>>,
}

impl RecordingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        lock(&self.errors).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.errors).len()
    }

    pub fn categories(&self) -> Vec<ErrorCategory> {
        lock(&self.errors).iter().map(|e| e.category).collect()
    }

    pub fn clear(&self) {
        lock(&self.errors).clear();
    }
}

impl ErrorPolicy for RecordingPolicy {
    fn handle(&self, ctx: &AccessContext<'_>, error: &LiveStateError) {
        lock(&self.errors).push(RecordedError {
            operation: ctx.operation,
            category: error.category(),
            message: error.to_string(),
        });
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// A failure [`FaultyFileSystem`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Open,
    OpenRw,
    CreateDir,
    Stat,
    Seek,
    Read,
    Truncate,
    Write,
    Sync,
    Remove,
}

fn injected(fault: Fault) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {:?} fault", fault))
}

#[derive(Debug, Default)]
struct Faults {
    active: Mutex<HashSet<Fault>>,
}

impl Faults {
    fn check(&self, fault: Fault) -> io::Result<()> {
        if lock(&self.active).contains(&fault) {
            Err(injected(fault))
        } else {
            Ok(())
        }
    }
}

/// Wraps an [`InMemoryFileSystem`] and fails selected operations on demand.
#[derive(Debug, Clone)]
pub struct FaultyFileSystem {
    inner: InMemoryFileSystem,
    faults: Arc<Faults>,
}

impl FaultyFileSystem {
    pub fn new(inner: InMemoryFileSystem) -> Self {
        Self {
            inner,
            faults: Arc::new(Faults::default()),
        }
    }

    pub fn inner(&self) -> &InMemoryFileSystem {
        &self.inner
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.faults.active).insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        lock(&self.faults.active).remove(&fault);
    }

    pub fn heal_all(&self) {
        lock(&self.faults.active).clear();
    }
}

impl FileSystem for FaultyFileSystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>> {
        self.faults.check(Fault::Open)?;
        let inner = self.inner.open(path)?;
        Ok(Box::new(FaultyReadFile {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn open_rw(&self, path: &Path, mode: u32) -> io::Result<Box<dyn WriteFile>> {
        self.faults.check(Fault::OpenRw)?;
        let inner = self.inner.open_rw(path, mode)?;
        Ok(Box::new(FaultyWriteFile {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.faults.check(Fault::CreateDir)?;
        self.inner.create_dir_all(path, mode)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.faults.check(Fault::Remove)?;
        self.inner.remove(path)
    }
}

struct FaultyReadFile {
    inner: Box<dyn ReadFile>,
    faults: Arc<Faults>,
}

impl Read for FaultyReadFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.faults.check(Fault::Read)?;
        self.inner.read(buf)
    }
}

impl Seek for FaultyReadFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.faults.check(Fault::Seek)?;
        self.inner.seek(pos)
    }
}

impl ReadFile for FaultyReadFile {
    fn stat(&self) -> io::Result<FileStat> {
        self.faults.check(Fault::Stat)?;
        self.inner.stat()
    }
}

struct FaultyWriteFile {
    inner: Box<dyn WriteFile>,
    faults: Arc<Faults>,
}

impl Read for FaultyWriteFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.faults.check(Fault::Read)?;
        self.inner.read(buf)
    }
}

impl Seek for FaultyWriteFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.faults.check(Fault::Seek)?;
        self.inner.seek(pos)
    }
}

impl Write for FaultyWriteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.faults.check(Fault::Write)?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ReadFile for FaultyWriteFile {
    fn stat(&self) -> io::Result<FileStat> {
        self.faults.check(Fault::Stat)?;
        self.inner.stat()
    }
}

impl WriteFile for FaultyWriteFile {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.faults.check(Fault::Truncate)?;
        self.inner.set_len(size)
    }

    fn sync_all(&mut self) -> io::Result<()> {
        self.faults.check(Fault::Sync)?;
        self.inner.sync_all()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Arbitrary [`TestData`], including unicode and escape-heavy names.
pub fn arb_test_data() -> impl Strategy<Value = TestData> {
    (any::<i64>(), "\\PC{0,32}").prop_map(|(value, name)| TestData { value, name })
}

/// Arbitrary JSON-ish garbage that never decodes as [`TestData`].
pub fn arb_corrupt_json() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("{".to_string()),
        Just("[1, 2".to_string()),
        Just("{\"Value\": \"not a number\", \"Name\": \"x\"}".to_string()),
        "[a-z]{1,16}".prop_map(|s| format!("{{{}", s)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_data_json_shape() {
        let json = serde_json::to_string(&TestData::new(1337, "foobar")).unwrap();
        assert_eq!(json, r#"{"Value":1337,"Name":"foobar"}"#);
    }

    #[test]
    fn test_recording_policy_shares_log() {
        let policy = RecordingPolicy::new();
        let clone = policy.clone();
        let ctx = AccessContext::new(Operation::Peek, Path::new("/x.json"));
        clone.handle(
            &ctx,
            &LiveStateError::from(livestate_core::StorageError::Open {
                path: "/x.json".into(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            }),
        );
        assert_eq!(policy.count(), 1);
        assert_eq!(policy.categories(), vec![ErrorCategory::Io]);
        policy.clear();
        assert_eq!(clone.count(), 0);
    }

    #[test]
    fn test_faulty_fs_injects_and_heals() {
        let fs = FaultyFileSystem::new(InMemoryFileSystem::new());
        fs.inner().write_external("/x.json", b"{}");

        fs.inject(Fault::Open);
        assert!(fs.open(Path::new("/x.json")).is_err());

        fs.heal(Fault::Open);
        let mut file = fs.open(Path::new("/x.json")).unwrap();
        fs.inject(Fault::Stat);
        assert!(file.stat().is_err());
        fs.heal_all();
        assert_eq!(file.stat().unwrap().len, 2);

        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "{}");
    }
}
