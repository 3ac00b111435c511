//! The cache controller.
//!
//! [`LiveFile`] owns one in-memory copy of a JSON-persisted value and keeps it
//! in step with the backing file. Every entry point takes the same mutex, then
//! runs the freshness check: open the file, compare its modification time with
//! the [`Watermark`], reload if it moved forward. There is deliberately no
//! reader/writer split because a read can itself reload.
//!
//! Cross-process writers are not coordinated. If another process rewrites the
//! file while an update is in flight, the last writer wins.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use livestate_core::{CodecError, LiveStateError, ModTime, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::freshness::{Staleness, Watermark};
use super::options::{DefaultFn, LiveFileBuilder, LoadedCallback};
use super::policy::{AccessContext, ErrorPolicy, Operation};
use crate::fs::{FileSystem, ReadFile, WriteFile};

/// Failure of a transactional [`LiveFile::update`].
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<E> {
    /// The update function failed. The cached value was rolled back to the
    /// on-disk state and nothing was written.
    #[error("update rejected: {0}")]
    Rejected(E),

    /// Opening, encoding, writing or syncing the file failed. Already
    /// reported to the error policy.
    #[error(transparent)]
    Storage(#[from] LiveStateError),
}

impl<E> UpdateError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The update function's own error, if that is what failed.
    pub fn into_rejected(self) -> Option<E> {
        match self {
            Self::Rejected(e) => Some(e),
            Self::Storage(_) => None,
        }
    }

    pub fn storage(&self) -> Option<&LiveStateError> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Rejected(_) => None,
        }
    }
}

/// Result of reading the file into the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Load {
    Loaded,
    /// The bytes were read but are not a valid value.
    Corrupt,
    /// Seeking or reading failed; the file content is unknown.
    Unreadable,
}

pub(crate) struct State<T> {
    pub(crate) cached: T,
    pub(crate) watermark: Watermark,
}

/// Mutually exclusive, auto-refreshing cache over a JSON state file.
///
/// Construction performs no I/O. The file is created on the first
/// successful [`update`](Self::update); reads never create it.
pub struct LiveFile<T> {
    pub(crate) path: PathBuf,
    pub(crate) filesystem: Arc<dyn FileSystem>,
    pub(crate) file_mode: u32,
    pub(crate) dir_mode: u32,
    pub(crate) state: Mutex<State<T>>,
    pub(crate) default_fn: DefaultFn<T>,
    pub(crate) error_policy: Arc<dyn ErrorPolicy>,
    pub(crate) on_loaded: Option<LoadedCallback<T>>,
}

impl<T> LiveFile<T> {
    /// Controller over `path` with all default options: host filesystem,
    /// panic-on-error, no observer, process-wide base directory.
    pub fn new<F>(path: impl Into<PathBuf>, default_fn: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        LiveFileBuilder::new(path, default_fn).into_live_file()
    }

    pub fn builder<F>(path: impl Into<PathBuf>, default_fn: F) -> LiveFileBuilder<T>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        LiveFileBuilder::new(path, default_fn)
    }

    /// Resolved path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the last adopted file revision, `None` while
    /// the controller still holds its default value.
    pub fn last_modified(&self) -> Option<ModTime> {
        self.lock_state().watermark.last_modified()
    }

    /// Forget the adopted modification time so the next access reloads
    /// from disk even if the file's mtime did not move.
    pub fn invalidate(&self) {
        self.lock_state().watermark.reset();
    }

    fn lock_state(&self) -> MutexGuard<'_, State<T>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // A closure panicked mid-operation; its partial mutation must not survive.
                tracing::warn!(
                    path = %self.path.display(),
                    "live file lock poisoned, resetting cached value"
                );
                let mut guard = poisoned.into_inner();
                guard.cached = (self.default_fn)();
                guard.watermark.reset();
                self.state.clear_poison();
                guard
            }
        }
    }

    fn report(&self, operation: Operation, error: &LiveStateError) {
        self.error_policy
            .handle(&AccessContext::new(operation, &self.path), error);
    }
}

impl<T: Default + 'static> LiveFile<T> {
    /// Builder whose default value is `T::default()`.
    pub fn builder_with_zero_default(path: impl Into<PathBuf>) -> LiveFileBuilder<T> {
        LiveFileBuilder::with_zero_default(path)
    }
}

impl<T> LiveFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Run `f` against the current value.
    ///
    /// The reference is only valid inside `f`. `f` must not call back into
    /// this controller; the lock is not reentrant.
    pub fn view<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _span = tracing::debug_span!("live_file", op = "view", path = %self.path.display())
            .entered();

        let mut state = self.lock_state();
        self.ensure(&mut state, Operation::View);
        f(&state.cached)
    }

    /// Copy of the current value.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        let _span = tracing::debug_span!("live_file", op = "peek", path = %self.path.display())
            .entered();

        let mut state = self.lock_state();
        self.ensure(&mut state, Operation::Peek);
        state.cached.clone()
    }

    /// Mutate the value and persist it, all or nothing.
    ///
    /// When `f` returns `Ok`, the value is written as indented JSON, synced,
    /// and the new modification time adopted. When `f` returns `Err`, the
    /// cached value is re-read from the file as it was before the call and
    /// the error is handed back untouched in [`UpdateError::Rejected`].
    ///
    /// `f` must not call back into this controller.
    pub fn update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, UpdateError<E>> {
        let _span = tracing::debug_span!("live_file", op = "update", path = %self.path.display())
            .entered();

        let mut state = self.lock_state();
        let existed = self.ensure(&mut state, Operation::Update);

        let mut file = match self.open_for_write() {
            Ok(file) => file,
            Err(err) => {
                self.report(Operation::Update, &err);
                return Err(UpdateError::Storage(err));
            }
        };

        // Opening is a new observation; the file may have changed since ensure.
        self.load_if_updated(&mut state, file.as_mut(), Operation::Update);

        match f(&mut state.cached) {
            Ok(value) => {
                if let Err(err) = self.commit(&mut state, file.as_mut()) {
                    self.report(Operation::Update, &err);
                    self.rollback(&mut state, file.as_mut());
                    return Err(UpdateError::Storage(err));
                }
                Ok(value)
            }
            Err(rejected) => {
                tracing::warn!(path = %self.path.display(), "update failed, rolling back");
                self.rollback(&mut state, file.as_mut());
                drop(file);
                if !existed {
                    self.remove_if_empty();
                }
                Err(UpdateError::Rejected(rejected))
            }
        }
    }

    /// Freshness check. Returns whether the backing file exists.
    fn ensure(&self, state: &mut State<T>, operation: Operation) -> bool {
        match self.filesystem.open(&self.path) {
            Ok(mut file) => {
                self.load_if_updated(state, file.as_mut(), operation);
                true
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                tracing::trace!(path = %self.path.display(), "no backing file, keeping cached value");
                false
            }
            Err(source) => {
                let err = LiveStateError::from(StorageError::Open {
                    path: self.path.clone(),
                    source,
                });
                self.report(operation, &err);
                false
            }
        }
    }

    fn load_if_updated<F>(&self, state: &mut State<T>, file: &mut F, operation: Operation)
    where
        F: ReadFile + ?Sized,
    {
        let stat = match file.stat() {
            Ok(stat) => stat,
            Err(source) => {
                let err = LiveStateError::from(StorageError::Stat {
                    path: self.path.clone(),
                    source,
                });
                self.report(operation, &err);
                return;
            }
        };

        match state.watermark.classify(&stat) {
            Staleness::Empty => {
                tracing::trace!(path = %self.path.display(), "backing file empty");
            }
            Staleness::Current => {
                tracing::trace!(path = %self.path.display(), "cached value current");
            }
            Staleness::Stale { modified } => {
                // A corrupt revision is adopted so it is reported once; an
                // unreadable one is retried on the next access.
                if self.force_load(state, file, operation) != Load::Unreadable {
                    state.watermark.advance(modified);
                }
            }
        }
    }

    /// Decode the whole file into the cached value. On any failure it is
    /// reported and the cached value left untouched.
    fn force_load<F>(&self, state: &mut State<T>, file: &mut F, operation: Operation) -> Load
    where
        F: ReadFile + ?Sized,
    {
        if let Err(source) = file.seek(SeekFrom::Start(0)) {
            let err = LiveStateError::from(StorageError::Seek {
                path: self.path.clone(),
                source,
            });
            self.report(operation, &err);
            return Load::Unreadable;
        }

        let mut buf = Vec::new();
        if let Err(source) = file.read_to_end(&mut buf) {
            let err = LiveStateError::from(StorageError::Read {
                path: self.path.clone(),
                source,
            });
            self.report(operation, &err);
            return Load::Unreadable;
        }

        match decode_first::<T>(&buf) {
            Ok(Some(value)) => state.cached = value,
            // Raced a truncate: stat saw bytes, the read saw none.
            Ok(None) => state.cached = (self.default_fn)(),
            Err(source) => {
                let err = LiveStateError::from(CodecError::Decode {
                    path: self.path.clone(),
                    source,
                });
                self.report(operation, &err);
                return Load::Corrupt;
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            operation = %operation,
            bytes = buf.len(),
            "loaded"
        );

        if let Some(on_loaded) = &self.on_loaded {
            on_loaded(&AccessContext::new(operation, &self.path), &state.cached);
        }
        Load::Loaded
    }

    /// Restore the cached value from the open handle.
    fn rollback<F>(&self, state: &mut State<T>, file: &mut F)
    where
        F: ReadFile + ?Sized,
    {
        if self.force_load(state, file, Operation::Rollback) != Load::Loaded {
            // Never keep a half-applied mutation; fall back and reload on next access.
            state.cached = (self.default_fn)();
            state.watermark.reset();
        }
    }

    fn open_for_write(&self) -> Result<Box<dyn WriteFile>, LiveStateError> {
        match self.filesystem.open_rw(&self.path, self.file_mode) {
            Ok(file) => return Ok(file),
            Err(source) if source.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StorageError::Open {
                    path: self.path.clone(),
                    source,
                }
                .into())
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.filesystem
                .create_dir_all(parent, self.dir_mode)
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        self.filesystem
            .open_rw(&self.path, self.file_mode)
            .map_err(|source| {
                StorageError::Open {
                    path: self.path.clone(),
                    source,
                }
                .into()
            })
    }

    /// Truncate, write the full encoding from offset zero, sync, adopt mtime.
    fn commit(&self, state: &mut State<T>, file: &mut dyn WriteFile) -> Result<(), LiveStateError> {
        let path = || self.path.clone();

        // Encode before truncating so an encode failure leaves the file intact.
        let mut buf = serde_json::to_vec_pretty(&state.cached)
            .map_err(|source| CodecError::Encode { path: path(), source })?;
        buf.push(b'\n');

        file.set_len(0)
            .map_err(|source| StorageError::Truncate { path: path(), source })?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| StorageError::Seek { path: path(), source })?;
        file.write_all(&buf)
            .map_err(|source| StorageError::Write { path: path(), source })?;
        file.sync_all()
            .map_err(|source| StorageError::Sync { path: path(), source })?;

        let stat = file
            .stat()
            .map_err(|source| StorageError::Stat { path: path(), source })?;
        state.watermark.advance(stat.modified);

        tracing::debug!(
            path = %self.path.display(),
            bytes = buf.len(),
            modified = %stat.modified,
            "committed"
        );
        Ok(())
    }

    /// Undo the file creation of a rejected first update.
    ///
    /// Existence was sampled before the file was opened for writing, so an
    /// empty file another process created in between is removed as well.
    fn remove_if_empty(&self) {
        let empty = self
            .filesystem
            .open(&self.path)
            .and_then(|file| file.stat())
            .map(|stat| stat.is_empty())
            .unwrap_or(false);
        if !empty {
            return;
        }
        if let Err(source) = self.filesystem.remove(&self.path) {
            let error = StorageError::Remove {
                path: self.path.clone(),
                source,
            };
            tracing::warn!(error = %error, "keeping empty state file after rejected update");
        }
    }
}

/// Decode the first JSON value in `buf`. Empty or whitespace-only input
/// yields `None`.
fn decode_first<T: DeserializeOwned>(buf: &[u8]) -> Result<Option<T>, serde_json::Error> {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<T>();
    values.next().transpose()
}
