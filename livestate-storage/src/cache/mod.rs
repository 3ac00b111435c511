//! Auto-refreshing cache over a single JSON state file.
//!
//! [`LiveFile`] holds one value in memory and treats the backing file as the
//! source of truth. Staleness is detected lazily from the file's
//! modification time on every access; there is no OS-level watching.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Settings { retries: u32 }
//!
//! let settings = LiveFile::new("settings.json", || Settings { retries: 3 });
//!
//! // Cheap read; reloads first if someone edited the file.
//! let retries = settings.view(|s| s.retries);
//!
//! // All-or-nothing write; an Err rolls the cached value back.
//! settings.update(|s| {
//!     s.retries = 5;
//!     Ok::<_, Infallible>(())
//! })?;
//! ```

pub mod freshness;
pub mod live_file;
pub mod options;
pub mod policy;

pub use freshness::{Staleness, Watermark};
pub use live_file::{LiveFile, UpdateError};
pub use options::{DefaultFn, LiveFileBuilder, LoadedCallback};
pub use policy::{AccessContext, ErrorPolicy, LogPolicy, Operation, PanicPolicy};
