//! Staleness tracking for the cached value.
//!
//! The only staleness signal is the backing file's modification time. A
//! [`Watermark`] records the newest time the controller has adopted and
//! classifies each fresh stat against it.

use livestate_core::ModTime;

use crate::fs::FileStat;

/// Outcome of comparing a file stat with the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Zero-length file. Nothing to load; the cached value stands.
    Empty,
    /// Modification time is not after the watermark.
    Current,
    /// Modification time is strictly after the watermark; reload required.
    Stale {
        /// Time to adopt once the reload is done.
        modified: ModTime,
    },
}

impl Staleness {
    pub fn needs_reload(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// Last-known modification time of the backing file.
///
/// `None` means the controller still holds its default value and has never
/// adopted a file revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    last: Option<ModTime>,
}

impl Watermark {
    /// Watermark for a controller that has not loaded anything yet.
    pub fn zero() -> Self {
        Self { last: None }
    }

    pub fn at(modified: ModTime) -> Self {
        Self {
            last: Some(modified),
        }
    }

    pub fn last_modified(&self) -> Option<ModTime> {
        self.last
    }

    pub fn is_loaded(&self) -> bool {
        self.last.is_some()
    }

    /// True when `modified` is strictly after the adopted time.
    pub fn is_older_than(&self, modified: ModTime) -> bool {
        match self.last {
            Some(last) => modified > last,
            None => true,
        }
    }

    /// Classify a stat of the backing file.
    pub fn classify(&self, stat: &FileStat) -> Staleness {
        if stat.is_empty() {
            Staleness::Empty
        } else if self.is_older_than(stat.modified) {
            Staleness::Stale {
                modified: stat.modified,
            }
        } else {
            Staleness::Current
        }
    }

    /// Adopt `modified`. Never moves backwards.
    pub fn advance(&mut self, modified: ModTime) {
        if self.is_older_than(modified) {
            self.last = Some(modified);
        }
    }

    /// Forget the adopted time so the next check reloads unconditionally.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
