//! Error policy and access context.
//!
//! Unrecoverable I/O and decode failures are routed through an
//! [`ErrorPolicy`] instead of being returned from read paths. The default
//! policy panics: corrupt persisted state is an operator-visible condition,
//! not something to paper over. Callers that want to degrade gracefully
//! install [`LogPolicy`] or their own closure.

use std::fmt;
use std::path::Path;

use livestate_core::LiveStateError;

/// Public entry point that triggered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    View,
    Peek,
    Update,
    /// Restoring the cached value after a rejected update.
    Rollback,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Peek => "peek",
            Self::Update => "update",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an error or reload happened.
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    pub operation: Operation,
    pub path: &'a Path,
}

impl<'a> AccessContext<'a> {
    pub fn new(operation: Operation, path: &'a Path) -> Self {
        Self { operation, path }
    }
}

/// Handler for unrecoverable storage and decode failures.
///
/// Called synchronously while the controller's lock is held. Returning
/// normally lets the operation continue on a best-effort basis; a failed
/// stat, for instance, is treated as "no reload this round".
///
/// Must not call back into the controller that reported the error.
pub trait ErrorPolicy: Send + Sync {
    fn handle(&self, ctx: &AccessContext<'_>, error: &LiveStateError);
}

impl<F> ErrorPolicy for F
where
    F: Fn(&AccessContext<'_>, &LiveStateError) + Send + Sync,
{
    fn handle(&self, ctx: &AccessContext<'_>, error: &LiveStateError) {
        self(ctx, error)
    }
}

/// Default policy: log, then abort the current thread with a panic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicPolicy;

impl ErrorPolicy for PanicPolicy {
    fn handle(&self, ctx: &AccessContext<'_>, error: &LiveStateError) {
        tracing::error!(
            operation = %ctx.operation,
            path = %ctx.path.display(),
            error = %error,
            "live file failure"
        );
        panic!("{} {}: {}", ctx.operation, ctx.path.display(), error);
    }
}

/// Log at error level and keep going with the cached value.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPolicy;

impl ErrorPolicy for LogPolicy {
    fn handle(&self, ctx: &AccessContext<'_>, error: &LiveStateError) {
        tracing::error!(
            operation = %ctx.operation,
            path = %ctx.path.display(),
            error = %error,
            category = ?error.category(),
            "live file failure, continuing with cached value"
        );
    }
}
