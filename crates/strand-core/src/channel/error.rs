//! Status values returned by channel operations.
//!
//! Closure and timeouts are expected control flow, not failures: they are
//! returned to the caller and never raised further down the stack. `Fault`
//! is the exception, carrying an item-level dispatch failure upward.

use std::fmt;

/// Terminal status of a channel operation.
///
/// `Ok` from an operation is success; these are the remaining outcomes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel is closed. For reads this is only reported once the
    /// channel has also drained.
    #[error("channel is closed")]
    Closed,

    /// The operation did not complete before its deadline.
    #[error("channel operation timed out")]
    Timeout,

    /// The value could not be dispatched. Produced by adapters and routers
    /// sitting behind an edge, never by the channel itself.
    #[error("channel fault: {0}")]
    Fault(String),
}

impl ChannelError {
    /// Returns true for the `Closed` status.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true for the `Fault` status.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Error returned from `try_write`, carrying the rejected value back to the
/// caller.
#[derive(Debug)]
pub struct TryWriteError<T> {
    /// The value that could not be written.
    pub value: T,
    /// Why the write was rejected.
    pub kind: TryWriteErrorKind,
}

/// Reason a non-blocking write was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWriteErrorKind {
    /// The channel is at capacity.
    Full,
    /// The channel is closed.
    Closed,
}

impl<T> TryWriteError<T> {
    /// Creates an error indicating the channel is full.
    #[must_use]
    pub fn full(value: T) -> Self {
        Self {
            value,
            kind: TryWriteErrorKind::Full,
        }
    }

    /// Creates an error indicating the channel is closed.
    #[must_use]
    pub fn closed(value: T) -> Self {
        Self {
            value,
            kind: TryWriteErrorKind::Closed,
        }
    }

    /// Returns true if the write failed because the channel was full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.kind == TryWriteErrorKind::Full
    }

    /// Returns true if the write failed because the channel was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.kind == TryWriteErrorKind::Closed
    }

    /// Consumes the error, returning the rejected value.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: fmt::Debug> fmt::Display for TryWriteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TryWriteErrorKind::Full => write!(f, "try_write failed: channel is full"),
            TryWriteErrorKind::Closed => write!(f, "try_write failed: channel is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryWriteError<T> {}
