//! # Runnable execution model
//!
//! A runnable is a scheduled unit driven by one or more engines. Its
//! lifecycle is a small state machine:
//!
//! ```text
//! Init ──ignite──▶ Queued ──engine pickup──▶ Running ──▶ Completed
//!                                              │
//!                              stop ──▶ Stop (drain upstream, token untouched)
//!                              kill ──▶ Kill (stop token tripped)
//! ```
//!
//! `Stop` requests cooperative termination: the runnable keeps pulling
//! until its upstream closes and drains. `Kill` trips the stop token; read
//! loops observe the token between reads and exit promptly, dropping
//! in-flight items on the floor.
//!
//! ## Module Structure
//!
//! - [`engine`]: Engine kinds, launch options, CPU pinning, the factory
//! - [`runner`]: The launcher and the runner that owns a launched runnable

pub mod engine;
pub mod runner;

pub use engine::{EngineError, EngineFactory, EngineKind, LaunchOptions};
pub use runner::{Launcher, Runner};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::ChannelError;
use crate::edge::EdgeError;

/// Lifecycle states of a runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnableState {
    /// Constructed, not yet launched.
    Init,
    /// Submitted to a launcher, waiting for engine pickup.
    Queued,
    /// Executing on its engines.
    Running,
    /// Cooperative termination requested; draining upstream.
    Stop,
    /// Forced termination requested; the stop token is set.
    Kill,
    /// `run` returned on every engine.
    Completed,
}

impl RunnableState {
    /// Returns true once the runnable can no longer produce work.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Default)]
struct StopInner {
    requested: AtomicBool,
}

/// The requesting side of a stop token.
#[derive(Debug, Clone, Default)]
pub struct StopSource {
    inner: Arc<StopInner>,
}

impl StopSource {
    /// Creates an untripped stop source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Idempotent.
    pub fn request_stop(&self) {
        self.inner.requested.store(true, Ordering::Release);
    }

    /// Returns an observing token.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The observing side of a stop token.
#[derive(Debug, Clone)]
pub struct StopToken {
    inner: Arc<StopInner>,
}

impl StopToken {
    /// Returns true once the source has been tripped.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }
}

/// Per-engine execution context handed to [`Runnable::run`].
#[derive(Debug, Clone)]
pub struct Context {
    rank: usize,
    size: usize,
    engine_id: u64,
    stop: StopToken,
    finish: StopToken,
}

impl Context {
    /// Interval at which blocking read loops re-check the stop token.
    pub const STOP_POLL: Duration = Duration::from_millis(1);

    pub(crate) fn new(
        rank: usize,
        size: usize,
        engine_id: u64,
        stop: StopToken,
        finish: StopToken,
    ) -> Self {
        Self {
            rank,
            size,
            engine_id,
            stop,
            finish,
        }
    }

    /// Rank of this engine within the launch group (`0..size`).
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of engines in the launch group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Process-unique engine identifier.
    #[must_use]
    pub fn engine_id(&self) -> u64 {
        self.engine_id
    }

    /// Returns true once forced termination (`Kill`) was requested.
    /// Read loops must observe this between reads.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.stop_requested()
    }

    /// Returns true once either cooperative (`Stop`) or forced (`Kill`)
    /// termination was requested. Sources observe this between emissions.
    #[must_use]
    pub fn finish_requested(&self) -> bool {
        self.finish.stop_requested() || self.stop.stop_requested()
    }
}

/// A unit of work scheduled on engines.
///
/// `run` executes once per engine, concurrently when the launch options
/// request more than one; implementations are shared-state (`&self`) and
/// must be thread-safe. `on_complete` runs exactly once, after the last
/// engine returns, and is where downstream edges are released.
pub trait Runnable: Send + Sync + 'static {
    /// The processing loop. Returns when the upstream closes, termination is
    /// requested, or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// A fatal read-side or write-side failure. Closure and timeouts are not
    /// fatal and are handled inside the loop.
    fn run(&self, ctx: &Context) -> Result<(), RunError>;

    /// Invoked once after `run` has returned on every engine. Releases
    /// downstream edges so consumers observe upstream completion.
    fn on_complete(&self) {}
}

/// Fatal errors surfaced by a runnable.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Reading from the upstream channel failed.
    #[error("failed to read from upstream: {0}")]
    UpstreamRead(ChannelError),

    /// Writing to a downstream edge failed.
    #[error("failed to write to downstream: {0}")]
    DownstreamWrite(ChannelError),

    /// A user handler reported a failure.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The runnable was launched before its edges were wired.
    #[error("runnable is not wired: {0}")]
    Wiring(#[from] EdgeError),

    /// The engine could not be brought up on its carrier thread.
    #[error("engine launch failed: {0}")]
    Launch(String),

    /// The runnable panicked on one of its engines.
    #[error("runnable panicked on engine {0}")]
    Panicked(u64),
}

impl RunError {
    /// Returns true if this error is fatal.
    ///
    /// Read/write failures that merely report `Closed` or `Timeout` are
    /// expected control flow and not fatal.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UpstreamRead(status) | Self::DownstreamWrite(status) => {
                !matches!(status, ChannelError::Closed | ChannelError::Timeout)
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_token() {
        let source = StopSource::new();
        let token = source.token();
        assert!(!token.stop_requested());
        source.request_stop();
        assert!(token.stop_requested());
        // Idempotent.
        source.request_stop();
        assert!(token.stop_requested());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!RunError::UpstreamRead(ChannelError::Closed).is_fatal());
        assert!(!RunError::DownstreamWrite(ChannelError::Timeout).is_fatal());
        assert!(RunError::UpstreamRead(ChannelError::Fault("bad".into())).is_fatal());
        assert!(RunError::Handler("boom".into()).is_fatal());
    }

    #[test]
    fn test_context_accessors() {
        let stop = StopSource::new();
        let finish = StopSource::new();
        let ctx = Context::new(1, 4, 17, stop.token(), finish.token());
        assert_eq!(ctx.rank(), 1);
        assert_eq!(ctx.size(), 4);
        assert_eq!(ctx.engine_id(), 17);
        assert!(!ctx.stop_requested());
        assert!(!ctx.finish_requested());

        finish.request_stop();
        assert!(!ctx.stop_requested());
        assert!(ctx.finish_requested());

        stop.request_stop();
        assert!(ctx.stop_requested());
    }
}
