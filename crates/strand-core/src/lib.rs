//! # Strand Core
//!
//! The execution core for the Strand dataflow runtime.
//!
//! This crate provides:
//! - **Channel**: Bounded FIFO channels with blocking writes/reads, a closed
//!   state, and strict capacity enforcement
//! - **Edge**: Typed writable/readable connectors between operator endpoints,
//!   with a registry of cross-type adapters
//! - **Node**: Source, processing, and sink operators driven by user callbacks
//! - **Router**: Key-based and tagged demultiplexing to named downstreams
//! - **Runnable**: The scheduled execution model (state machine, stop tokens,
//!   engines, launchers, runners)
//!
//! ## Design Principles
//!
//! 1. **Statuses, not panics** - channel closure and timeouts are ordinary
//!    `Result` values returned to the caller
//! 2. **One writer, one reader per endpoint** - unless an endpoint is an
//!    explicit multi-acceptor, double-binding is a wiring error
//! 3. **Wiring fails at build time** - a missing type adapter or a
//!    double-bound edge is reported when the graph is assembled, never while
//!    data is flowing
//! 4. **Suspension only in the channel** - `await_read`/`await_write` are the
//!    designated blocking points; everything else runs to completion
//!
//! ## Example
//!
//! ```rust,ignore
//! use strand_core::edge::make_edge;
//! use strand_core::node::{LambdaSink, LambdaSource, ProcessingNode};
//! use strand_core::runnable::{EngineFactory, LaunchOptions};
//!
//! let source = Arc::new(LambdaSource::new(|ctx| {
//!     for x in [1.0, 2.0, 3.0] {
//!         if ctx.emit(x).is_err() {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }));
//! let doubler = Arc::new(ProcessingNode::new(|x: f64| x * 2.0));
//! let sink = Arc::new(LambdaSink::new(|x: f64| println!("{x}")));
//!
//! make_edge(source.as_ref(), doubler.as_ref())?;
//! make_edge(doubler.as_ref(), sink.as_ref())?;
//!
//! let factory = EngineFactory::default();
//! let runners = [
//!     factory.launcher(LaunchOptions::default()).ignite(source)?,
//!     factory.launcher(LaunchOptions::default()).ignite(doubler)?,
//!     factory.launcher(LaunchOptions::default()).ignite(sink)?,
//! ];
//! for runner in runners {
//!     runner.await_join()?;
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod edge;
pub mod node;
pub mod runnable;

// Re-export key types
pub use channel::{Channel, ChannelConfig, ChannelError};
pub use edge::{make_edge, AdapterRegistry, EdgeError};
pub use runnable::{Context, EngineFactory, LaunchOptions, Runnable, Runner};

/// Result type for strand-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for strand-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Channel-level errors (closed, timeout, fault)
    #[error("Channel error: {0}")]
    Channel(#[from] channel::ChannelError),

    /// Edge wiring errors
    #[error("Edge error: {0}")]
    Edge(#[from] edge::EdgeError),

    /// Router dispatch errors
    #[error("Router error: {0}")]
    Router(#[from] node::router::RouterError),

    /// Runnable execution errors
    #[error("Run error: {0}")]
    Run(#[from] runnable::RunError),

    /// Engine launch errors
    #[error("Engine error: {0}")]
    Engine(#[from] runnable::EngineError),
}
