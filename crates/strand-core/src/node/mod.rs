//! # Node operators
//!
//! Sources, processing nodes, and sinks driven by user callbacks, plus the
//! router family. Each operator composes the edge capability traits
//! explicitly: a consumer side owns its inbound channel and provides
//! writable edges onto it; a producer side accepts the downstream edge and
//! writes through it.
//!
//! Data flow: `Source -> Edge -> (optional Router) -> Edge -> Sink`. Every
//! runnable operator follows the same loop: pull from upstream, process,
//! push downstream, until the upstream closes, termination is requested, or
//! a fatal status is observed.
//!
//! ## Module Structure
//!
//! - [`entrypoint`]: Manual injection endpoint for wiring data in by hand
//! - [`source`]: Generator-driven sources
//! - [`process`]: One-in/N-out processing nodes
//! - [`sink`]: Callback sinks
//! - [`router`]: Key-based and tagged demultiplexers

pub mod entrypoint;
pub mod process;
pub mod router;
pub mod sink;
pub mod source;

pub use entrypoint::WritableEntrypoint;
pub use process::{NodeOutput, ProcessingNode};
pub use router::{
    DynamicRouterComponent, Router, RouterError, RouterRunnable, RouterSource,
    StaticRouterComponent, TaggedRouter,
};
pub use sink::LambdaSink;
pub use source::{LambdaSource, SourceContext};
