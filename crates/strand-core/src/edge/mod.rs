//! # Typed edges
//!
//! An edge is an owning reference from a producer endpoint to a consumer
//! endpoint. The consumer side owns the channel and *provides* a writable
//! edge onto it; the producer side *accepts* that edge and writes through
//! it. Joining endpoints of different types goes through the
//! [`AdapterRegistry`], and a missing adapter fails when the edge is built,
//! never while data is flowing.
//!
//! ## Invariants
//!
//! - An endpoint has at most one bound edge at any instant, unless it is a
//!   keyed multi-acceptor (where re-binding a key replaces the prior
//!   binding).
//! - When the upstream completes, its edge handles are released; once the
//!   last writer is gone the channel closes and subsequent writes observe
//!   [`ChannelError::Closed`](crate::channel::ChannelError::Closed).
//!
//! ## Module Structure
//!
//! - [`connect`]: Edge traits, channel-backed handles, and binding slots
//! - [`adapter`]: The cross-type adapter registry
//! - [`builder`]: `make_edge` / `make_adapted_edge`
//! - [`error`]: Wiring errors

pub mod adapter;
pub mod builder;
pub mod connect;
pub mod error;

pub use adapter::AdapterRegistry;
pub use builder::{make_adapted_edge, make_edge};
pub use connect::{
    ChannelReader, ChannelWriter, MultiWritableSlot, ReadableEdge, WritableAcceptor,
    WritableEdge, WritableProvider, WritableSlot,
};
pub use error::EdgeError;
