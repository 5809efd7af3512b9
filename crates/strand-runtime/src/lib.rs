//! # Strand Runtime
//!
//! The distributed layer of the Strand dataflow runtime, sitting on top of
//! the execution core in `strand-core`.
//!
//! This crate provides:
//! - **Codable**: Serialized descriptors with memory-region metadata for
//!   cross-process transport
//! - **Transport**: The pluggable data-plane interface, plus an in-process
//!   loopback implementation
//! - **Control-plane state**: A normalized, referentially-consistent view
//!   over a state snapshot
//! - **Manifold**: Typed N-to-M junctions joining segment instances within
//!   and across executors
//! - **Pipeline**: Definitions, segment addressing, and the manager that
//!   reconciles assignment updates against running segments
//! - **Pub/Sub**: Publisher/Subscriber link-up over the data plane
//! - **Executor**: The embedder-facing surface
//!
//! ## Topology
//!
//! ```text
//! ┌───────────────── executor A ─────────────────┐   ┌──── executor B ────┐
//! │  seg1 ──edge──▶ manifold("p1") ──local──▶ seg3│   │                    │
//! │                      │                        │   │                    │
//! │                      └──remote (descriptor)───┼──▶│ manifold("p1")     │
//! │                                               │   │   └──local──▶ seg2 │
//! └───────────────────────────────────────────────┘   └────────────────────┘
//! ```
//!
//! Control flow: the control plane produces state snapshots; the pipeline
//! manager diffs segment assignments and starts or drains segments; the
//! manifold layer reconciles its routes against the requested input/output
//! sets.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codable;
pub mod executor;
pub mod manifold;
pub mod pipeline;
pub mod pubsub;
pub mod state;
pub mod transport;

// Re-export key types
pub use executor::Executor;
pub use pipeline::{PipelineDefinition, PipelineManager, SegmentAddress};

/// Result type for strand-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for strand-runtime
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Descriptor encode/decode errors
    #[error("Codable error: {0}")]
    Codable(#[from] codable::CodableError),

    /// Data-plane transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Manifold routing and reconciliation errors
    #[error("Manifold error: {0}")]
    Manifold(#[from] manifold::ManifoldError),

    /// Pipeline wiring and lifecycle errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),

    /// Pub/sub link-up errors
    #[error("PubSub error: {0}")]
    PubSub(#[from] pubsub::PubSubError),

    /// Executor lifecycle errors
    #[error("Executor error: {0}")]
    Executor(#[from] executor::ExecutorError),

    /// Errors bubbled up from the execution core
    #[error("Core error: {0}")]
    Core(#[from] strand_core::Error),
}
