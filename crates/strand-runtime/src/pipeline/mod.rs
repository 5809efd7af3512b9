//! # Pipelines
//!
//! A pipeline is a set of named segments; a segment is the unit of
//! placement. The embedder describes segments with build callbacks wiring
//! nodes and ports; the control plane assigns segment instances (addressed
//! by [`SegmentAddress`]) to executors; the [`PipelineManager`] reconciles
//! each assignment update against the segments currently running locally.
//!
//! ## Module Structure
//!
//! - [`address`]: Packed segment addressing
//! - [`definition`]: The embedder-facing pipeline description and the
//!   segment builder
//! - [`manager`]: Assignment reconciliation and segment lifecycle

pub mod address;
pub mod definition;
pub mod manager;

pub use address::SegmentAddress;
pub use definition::{PipelineDefinition, SegmentBuilder, SegmentSpec};
pub use manager::{PipelineManager, SegmentAssignments};

use strand_core::edge::EdgeError;
use strand_core::runnable::{EngineError, RunError};

use crate::manifold::ManifoldError;

/// Pipeline wiring and lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An assignment referenced a segment the definition does not declare.
    #[error("pipeline has no segment named '{0}'")]
    UnknownSegment(String),

    /// Edge wiring inside a segment build failed.
    #[error(transparent)]
    Edge(#[from] EdgeError),

    /// A runnable failed to launch.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Manifold wiring or reconciliation failed.
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// A segment runnable terminated with a fatal error.
    #[error(transparent)]
    Run(#[from] RunError),

    /// A segment build callback reported a failure.
    #[error("segment build failed: {0}")]
    Build(String),
}
