//! # Control-plane state
//!
//! The control plane publishes immutable state snapshots. The raw snapshot
//! ([`message::ControlPlaneStateMsg`]) stores every cross-entity pointer as
//! an id; the normalized wrapper ([`normalized::ControlPlaneState`])
//! resolves ids to views at construction time, verifying every reference
//! against the map it indexes. A missing id is inconsistent state and a
//! programming error: it aborts with a diagnostic rather than surfacing as
//! a recoverable result.
//!
//! Snapshots supersede each other by `nonce`; an old snapshot stays alive
//! for as long as any view still references it.
//!
//! ## Module Structure
//!
//! - [`message`]: Raw snapshot structs mirroring the wire schema
//! - [`normalized`]: The shared-ownership normalized view

pub mod message;
pub mod normalized;

pub use message::{
    ControlPlaneStateMsg, ExecutorMsg, IdMap, ManifoldDefinitionMsg, ManifoldInstanceMsg,
    PipelineDefinitionMsg, PipelineInstanceMsg, ResourceActualStatus, ResourceRequestedStatus,
    ResourceState, SegmentDefinitionMsg, SegmentInstanceMsg, WorkerMsg,
};
pub use normalized::{
    ControlPlaneState, ExecutorView, ManifoldDefinitionView, ManifoldInstanceView,
    PipelineDefinitionView, PipelineInstanceView, SegmentDefinitionView, SegmentInstanceView,
    WorkerView,
};
