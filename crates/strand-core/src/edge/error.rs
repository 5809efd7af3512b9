//! Edge wiring errors.
//!
//! All of these are configuration errors: they surface synchronously while
//! the graph is assembled and are fatal to the wiring step that produced
//! them.

/// Errors raised while building or binding edges.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    /// The endpoint already has a bound edge.
    #[error("endpoint '{0}' is already bound")]
    AlreadyBound(String),

    /// The endpoint has no bound edge.
    #[error("endpoint '{0}' is not connected")]
    NotConnected(String),

    /// No adapter is registered for the requested type conversion.
    #[error("no edge adapter registered for {source_type} -> {target_type}")]
    NoAdapter {
        /// Type produced by the upstream endpoint.
        source_type: &'static str,
        /// Type consumed by the downstream endpoint.
        target_type: &'static str,
    },

    /// The provider cannot hand out another edge.
    #[error("writable edge for '{0}' was already claimed")]
    AlreadyClaimed(String),
}
