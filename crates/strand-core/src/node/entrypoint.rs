//! Manual injection endpoint.

use std::sync::Arc;

use crate::channel::ChannelError;
use crate::edge::{EdgeError, WritableAcceptor, WritableEdge, WritableSlot};

/// A producer endpoint driven by hand instead of by an engine.
///
/// Used to push data into a wired graph from the embedding code: segment
/// ingress ports and tests. Dropping the entrypoint (or calling
/// [`finish`](Self::finish)) releases the downstream edge, signalling
/// upstream completion.
pub struct WritableEntrypoint<T> {
    output: WritableSlot<T>,
}

impl<T: Send> WritableEntrypoint<T> {
    /// Creates an unbound entrypoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            output: WritableSlot::new("entrypoint.output"),
        }
    }

    /// Writes a value through the bound edge.
    ///
    /// # Errors
    ///
    /// Returns the downstream status, or `Fault` if the entrypoint was
    /// never wired.
    pub fn await_write(&self, value: T) -> Result<(), ChannelError> {
        let edge = self
            .output
            .get()
            .map_err(|e| ChannelError::Fault(e.to_string()))?;
        edge.await_write(value)
    }

    /// Releases the downstream edge, signalling completion.
    pub fn finish(&self) {
        self.output.release();
    }

    /// Returns true if an edge is bound.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.output.is_bound()
    }
}

impl<T: Send> Default for WritableEntrypoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WritableAcceptor<T> for WritableEntrypoint<T> {
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<T>>) -> Result<(), EdgeError> {
        self.output.bind(edge)
    }
}
