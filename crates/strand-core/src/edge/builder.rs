//! Edge construction.
//!
//! `make_edge` joins a producer endpoint to a consumer endpoint of the same
//! value type. `make_adapted_edge` joins endpoints of different types via
//! the [`AdapterRegistry`]; a missing adapter fails here, at build time.

use super::adapter::AdapterRegistry;
use super::connect::{WritableAcceptor, WritableProvider};
use super::error::EdgeError;

/// Joins a producer endpoint to a same-type consumer endpoint.
///
/// The consumer provides a writable edge onto its channel; the producer
/// accepts it.
///
/// # Errors
///
/// Returns a wiring error if the producer is already bound or the consumer
/// cannot hand out an edge.
pub fn make_edge<T>(
    source: &dyn WritableAcceptor<T>,
    sink: &dyn WritableProvider<T>,
) -> Result<(), EdgeError> {
    let edge = sink.writable_edge()?;
    source.accept_writable_edge(edge)
}

/// Joins a producer of `S` to a consumer of `D` through a registered
/// adapter.
///
/// # Errors
///
/// Returns [`EdgeError::NoAdapter`] if the registry has no `S -> D`
/// adapter, or a wiring error if either endpoint refuses the binding.
pub fn make_adapted_edge<S, D>(
    source: &dyn WritableAcceptor<S>,
    sink: &dyn WritableProvider<D>,
    registry: &AdapterRegistry,
) -> Result<(), EdgeError>
where
    S: Send + 'static,
    D: Send + 'static,
{
    let inner = sink.writable_edge()?;
    let adapted = registry.adapt::<S, D>(inner)?;
    source.accept_writable_edge(adapted)
}
