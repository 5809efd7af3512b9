//! Cross-type edge adapters.
//!
//! The registry maps `(source type, target type)` to a conversion function.
//! It is owned by the runtime handle and threaded through wiring calls;
//! there is no process-global table.

use std::any::{Any, TypeId};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::channel::ChannelError;

use super::connect::WritableEdge;
use super::error::EdgeError;

type AdapterFn<S, D> = Arc<dyn Fn(S) -> D + Send + Sync>;

/// Registry of type adapters for cross-type edges.
///
/// Lookups happen at edge-build time only; a missing adapter is a
/// configuration error reported before any data flows.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<FxHashMap<(TypeId, TypeId), Box<dyn Any + Send + Sync>>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter converting `S` values into `D` values.
    ///
    /// Registering a second adapter for the same pair replaces the first.
    pub fn register<S, D>(&self, adapter: impl Fn(S) -> D + Send + Sync + 'static)
    where
        S: 'static,
        D: 'static,
    {
        let adapter: AdapterFn<S, D> = Arc::new(adapter);
        self.adapters.write().insert(
            (TypeId::of::<S>(), TypeId::of::<D>()),
            Box::new(adapter),
        );
    }

    /// Returns true if an adapter is registered for `S -> D`.
    #[must_use]
    pub fn has_adapter<S: 'static, D: 'static>(&self) -> bool {
        self.adapters
            .read()
            .contains_key(&(TypeId::of::<S>(), TypeId::of::<D>()))
    }

    /// Wraps a writable edge of `D` so that it accepts `S` values.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::NoAdapter`] if no adapter is registered for the
    /// pair.
    pub fn adapt<S, D>(
        &self,
        downstream: Arc<dyn WritableEdge<D>>,
    ) -> Result<Arc<dyn WritableEdge<S>>, EdgeError>
    where
        S: Send + 'static,
        D: Send + 'static,
    {
        let adapters = self.adapters.read();
        let entry = adapters
            .get(&(TypeId::of::<S>(), TypeId::of::<D>()))
            .ok_or(EdgeError::NoAdapter {
                source_type: std::any::type_name::<S>(),
                target_type: std::any::type_name::<D>(),
            })?;

        // The map is keyed by (TypeId::of::<S>, TypeId::of::<D>), so the
        // stored closure is always an AdapterFn<S, D>.
        let convert = entry
            .downcast_ref::<AdapterFn<S, D>>()
            .expect("adapter registry entry has the keyed type")
            .clone();

        Ok(Arc::new(AdaptedEdge {
            convert,
            downstream,
        }))
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.read().len())
            .finish()
    }
}

/// A writable edge that converts values before forwarding them downstream.
struct AdaptedEdge<S, D> {
    convert: AdapterFn<S, D>,
    downstream: Arc<dyn WritableEdge<D>>,
}

impl<S: Send, D: Send> WritableEdge<S> for AdaptedEdge<S, D> {
    fn await_write(&self, value: S) -> Result<(), ChannelError> {
        self.downstream.await_write((self.convert)(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::edge::connect::ChannelWriter;

    #[test]
    fn test_register_and_adapt() {
        let registry = AdapterRegistry::new();
        registry.register(|x: i32| f64::from(x) * 0.5);
        assert!(registry.has_adapter::<i32, f64>());

        let channel = Arc::new(Channel::<f64>::with_capacity(4));
        let writer: Arc<dyn WritableEdge<f64>> =
            Arc::new(ChannelWriter::new(Arc::clone(&channel)));

        let adapted = registry.adapt::<i32, f64>(writer).unwrap();
        adapted.await_write(4).unwrap();

        assert_eq!(channel.await_read(), Ok(2.0));
    }

    #[test]
    fn test_missing_adapter_is_build_error() {
        let registry = AdapterRegistry::new();
        let channel = Arc::new(Channel::<String>::with_capacity(4));
        let writer: Arc<dyn WritableEdge<String>> = Arc::new(ChannelWriter::new(channel));

        let err = registry.adapt::<i32, String>(writer).err().unwrap();
        assert!(matches!(err, EdgeError::NoAdapter { .. }));
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = AdapterRegistry::new();
        registry.register(|x: i32| f64::from(x));
        registry.register(|x: i32| f64::from(x) * 10.0);

        let channel = Arc::new(Channel::<f64>::with_capacity(4));
        let writer: Arc<dyn WritableEdge<f64>> =
            Arc::new(ChannelWriter::new(Arc::clone(&channel)));
        let adapted = registry.adapt::<i32, f64>(writer).unwrap();
        adapted.await_write(1).unwrap();
        assert_eq!(channel.await_read(), Ok(10.0));
    }
}
