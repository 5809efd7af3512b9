//! The per-executor registry of manifolds, keyed by port name.

use std::any::Any;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use strand_core::runnable::{EngineFactory, RunError};

use crate::codable::Codable;
use crate::transport::DataPlane;

use super::{Manifold, ManifoldControl, ManifoldError};

struct PortBinding {
    control: Arc<dyn ManifoldControl>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Creates manifolds on first use of a port and hands out typed and
/// untyped handles to them.
pub struct ManifoldLayer {
    data_plane: Arc<dyn DataPlane>,
    factory: EngineFactory,
    ports: RwLock<FxHashMap<String, PortBinding>>,
}

impl ManifoldLayer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new(data_plane: Arc<dyn DataPlane>, factory: EngineFactory) -> Self {
        Self {
            data_plane,
            factory,
            ports: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the manifold for `port`, creating and starting it on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns [`ManifoldError::PortTypeMismatch`] if the port is already
    /// bound with a different record type, or the start failure for a new
    /// manifold.
    pub fn typed<T: Codable>(&self, port: &str) -> Result<Arc<Manifold<T>>, ManifoldError> {
        let mut ports = self.ports.write();
        if let Some(binding) = ports.get(port) {
            return Arc::clone(&binding.typed)
                .downcast::<Manifold<T>>()
                .map_err(|_| ManifoldError::PortTypeMismatch {
                    port: port.to_string(),
                });
        }

        let manifold = Manifold::<T>::new(port, Arc::clone(&self.data_plane));
        manifold.start(&self.factory)?;
        ports.insert(
            port.to_string(),
            PortBinding {
                control: Arc::clone(&manifold) as Arc<dyn ManifoldControl>,
                typed: Arc::clone(&manifold) as Arc<dyn Any + Send + Sync>,
            },
        );
        Ok(manifold)
    }

    /// Returns the untyped control handle for `port`, if the manifold
    /// exists.
    #[must_use]
    pub fn control(&self, port: &str) -> Option<Arc<dyn ManifoldControl>> {
        self.ports.read().get(port).map(|b| Arc::clone(&b.control))
    }

    /// Names of every materialized port, sorted.
    #[must_use]
    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.ports.read().keys().cloned().collect();
        ports.sort_unstable();
        ports
    }

    /// Requests shutdown of every manifold.
    pub fn stop_all(&self) {
        for binding in self.ports.read().values() {
            binding.control.stop();
        }
    }

    /// Forces termination of every manifold.
    pub fn kill_all(&self) {
        for binding in self.ports.read().values() {
            binding.control.kill();
        }
    }

    /// Joins every manifold's ingress loops.
    ///
    /// # Errors
    ///
    /// The first fatal [`RunError`] any manifold reported.
    pub fn join_all(&self) -> Result<(), RunError> {
        let controls: Vec<Arc<dyn ManifoldControl>> = self
            .ports
            .read()
            .values()
            .map(|b| Arc::clone(&b.control))
            .collect();
        let mut result = Ok(());
        for control in controls {
            let joined = control.join();
            if result.is_ok() {
                result = joined;
            }
        }
        result
    }
}

impl std::fmt::Debug for ManifoldLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifoldLayer")
            .field("ports", &self.ports())
            .finish_non_exhaustive()
    }
}
