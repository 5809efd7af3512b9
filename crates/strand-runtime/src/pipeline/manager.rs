//! Assignment reconciliation and segment lifecycle.

use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;

use strand_core::edge::AdapterRegistry;
use strand_core::runnable::{EngineFactory, Runner};

use crate::manifold::ManifoldLayer;
use crate::transport::DataPlane;

use super::address::SegmentAddress;
use super::definition::{PipelineDefinition, SegmentBuilder};
use super::PipelineError;

/// The assignment the control plane pushes: which segment should run at
/// which address. Addresses carry their executor, so each manager filters
/// its local share and routes the rest remotely.
pub type SegmentAssignments = FxHashMap<SegmentAddress, String>;

struct SegmentInstance {
    name: String,
    runners: Vec<Runner>,
}

/// Reconciles incoming segment assignments against the segments currently
/// running on this executor.
///
/// Per update: the diff against the current set is computed; added local
/// instances are constructed, wired to the manifold layer, and started;
/// removed instances receive `Stop` (never `Kill`) and drain on upstream
/// closure. Updates are idempotent on the current set, and a segment
/// present in the new set is never torn down.
pub struct PipelineManager {
    definition: Arc<PipelineDefinition>,
    executor_id: u16,
    factory: EngineFactory,
    adapters: Arc<AdapterRegistry>,
    manifolds: ManifoldLayer,
    current: Mutex<FxHashMap<SegmentAddress, SegmentInstance>>,
    draining: Mutex<Vec<SegmentInstance>>,
}

impl PipelineManager {
    /// Creates a manager for one executor.
    #[must_use]
    pub fn new(
        definition: Arc<PipelineDefinition>,
        executor_id: u16,
        factory: EngineFactory,
        adapters: Arc<AdapterRegistry>,
        data_plane: Arc<dyn DataPlane>,
    ) -> Self {
        Self {
            definition,
            executor_id,
            manifolds: ManifoldLayer::new(data_plane, factory.clone()),
            factory,
            adapters,
            current: Mutex::new(FxHashMap::default()),
            draining: Mutex::new(Vec::new()),
        }
    }

    /// The pipeline this manager runs.
    #[must_use]
    pub fn definition(&self) -> &Arc<PipelineDefinition> {
        &self.definition
    }

    /// This manager's executor id.
    #[must_use]
    pub fn executor_id(&self) -> u16 {
        self.executor_id
    }

    /// The manifold layer for this executor.
    #[must_use]
    pub fn manifolds(&self) -> &ManifoldLayer {
        &self.manifolds
    }

    /// Addresses of the segment instances currently running locally.
    #[must_use]
    pub fn running(&self) -> Vec<SegmentAddress> {
        let mut running: Vec<SegmentAddress> = self.current.lock().keys().copied().collect();
        running.sort_unstable();
        running
    }

    /// Applies one assignment update.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownSegment`] for an assignment naming
    /// an undeclared segment, or any build/wiring/reconciliation failure.
    pub fn push_updates(&self, assignments: &SegmentAssignments) -> Result<(), PipelineError> {
        // Resolve names. Enablement gates only local hosting: a disabled
        // local assignment is dropped entirely (it can neither start nor
        // receive), while remote addresses stay routable regardless.
        let mut desired = Vec::with_capacity(assignments.len());
        for (address, name) in assignments {
            let spec = self
                .definition
                .segment(name)
                .ok_or_else(|| PipelineError::UnknownSegment(name.clone()))?;
            let is_local = address.executor_id() == self.executor_id;
            if is_local && !spec.is_enabled() {
                continue;
            }
            desired.push((*address, Arc::clone(spec)));
        }
        desired.sort_unstable_by_key(|(address, _)| *address);

        let mut current = self.current.lock();

        // Construct and wire added local instances. Their runnables are
        // collected but not ignited until routes exist.
        let mut pending = Vec::new();
        for (address, spec) in &desired {
            if address.executor_id() != self.executor_id || current.contains_key(address) {
                continue;
            }
            let mut builder = SegmentBuilder::new(*address, &self.adapters, &self.manifolds);
            spec.build(&mut builder)?;
            pending.push((*address, spec.name().to_string(), builder.into_pending()));
        }

        // Reconcile every materialized port against the full desired map.
        for port in self.manifolds.ports() {
            let outputs: Vec<(SegmentAddress, bool)> = desired
                .iter()
                .filter(|(_, spec)| spec.ingress_ports().iter().any(|p| p == &port))
                .map(|(address, _)| (*address, address.executor_id() == self.executor_id))
                .collect();
            let inputs: Vec<SegmentAddress> = desired
                .iter()
                .filter(|(_, spec)| spec.egress_ports().iter().any(|p| p == &port))
                .map(|(address, _)| *address)
                .collect();

            let control = self
                .manifolds
                .control(&port)
                .expect("port was listed by the layer");
            control.update_inputs(&inputs);
            control.update_outputs(&outputs)?;
        }

        // Ignite the new instances now that their routes are live.
        for (address, name, launches) in pending {
            let mut runners = Vec::with_capacity(launches.len());
            for (options, runnable) in launches {
                runners.push(self.factory.launcher(options).ignite(runnable)?);
            }
            tracing::info!(segment = %name, address = %address, "segment instance started");
            current.insert(address, SegmentInstance { name, runners });
        }

        // Drain removed local instances: Stop, not Kill; upstream closure
        // (their manifold routes were dropped above) empties them out.
        let desired_addresses: FxHashSet<SegmentAddress> =
            desired.iter().map(|(address, _)| *address).collect();
        let removed: Vec<SegmentAddress> = current
            .keys()
            .filter(|address| !desired_addresses.contains(address))
            .copied()
            .collect();
        for address in removed {
            if let Some(instance) = current.remove(&address) {
                for runner in &instance.runners {
                    runner.stop();
                }
                tracing::info!(
                    segment = %instance.name,
                    address = %address,
                    "segment instance draining"
                );
                self.draining.lock().push(instance);
            }
        }

        Ok(())
    }

    /// Requests cooperative shutdown of every running segment and the
    /// manifold layer.
    pub fn stop(&self) {
        for instance in self.current.lock().values() {
            for runner in &instance.runners {
                runner.stop();
            }
        }
        self.manifolds.stop_all();
    }

    /// Forces termination of every running segment and the manifold layer.
    pub fn kill(&self) {
        for instance in self.current.lock().values() {
            for runner in &instance.runners {
                runner.kill();
            }
        }
        self.manifolds.kill_all();
    }

    /// Joins every segment instance (draining ones first) and the manifold
    /// layer.
    ///
    /// # Errors
    ///
    /// The first fatal error any runnable reported.
    pub fn join(&self) -> Result<(), PipelineError> {
        let mut first_fatal: Option<PipelineError> = None;

        let draining = std::mem::take(&mut *self.draining.lock());
        let current = std::mem::take(&mut *self.current.lock());
        for instance in draining.into_iter().chain(current.into_values()) {
            for runner in &instance.runners {
                if let Err(error) = runner.await_join() {
                    tracing::error!(segment = %instance.name, %error, "segment runnable failed");
                    if first_fatal.is_none() {
                        first_fatal = Some(PipelineError::Run(error));
                    }
                }
            }
        }

        if let Err(error) = self.manifolds.join_all() {
            if first_fatal.is_none() {
                first_fatal = Some(PipelineError::Run(error));
            }
        }

        match first_fatal {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("pipeline", &self.definition.name())
            .field("executor_id", &self.executor_id)
            .field("running", &self.current.lock().len())
            .field("draining", &self.draining.lock().len())
            .finish_non_exhaustive()
    }
}
