//! # Embedder surface
//!
//! An [`Executor`] hosts pipeline segments in one process: the embedder
//! registers a pipeline, toggles per-segment enablement, starts the
//! executor, feeds it assignment updates (directly or derived from a
//! control-plane snapshot), and finally stops and joins it. `join`
//! returns a process exit code: `0` on a clean join, non-zero after a
//! fatal runtime error.

use std::sync::Arc;

use parking_lot::Mutex;

use strand_core::edge::AdapterRegistry;
use strand_core::runnable::EngineFactory;

use crate::pipeline::{
    PipelineDefinition, PipelineError, PipelineManager, SegmentAssignments,
};
use crate::state::ControlPlaneState;
use crate::transport::DataPlane;

/// Exit code for a clean join.
pub const EXIT_OK: i32 = 0;
/// Exit code after a fatal runtime error.
pub const EXIT_FAILURE: i32 = 1;

/// Executor lifecycle failures.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// `start` was called before a pipeline was registered.
    #[error("no pipeline registered")]
    NoPipeline,

    /// An operation requiring a started executor ran before `start`.
    #[error("executor is not started")]
    NotStarted,

    /// `start` was called twice.
    #[error("executor is already started")]
    AlreadyStarted,

    /// A pipeline-level failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// One executor process hosting pipeline segments.
pub struct Executor {
    executor_id: u16,
    factory: EngineFactory,
    adapters: Arc<AdapterRegistry>,
    data_plane: Arc<dyn DataPlane>,
    definition: Mutex<Option<Arc<PipelineDefinition>>>,
    manager: Mutex<Option<Arc<PipelineManager>>>,
}

impl Executor {
    /// Creates an executor with the given id and data-plane client.
    #[must_use]
    pub fn new(executor_id: u16, data_plane: Arc<dyn DataPlane>) -> Self {
        Self {
            executor_id,
            factory: EngineFactory::new(),
            adapters: Arc::new(AdapterRegistry::new()),
            data_plane,
            definition: Mutex::new(None),
            manager: Mutex::new(None),
        }
    }

    /// This executor's id.
    #[must_use]
    pub fn executor_id(&self) -> u16 {
        self.executor_id
    }

    /// The edge adapter registry threaded through segment builds.
    #[must_use]
    pub fn adapter_registry(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    /// The engine factory driving this executor's runnables.
    #[must_use]
    pub fn engine_factory(&self) -> &EngineFactory {
        &self.factory
    }

    /// Registers the pipeline this executor will run. Replaces any prior
    /// registration until `start`.
    pub fn register_pipeline(&self, definition: PipelineDefinition) {
        *self.definition.lock() = Some(Arc::new(definition));
    }

    /// Toggles local enablement of a segment. Returns false if no pipeline
    /// is registered or the segment is not declared.
    pub fn set_segment_enabled(&self, segment: &str, enabled: bool) -> bool {
        self.definition
            .lock()
            .as_ref()
            .is_some_and(|definition| definition.set_enabled(segment, enabled))
    }

    /// Brings up the pipeline manager.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NoPipeline`] without a registered pipeline
    /// or [`ExecutorError::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<(), ExecutorError> {
        let definition = self
            .definition
            .lock()
            .clone()
            .ok_or(ExecutorError::NoPipeline)?;
        let mut manager = self.manager.lock();
        if manager.is_some() {
            return Err(ExecutorError::AlreadyStarted);
        }
        *manager = Some(Arc::new(PipelineManager::new(
            definition,
            self.executor_id,
            self.factory.clone(),
            Arc::clone(&self.adapters),
            Arc::clone(&self.data_plane),
        )));
        tracing::info!(executor_id = self.executor_id, "executor started");
        Ok(())
    }

    /// Applies one segment-assignment update.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NotStarted`] before `start`, or the
    /// reconciliation failure.
    pub fn push_updates(&self, assignments: &SegmentAssignments) -> Result<(), ExecutorError> {
        let manager = self
            .manager
            .lock()
            .clone()
            .ok_or(ExecutorError::NotStarted)?;
        manager.push_updates(assignments)?;
        Ok(())
    }

    /// Derives the assignment from a control-plane snapshot (every segment
    /// instance of the registered pipeline) and applies it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::NotStarted`] before `start`, or the
    /// reconciliation failure.
    pub fn apply_state(&self, state: &ControlPlaneState) -> Result<(), ExecutorError> {
        let pipeline_name = self
            .definition
            .lock()
            .as_ref()
            .map(|definition| definition.name().to_string())
            .ok_or(ExecutorError::NoPipeline)?;

        let mut assignments = SegmentAssignments::default();
        for instance in state.segment_instances() {
            let definition = instance.definition();
            if definition.parent().name() == pipeline_name {
                assignments.insert(instance.address(), definition.name());
            }
        }
        tracing::debug!(
            nonce = state.nonce(),
            segments = assignments.len(),
            "applying control-plane snapshot"
        );
        self.push_updates(&assignments)
    }

    /// The pipeline manager, once started.
    #[must_use]
    pub fn manager(&self) -> Option<Arc<PipelineManager>> {
        self.manager.lock().clone()
    }

    /// Requests cooperative shutdown of everything running locally.
    pub fn stop(&self) {
        if let Some(manager) = self.manager.lock().as_ref() {
            manager.stop();
        }
    }

    /// Forces termination of everything running locally.
    pub fn kill(&self) {
        if let Some(manager) = self.manager.lock().as_ref() {
            manager.kill();
        }
    }

    /// Joins everything and reports the process exit code: [`EXIT_OK`] on
    /// a clean join, [`EXIT_FAILURE`] after a fatal runtime error.
    #[must_use]
    pub fn join(&self) -> i32 {
        let Some(manager) = self.manager.lock().take() else {
            return EXIT_OK;
        };
        match manager.join() {
            Ok(()) => EXIT_OK,
            Err(error) => {
                tracing::error!(%error, "executor join failed");
                EXIT_FAILURE
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("executor_id", &self.executor_id)
            .field("started", &self.manager.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackDataPlane, LoopbackFabric};

    fn executor() -> Executor {
        let fabric = LoopbackFabric::new();
        Executor::new(1, Arc::new(LoopbackDataPlane::attach(fabric, 1)))
    }

    #[test]
    fn test_start_requires_pipeline() {
        let executor = executor();
        assert!(matches!(executor.start(), Err(ExecutorError::NoPipeline)));
    }

    #[test]
    fn test_double_start_rejected() {
        let executor = executor();
        executor.register_pipeline(PipelineDefinition::new("p"));
        executor.start().unwrap();
        assert!(matches!(
            executor.start(),
            Err(ExecutorError::AlreadyStarted)
        ));
        executor.stop();
        assert_eq!(executor.join(), EXIT_OK);
    }

    #[test]
    fn test_push_before_start_rejected() {
        let executor = executor();
        let assignments = SegmentAssignments::default();
        assert!(matches!(
            executor.push_updates(&assignments),
            Err(ExecutorError::NotStarted)
        ));
    }

    #[test]
    fn test_enable_toggle() {
        let executor = executor();
        let mut definition = PipelineDefinition::new("p");
        definition.add_segment("seg", &[], &[], |_| Ok(()));
        executor.register_pipeline(definition);

        assert!(executor.set_segment_enabled("seg", false));
        assert!(!executor.set_segment_enabled("ghost", false));
    }

    #[test]
    fn test_join_without_start_is_clean() {
        let executor = executor();
        assert_eq!(executor.join(), EXIT_OK);
    }
}
