//! Normalized control-plane state.
//!
//! [`ControlPlaneState`] wraps one immutable snapshot message behind shared
//! ownership. Every view holds an `Arc` back-reference to the snapshot, so
//! a view never outlives the data it indexes, and cross-entity accessors
//! resolve ids with checked lookups. Construction walks every id list and
//! materializes every view once, so an inconsistent snapshot aborts
//! immediately instead of failing at some later dereference.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::pipeline::SegmentAddress;

use super::message::{
    ControlPlaneStateMsg, ExecutorMsg, IdMap, ManifoldDefinitionMsg, ManifoldInstanceMsg,
    PipelineDefinitionMsg, PipelineInstanceMsg, ResourceState, SegmentDefinitionMsg,
    SegmentInstanceMsg, WorkerMsg,
};

struct Root {
    message: ControlPlaneStateMsg,
}

fn checked<'a, E>(map: &'a IdMap<E>, id: u64, map_name: &str) -> &'a E {
    map.get(id).unwrap_or_else(|| {
        panic!("inconsistent control-plane state: {map_name} is missing id {id}")
    })
}

/// A normalized, shared-ownership view over one control-plane snapshot.
///
/// Equality is structural equality of the underlying messages, not
/// identity.
#[derive(Clone)]
pub struct ControlPlaneState {
    root: Arc<Root>,
}

impl ControlPlaneState {
    /// Wraps and verifies a snapshot.
    ///
    /// # Panics
    ///
    /// Panics with a diagnostic if any id list references an entity missing
    /// from its map, or any cross-entity pointer dangles. Either is
    /// inconsistent control-plane state, a programming error.
    #[must_use]
    pub fn new(message: ControlPlaneStateMsg) -> Self {
        let state = Self {
            root: Arc::new(Root { message }),
        };
        state.initialize();
        state
    }

    /// Walks every id list, materializing each view and touching its
    /// cross-references.
    fn initialize(&self) {
        for executor in self.executors() {
            let _ = executor.workers();
            let _ = executor.assigned_pipelines();
            let _ = executor.mapped_pipeline_definitions();
        }
        for worker in self.workers() {
            let _ = worker.executor();
            let _ = worker.assigned_segments();
        }
        for definition in self.pipeline_definitions() {
            let _ = definition.instances();
            for manifold in definition.manifolds() {
                let _ = manifold.parent();
                let _ = manifold.instances();
            }
            for segment in definition.segments() {
                let _ = segment.parent();
                let _ = segment.instances();
            }
        }
        for instance in self.pipeline_instances() {
            let _ = instance.definition();
            let _ = instance.manifolds();
            let _ = instance.segments();
        }
        for manifold in self.manifold_instances() {
            let _ = manifold.pipeline_instance();
        }
        for segment in self.segment_instances() {
            let _ = segment.pipeline_instance();
            let _ = segment.definition();
        }
    }

    /// Snapshot sequence number.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.root.message.nonce
    }

    /// The raw snapshot message.
    #[must_use]
    pub fn message(&self) -> &ControlPlaneStateMsg {
        &self.root.message
    }

    /// Executor views in publication order.
    #[must_use]
    pub fn executors(&self) -> Vec<ExecutorView> {
        self.ordered(&self.root.message.executors, "executors", |root, id| {
            ExecutorView { root, id }
        })
    }

    /// The executor view for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the id is absent.
    #[must_use]
    pub fn executor(&self, id: u64) -> ExecutorView {
        checked(&self.root.message.executors, id, "executors");
        ExecutorView {
            root: Arc::clone(&self.root),
            id,
        }
    }

    /// Worker views in publication order.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerView> {
        self.ordered(&self.root.message.workers, "workers", |root, id| WorkerView {
            root,
            id,
        })
    }

    /// Pipeline definition views in publication order.
    #[must_use]
    pub fn pipeline_definitions(&self) -> Vec<PipelineDefinitionView> {
        self.ordered(
            &self.root.message.pipeline_definitions,
            "pipeline_definitions",
            |root, id| PipelineDefinitionView { root, id },
        )
    }

    /// Pipeline instance views in publication order.
    #[must_use]
    pub fn pipeline_instances(&self) -> Vec<PipelineInstanceView> {
        self.ordered(
            &self.root.message.pipeline_instances,
            "pipeline_instances",
            |root, id| PipelineInstanceView { root, id },
        )
    }

    /// Manifold instance views in publication order.
    #[must_use]
    pub fn manifold_instances(&self) -> Vec<ManifoldInstanceView> {
        self.ordered(
            &self.root.message.manifold_instances,
            "manifold_instances",
            |root, id| ManifoldInstanceView { root, id },
        )
    }

    /// Segment instance views in publication order.
    #[must_use]
    pub fn segment_instances(&self) -> Vec<SegmentInstanceView> {
        self.ordered(
            &self.root.message.segment_instances,
            "segment_instances",
            |root, id| SegmentInstanceView { root, id },
        )
    }

    fn ordered<E, V>(
        &self,
        map: &IdMap<E>,
        map_name: &str,
        make: impl Fn(Arc<Root>, u64) -> V,
    ) -> Vec<V> {
        map.ids
            .iter()
            .map(|&id| {
                checked(map, id, map_name);
                make(Arc::clone(&self.root), id)
            })
            .collect()
    }
}

impl PartialEq for ControlPlaneState {
    fn eq(&self, other: &Self) -> bool {
        self.root.message == other.root.message
    }
}

impl std::fmt::Debug for ControlPlaneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneState")
            .field("nonce", &self.nonce())
            .field("executors", &self.root.message.executors.len())
            .field("workers", &self.root.message.workers.len())
            .field(
                "segment_instances",
                &self.root.message.segment_instances.len(),
            )
            .finish_non_exhaustive()
    }
}

/// View over one executor entity.
#[derive(Clone)]
pub struct ExecutorView {
    root: Arc<Root>,
    id: u64,
}

impl ExecutorView {
    fn message(&self) -> &ExecutorMsg {
        checked(&self.root.message.executors, self.id, "executors")
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection info for peers.
    #[must_use]
    pub fn peer_info(&self) -> String {
        self.message().peer_info.clone()
    }

    /// Lifecycle status pair.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.message().state
    }

    /// Workers hosted by this executor.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerView> {
        self.message()
            .worker_ids
            .iter()
            .map(|&id| {
                checked(&self.root.message.workers, id, "workers");
                WorkerView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }

    /// Pipeline instances assigned to this executor.
    #[must_use]
    pub fn assigned_pipelines(&self) -> Vec<PipelineInstanceView> {
        self.message()
            .assigned_pipeline_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.pipeline_instances,
                    id,
                    "pipeline_instances",
                );
                PipelineInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }

    /// Pipeline definitions mapped onto this executor.
    #[must_use]
    pub fn mapped_pipeline_definitions(&self) -> Vec<PipelineDefinitionView> {
        self.message()
            .mapped_pipeline_definitions
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.pipeline_definitions,
                    id,
                    "pipeline_definitions",
                );
                PipelineDefinitionView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }
}

/// View over one worker entity.
#[derive(Clone)]
pub struct WorkerView {
    root: Arc<Root>,
    id: u64,
}

impl WorkerView {
    fn message(&self) -> &WorkerMsg {
        checked(&self.root.message.workers, self.id, "workers")
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transport address for direct memory access.
    #[must_use]
    pub fn ucx_address(&self) -> String {
        self.message().ucx_address.clone()
    }

    /// Lifecycle status pair.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.message().state
    }

    /// The hosting executor.
    #[must_use]
    pub fn executor(&self) -> ExecutorView {
        let executor_id = self.message().executor_id;
        checked(&self.root.message.executors, executor_id, "executors");
        ExecutorView {
            root: Arc::clone(&self.root),
            id: executor_id,
        }
    }

    /// Segment instances assigned to this worker.
    #[must_use]
    pub fn assigned_segments(&self) -> Vec<SegmentInstanceView> {
        self.message()
            .assigned_segment_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.segment_instances,
                    id,
                    "segment_instances",
                );
                SegmentInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }
}

/// View over one pipeline definition.
#[derive(Clone)]
pub struct PipelineDefinitionView {
    root: Arc<Root>,
    id: u64,
}

impl PipelineDefinitionView {
    fn message(&self) -> &PipelineDefinitionMsg {
        checked(
            &self.root.message.pipeline_definitions,
            self.id,
            "pipeline_definitions",
        )
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> String {
        self.message().name.clone()
    }

    /// Instances materialized from this definition.
    #[must_use]
    pub fn instances(&self) -> Vec<PipelineInstanceView> {
        self.message()
            .instance_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.pipeline_instances,
                    id,
                    "pipeline_instances",
                );
                PipelineInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }

    /// Nested manifold definitions.
    #[must_use]
    pub fn manifolds(&self) -> Vec<ManifoldDefinitionView> {
        let mut ids: Vec<u64> = self.message().manifolds.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| ManifoldDefinitionView {
                root: Arc::clone(&self.root),
                pipeline_id: self.id,
                id,
            })
            .collect()
    }

    /// Nested segment definitions.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentDefinitionView> {
        let mut ids: Vec<u64> = self.message().segments.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| SegmentDefinitionView {
                root: Arc::clone(&self.root),
                pipeline_id: self.id,
                id,
            })
            .collect()
    }
}

/// View over a manifold definition nested in a pipeline definition.
#[derive(Clone)]
pub struct ManifoldDefinitionView {
    root: Arc<Root>,
    pipeline_id: u64,
    id: u64,
}

impl ManifoldDefinitionView {
    fn message(&self) -> &ManifoldDefinitionMsg {
        let pipeline = checked(
            &self.root.message.pipeline_definitions,
            self.pipeline_id,
            "pipeline_definitions",
        );
        pipeline.manifolds.get(&self.id).unwrap_or_else(|| {
            panic!(
                "inconsistent control-plane state: pipeline_definitions[{}].manifolds is missing id {}",
                self.pipeline_id, self.id
            )
        })
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The owning pipeline definition.
    #[must_use]
    pub fn parent(&self) -> PipelineDefinitionView {
        let parent_id = self.message().parent_id;
        checked(
            &self.root.message.pipeline_definitions,
            parent_id,
            "pipeline_definitions",
        );
        PipelineDefinitionView {
            root: Arc::clone(&self.root),
            id: parent_id,
        }
    }

    /// The port this manifold joins.
    #[must_use]
    pub fn port_name(&self) -> String {
        self.message().port_name.clone()
    }

    /// Instances materialized from this definition.
    #[must_use]
    pub fn instances(&self) -> Vec<ManifoldInstanceView> {
        self.message()
            .instance_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.manifold_instances,
                    id,
                    "manifold_instances",
                );
                ManifoldInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }
}

/// View over a segment definition nested in a pipeline definition.
#[derive(Clone)]
pub struct SegmentDefinitionView {
    root: Arc<Root>,
    pipeline_id: u64,
    id: u64,
}

impl SegmentDefinitionView {
    fn message(&self) -> &SegmentDefinitionMsg {
        let pipeline = checked(
            &self.root.message.pipeline_definitions,
            self.pipeline_id,
            "pipeline_definitions",
        );
        pipeline.segments.get(&self.id).unwrap_or_else(|| {
            panic!(
                "inconsistent control-plane state: pipeline_definitions[{}].segments is missing id {}",
                self.pipeline_id, self.id
            )
        })
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The owning pipeline definition.
    #[must_use]
    pub fn parent(&self) -> PipelineDefinitionView {
        let parent_id = self.message().parent_id;
        checked(
            &self.root.message.pipeline_definitions,
            parent_id,
            "pipeline_definitions",
        );
        PipelineDefinitionView {
            root: Arc::clone(&self.root),
            id: parent_id,
        }
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> String {
        self.message().name.clone()
    }

    /// Ports this segment consumes.
    #[must_use]
    pub fn ingress_ports(&self) -> Vec<String> {
        self.message().ingress_ports.clone()
    }

    /// Ports this segment produces.
    #[must_use]
    pub fn egress_ports(&self) -> Vec<String> {
        self.message().egress_ports.clone()
    }

    /// Instances materialized from this definition.
    #[must_use]
    pub fn instances(&self) -> Vec<SegmentInstanceView> {
        self.message()
            .instance_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.segment_instances,
                    id,
                    "segment_instances",
                );
                SegmentInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }
}

/// View over one pipeline instance.
#[derive(Clone)]
pub struct PipelineInstanceView {
    root: Arc<Root>,
    id: u64,
}

impl PipelineInstanceView {
    fn message(&self) -> &PipelineInstanceMsg {
        checked(
            &self.root.message.pipeline_instances,
            self.id,
            "pipeline_instances",
        )
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The definition this instance materializes.
    #[must_use]
    pub fn definition(&self) -> PipelineDefinitionView {
        let definition_id = self.message().definition_id;
        checked(
            &self.root.message.pipeline_definitions,
            definition_id,
            "pipeline_definitions",
        );
        PipelineDefinitionView {
            root: Arc::clone(&self.root),
            id: definition_id,
        }
    }

    /// The hosting executor's id.
    #[must_use]
    pub fn executor_id(&self) -> u64 {
        self.message().executor_id
    }

    /// Lifecycle status pair.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.message().state
    }

    /// Manifold instances belonging to this pipeline instance.
    #[must_use]
    pub fn manifolds(&self) -> Vec<ManifoldInstanceView> {
        self.message()
            .manifold_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.manifold_instances,
                    id,
                    "manifold_instances",
                );
                ManifoldInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }

    /// Segment instances belonging to this pipeline instance.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInstanceView> {
        self.message()
            .segment_ids
            .iter()
            .map(|&id| {
                checked(
                    &self.root.message.segment_instances,
                    id,
                    "segment_instances",
                );
                SegmentInstanceView {
                    root: Arc::clone(&self.root),
                    id,
                }
            })
            .collect()
    }
}

/// View over one manifold instance.
#[derive(Clone)]
pub struct ManifoldInstanceView {
    root: Arc<Root>,
    id: u64,
}

impl ManifoldInstanceView {
    fn message(&self) -> &ManifoldInstanceMsg {
        checked(
            &self.root.message.manifold_instances,
            self.id,
            "manifold_instances",
        )
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The port this manifold joins.
    #[must_use]
    pub fn port_name(&self) -> String {
        self.message().port_name.clone()
    }

    /// Lifecycle status pair.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.message().state
    }

    /// The owning pipeline instance.
    #[must_use]
    pub fn pipeline_instance(&self) -> PipelineInstanceView {
        let instance_id = self.message().pipeline_instance_id;
        checked(
            &self.root.message.pipeline_instances,
            instance_id,
            "pipeline_instances",
        );
        PipelineInstanceView {
            root: Arc::clone(&self.root),
            id: instance_id,
        }
    }

    /// Requested input segments with their is-local flags.
    #[must_use]
    pub fn requested_input_segments(&self) -> FxHashMap<SegmentAddress, bool> {
        self.message()
            .requested_input_segments
            .iter()
            .map(|(&raw, &is_local)| (SegmentAddress::from_raw(raw), is_local))
            .collect()
    }

    /// Requested output segments with their is-local flags.
    #[must_use]
    pub fn requested_output_segments(&self) -> FxHashMap<SegmentAddress, bool> {
        self.message()
            .requested_output_segments
            .iter()
            .map(|(&raw, &is_local)| (SegmentAddress::from_raw(raw), is_local))
            .collect()
    }
}

/// View over one segment instance.
#[derive(Clone)]
pub struct SegmentInstanceView {
    root: Arc<Root>,
    id: u64,
}

impl SegmentInstanceView {
    fn message(&self) -> &SegmentInstanceMsg {
        checked(
            &self.root.message.segment_instances,
            self.id,
            "segment_instances",
        )
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Packed placement address.
    #[must_use]
    pub fn address(&self) -> SegmentAddress {
        SegmentAddress::from_raw(self.message().address)
    }

    /// The worker hosting this instance.
    #[must_use]
    pub fn worker_id(&self) -> u64 {
        self.message().worker_id
    }

    /// Lifecycle status pair.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.message().state
    }

    /// The owning pipeline instance.
    #[must_use]
    pub fn pipeline_instance(&self) -> PipelineInstanceView {
        let instance_id = self.message().pipeline_instance_id;
        checked(
            &self.root.message.pipeline_instances,
            instance_id,
            "pipeline_instances",
        );
        PipelineInstanceView {
            root: Arc::clone(&self.root),
            id: instance_id,
        }
    }

    /// The nested segment definition this instance materializes.
    #[must_use]
    pub fn definition(&self) -> SegmentDefinitionView {
        let definition_id = self.message().definition_id;
        let pipeline = self.pipeline_instance().definition();
        let view = SegmentDefinitionView {
            root: Arc::clone(&self.root),
            pipeline_id: pipeline.id(),
            id: definition_id,
        };
        // Force the checked lookup now rather than on first field access.
        let _ = view.message();
        view
    }

    /// The segment's name, resolved through its definition.
    #[must_use]
    pub fn name(&self) -> String {
        self.definition().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::message::{ResourceActualStatus, ResourceRequestedStatus};

    /// One executor, one worker, a two-segment pipeline with a manifold,
    /// all instances placed.
    fn sample_message() -> ControlPlaneStateMsg {
        let mut msg = ControlPlaneStateMsg {
            nonce: 10,
            ..ControlPlaneStateMsg::default()
        };

        msg.executors.insert(
            1,
            ExecutorMsg {
                id: 1,
                peer_info: "tcp://a:9000".to_string(),
                worker_ids: vec![11],
                assigned_pipeline_ids: vec![100],
                mapped_pipeline_definitions: vec![50],
                state: ResourceState::default(),
            },
        );
        msg.workers.insert(
            11,
            WorkerMsg {
                id: 11,
                ucx_address: "ucx://a".to_string(),
                executor_id: 1,
                assigned_segment_ids: vec![200, 201],
                state: ResourceState::default(),
            },
        );

        let mut definition = PipelineDefinitionMsg {
            id: 50,
            name: "flow".to_string(),
            instance_ids: vec![100],
            ..PipelineDefinitionMsg::default()
        };
        definition.manifolds.insert(
            60,
            ManifoldDefinitionMsg {
                id: 60,
                parent_id: 50,
                port_name: "port0".to_string(),
                instance_ids: vec![300],
            },
        );
        definition.segments.insert(
            70,
            SegmentDefinitionMsg {
                id: 70,
                parent_id: 50,
                name: "producer".to_string(),
                ingress_ports: vec![],
                egress_ports: vec!["port0".to_string()],
                instance_ids: vec![200],
            },
        );
        definition.segments.insert(
            71,
            SegmentDefinitionMsg {
                id: 71,
                parent_id: 50,
                name: "consumer".to_string(),
                ingress_ports: vec!["port0".to_string()],
                egress_ports: vec![],
                instance_ids: vec![201],
            },
        );
        msg.pipeline_definitions.insert(50, definition);

        msg.pipeline_instances.insert(
            100,
            PipelineInstanceMsg {
                id: 100,
                definition_id: 50,
                executor_id: 1,
                manifold_ids: vec![300],
                segment_ids: vec![200, 201],
                state: ResourceState {
                    requested_status: ResourceRequestedStatus::Created,
                    actual_status: ResourceActualStatus::Created,
                },
            },
        );

        let producer_addr = SegmentAddress::new(1, 0, 0).raw();
        let consumer_addr = SegmentAddress::new(1, 0, 1).raw();

        let mut manifold = ManifoldInstanceMsg {
            id: 300,
            pipeline_instance_id: 100,
            port_name: "port0".to_string(),
            ..ManifoldInstanceMsg::default()
        };
        manifold.requested_input_segments.insert(producer_addr, true);
        manifold
            .requested_output_segments
            .insert(consumer_addr, true);
        msg.manifold_instances.insert(300, manifold);

        msg.segment_instances.insert(
            200,
            SegmentInstanceMsg {
                id: 200,
                pipeline_instance_id: 100,
                definition_id: 70,
                address: producer_addr,
                worker_id: 11,
                state: ResourceState::default(),
            },
        );
        msg.segment_instances.insert(
            201,
            SegmentInstanceMsg {
                id: 201,
                pipeline_instance_id: 100,
                definition_id: 71,
                address: consumer_addr,
                worker_id: 11,
                state: ResourceState::default(),
            },
        );

        msg
    }

    #[test]
    fn test_navigation() {
        let state = ControlPlaneState::new(sample_message());
        assert_eq!(state.nonce(), 10);

        let workers = state.workers();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].executor().id(), 1);
        assert_eq!(workers[0].executor().peer_info(), "tcp://a:9000");

        let segments = workers[0].assigned_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name(), "producer");
        assert_eq!(segments[1].name(), "consumer");
        assert_eq!(segments[0].address(), SegmentAddress::new(1, 0, 0));
    }

    #[test]
    fn test_definition_navigation() {
        let state = ControlPlaneState::new(sample_message());
        let definitions = state.pipeline_definitions();
        assert_eq!(definitions.len(), 1);

        let segments = definitions[0].segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].parent().name(), "flow");
        assert_eq!(segments[0].egress_ports(), vec!["port0".to_string()]);
        assert_eq!(segments[1].ingress_ports(), vec!["port0".to_string()]);

        let manifolds = definitions[0].manifolds();
        assert_eq!(manifolds.len(), 1);
        assert_eq!(manifolds[0].port_name(), "port0");
        assert_eq!(manifolds[0].instances().len(), 1);
    }

    #[test]
    fn test_manifold_requested_sets() {
        let state = ControlPlaneState::new(sample_message());
        let manifold = &state.manifold_instances()[0];

        let inputs = manifold.requested_input_segments();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs.get(&SegmentAddress::new(1, 0, 0)), Some(&true));

        let outputs = manifold.requested_output_segments();
        assert_eq!(outputs.get(&SegmentAddress::new(1, 0, 1)), Some(&true));
    }

    #[test]
    fn test_structural_equality_not_identity() {
        let a = ControlPlaneState::new(sample_message());
        let b = ControlPlaneState::new(sample_message());
        assert_eq!(a, b);

        let mut message = sample_message();
        message.nonce = 11;
        let c = ControlPlaneState::new(message);
        assert_ne!(a, c);
    }

    #[test]
    #[should_panic(expected = "inconsistent control-plane state")]
    fn test_missing_cross_reference_aborts() {
        let mut message = sample_message();
        // Point the worker at an executor that does not exist.
        message.workers.entities.get_mut(&11).unwrap().executor_id = 999;
        let _ = ControlPlaneState::new(message);
    }

    #[test]
    #[should_panic(expected = "inconsistent control-plane state")]
    fn test_id_list_without_entity_aborts() {
        let mut message = sample_message();
        message.executors.ids.push(424_242);
        let _ = ControlPlaneState::new(message);
    }
}
