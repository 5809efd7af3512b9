//! Raw control-plane snapshot messages.
//!
//! These structs mirror the wire schema: integer-keyed entity maps with
//! parallel `ids` lists for stable ordering, a monotonically increasing
//! `nonce`, and cross-entity pointers stored as ids. Equality is
//! structural, so two snapshots with identical content compare equal
//! regardless of how they were produced.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Integer-keyed entity map with a parallel `ids` list for stable
/// ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdMap<E> {
    /// Entity ids in publication order.
    pub ids: Vec<u64>,
    /// Entities keyed by id.
    pub entities: FxHashMap<u64, E>,
}

impl<E> Default for IdMap<E> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entities: FxHashMap::default(),
        }
    }
}

impl<E> IdMap<E> {
    /// Inserts an entity, appending its id to the ordering list.
    pub fn insert(&mut self, id: u64, entity: E) {
        if !self.entities.contains_key(&id) {
            self.ids.push(id);
        }
        self.entities.insert(id, entity);
    }

    /// Returns the entity for `id`.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&E> {
        self.entities.get(&id)
    }

    /// Returns true if `id` is present.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.entities.contains_key(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the map holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates entities in publication order. Ids missing from the entity
    /// map are skipped here; the normalized wrapper treats them as a hard
    /// error instead.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (u64, &E)> {
        self.ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (*id, e)))
    }
}

/// Requested lifecycle status of a resource, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ResourceRequestedStatus {
    /// No request recorded yet.
    #[default]
    Unknown,
    /// Resource should be initialized.
    Initialized,
    /// Resource should be created and running.
    Created,
    /// Resource should finish its work.
    Completed,
    /// Resource should stop.
    Stopped,
    /// Resource should be torn down.
    Destroyed,
}

/// Observed lifecycle status of a resource, ordered by severity. The
/// control loop drives `actual` toward `requested`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ResourceActualStatus {
    /// Not yet observed.
    #[default]
    Unknown,
    /// Initialized but not created.
    Initialized,
    /// Creation in progress.
    Creating,
    /// Created and running.
    Created,
    /// Completion in progress.
    Completing,
    /// Completed.
    Completed,
    /// Stop in progress.
    Stopping,
    /// Stopped.
    Stopped,
    /// Teardown in progress.
    Destroying,
    /// Torn down.
    Destroyed,
}

/// The `(requested, actual)` status pair every instance entity carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceState {
    /// Status the control plane asked for.
    pub requested_status: ResourceRequestedStatus,
    /// Status the entity last reported.
    pub actual_status: ResourceActualStatus,
}

/// An executor process registered with the control plane.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutorMsg {
    /// Entity id.
    pub id: u64,
    /// Connection info for peers.
    pub peer_info: String,
    /// Workers hosted by this executor.
    pub worker_ids: Vec<u64>,
    /// Pipeline instances assigned here.
    pub assigned_pipeline_ids: Vec<u64>,
    /// Pipeline definitions mapped onto this executor.
    pub mapped_pipeline_definitions: Vec<u64>,
    /// Lifecycle status pair.
    pub state: ResourceState,
}

/// A worker (resource partition) on an executor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkerMsg {
    /// Entity id.
    pub id: u64,
    /// Transport address for direct memory access.
    pub ucx_address: String,
    /// Owning executor.
    pub executor_id: u64,
    /// Segment instances assigned to this worker.
    pub assigned_segment_ids: Vec<u64>,
    /// Lifecycle status pair.
    pub state: ResourceState,
}

/// A manifold declaration nested in a pipeline definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManifoldDefinitionMsg {
    /// Entity id.
    pub id: u64,
    /// Owning pipeline definition.
    pub parent_id: u64,
    /// The port this manifold joins.
    pub port_name: String,
    /// Instances materialized from this definition.
    pub instance_ids: Vec<u64>,
}

/// A segment declaration nested in a pipeline definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentDefinitionMsg {
    /// Entity id.
    pub id: u64,
    /// Owning pipeline definition.
    pub parent_id: u64,
    /// Segment name.
    pub name: String,
    /// Ports this segment consumes.
    pub ingress_ports: Vec<String>,
    /// Ports this segment produces.
    pub egress_ports: Vec<String>,
    /// Instances materialized from this definition.
    pub instance_ids: Vec<u64>,
}

/// A pipeline definition with its nested manifold and segment
/// declarations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineDefinitionMsg {
    /// Entity id.
    pub id: u64,
    /// Pipeline name.
    pub name: String,
    /// Nested manifold definitions keyed by id.
    pub manifolds: FxHashMap<u64, ManifoldDefinitionMsg>,
    /// Nested segment definitions keyed by id.
    pub segments: FxHashMap<u64, SegmentDefinitionMsg>,
    /// Instances materialized from this definition.
    pub instance_ids: Vec<u64>,
}

/// A running pipeline instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineInstanceMsg {
    /// Entity id.
    pub id: u64,
    /// The definition this instance was materialized from.
    pub definition_id: u64,
    /// The executor hosting the instance.
    pub executor_id: u64,
    /// Manifold instances belonging to this pipeline instance.
    pub manifold_ids: Vec<u64>,
    /// Segment instances belonging to this pipeline instance.
    pub segment_ids: Vec<u64>,
    /// Lifecycle status pair.
    pub state: ResourceState,
}

/// A manifold instance with its requested attachment sets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManifoldInstanceMsg {
    /// Entity id.
    pub id: u64,
    /// Owning pipeline instance.
    pub pipeline_instance_id: u64,
    /// The port this manifold joins.
    pub port_name: String,
    /// Requested input segments: packed segment address to is-local flag.
    pub requested_input_segments: FxHashMap<u64, bool>,
    /// Requested output segments: packed segment address to is-local flag.
    pub requested_output_segments: FxHashMap<u64, bool>,
    /// Lifecycle status pair.
    pub state: ResourceState,
}

/// A segment instance placed on a worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentInstanceMsg {
    /// Entity id.
    pub id: u64,
    /// Owning pipeline instance.
    pub pipeline_instance_id: u64,
    /// The nested segment definition this instance materializes.
    pub definition_id: u64,
    /// Packed placement address.
    pub address: u64,
    /// The worker hosting this instance.
    pub worker_id: u64,
    /// Lifecycle status pair.
    pub state: ResourceState,
}

/// One full control-plane state snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlPlaneStateMsg {
    /// Monotonic snapshot sequence number.
    pub nonce: u64,
    /// Registered executors.
    pub executors: IdMap<ExecutorMsg>,
    /// Registered workers.
    pub workers: IdMap<WorkerMsg>,
    /// Pipeline definitions.
    pub pipeline_definitions: IdMap<PipelineDefinitionMsg>,
    /// Pipeline instances.
    pub pipeline_instances: IdMap<PipelineInstanceMsg>,
    /// Manifold instances.
    pub manifold_instances: IdMap<ManifoldInstanceMsg>,
    /// Segment instances.
    pub segment_instances: IdMap<SegmentInstanceMsg>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_preserves_order() {
        let mut map = IdMap::default();
        map.insert(5, "five");
        map.insert(1, "one");
        map.insert(3, "three");

        let ordered: Vec<u64> = map.iter_ordered().map(|(id, _)| id).collect();
        assert_eq!(ordered, vec![5, 1, 3]);
        assert_eq!(map.len(), 3);
        assert!(map.contains(1));
        assert!(!map.contains(2));
    }

    #[test]
    fn test_id_map_reinsert_keeps_single_id() {
        let mut map = IdMap::default();
        map.insert(1, "a");
        map.insert(1, "b");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(1), Some(&"b"));
    }

    #[test]
    fn test_status_severity_ordering() {
        assert!(ResourceRequestedStatus::Created < ResourceRequestedStatus::Stopped);
        assert!(ResourceActualStatus::Creating < ResourceActualStatus::Created);
        assert!(ResourceActualStatus::Stopped < ResourceActualStatus::Destroyed);
    }

    #[test]
    fn test_structural_equality() {
        let mut a = ControlPlaneStateMsg {
            nonce: 1,
            ..ControlPlaneStateMsg::default()
        };
        a.executors.insert(1, ExecutorMsg::default());

        let mut b = ControlPlaneStateMsg {
            nonce: 1,
            ..ControlPlaneStateMsg::default()
        };
        b.executors.insert(1, ExecutorMsg::default());

        assert_eq!(a, b);
        b.nonce = 2;
        assert_ne!(a, b);
    }
}
