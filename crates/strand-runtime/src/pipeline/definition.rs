//! Embedder-facing pipeline description.
//!
//! A [`PipelineDefinition`] names its segments and, per segment, the
//! ingress/egress ports and a build callback. The callback runs once per
//! placed instance: it constructs the segment's nodes, wires them with
//! edges, attaches ports to the manifold layer, and launches the segment's
//! runnables through the provided [`SegmentBuilder`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use strand_core::edge::{
    make_edge, AdapterRegistry, WritableAcceptor, WritableProvider,
};
use strand_core::runnable::{LaunchOptions, Runnable};

use crate::codable::Codable;
use crate::manifold::ManifoldLayer;

use super::address::SegmentAddress;
use super::PipelineError;

type SegmentBuildFn = Arc<dyn Fn(&mut SegmentBuilder<'_>) -> Result<(), PipelineError> + Send + Sync>;

/// One segment declaration: name, ports, enablement, and the build
/// callback.
pub struct SegmentSpec {
    name: String,
    /// Segments rarely declare more than a couple of ports.
    ingress_ports: SmallVec<[String; 2]>,
    egress_ports: SmallVec<[String; 2]>,
    enabled: AtomicBool,
    build: SegmentBuildFn,
}

impl SegmentSpec {
    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ports this segment consumes.
    #[must_use]
    pub fn ingress_ports(&self) -> &[String] {
        &self.ingress_ports
    }

    /// Ports this segment produces.
    #[must_use]
    pub fn egress_ports(&self) -> &[String] {
        &self.egress_ports
    }

    /// Whether instances of this segment may start here.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggles local enablement.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn build(&self, builder: &mut SegmentBuilder<'_>) -> Result<(), PipelineError> {
        (self.build)(builder)
    }
}

impl std::fmt::Debug for SegmentSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentSpec")
            .field("name", &self.name)
            .field("ingress_ports", &self.ingress_ports)
            .field("egress_ports", &self.egress_ports)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

/// A named pipeline: an ordered list of segment declarations.
pub struct PipelineDefinition {
    name: String,
    segments: Vec<Arc<SegmentSpec>>,
    by_name: FxHashMap<String, usize>,
}

impl PipelineDefinition {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a segment. Later declarations of the same name replace
    /// earlier ones.
    pub fn add_segment(
        &mut self,
        name: impl Into<String>,
        ingress_ports: &[&str],
        egress_ports: &[&str],
        build: impl Fn(&mut SegmentBuilder<'_>) -> Result<(), PipelineError> + Send + Sync + 'static,
    ) -> &mut Self {
        let name = name.into();
        let spec = Arc::new(SegmentSpec {
            name: name.clone(),
            ingress_ports: ingress_ports.iter().map(ToString::to_string).collect(),
            egress_ports: egress_ports.iter().map(ToString::to_string).collect(),
            enabled: AtomicBool::new(true),
            build: Arc::new(build),
        });
        if let Some(&index) = self.by_name.get(&name) {
            self.segments[index] = spec;
        } else {
            self.by_name.insert(name, self.segments.len());
            self.segments.push(spec);
        }
        self
    }

    /// The declaration for `name`.
    #[must_use]
    pub fn segment(&self, name: &str) -> Option<&Arc<SegmentSpec>> {
        self.by_name.get(name).map(|&index| &self.segments[index])
    }

    /// All declarations, in declaration order.
    #[must_use]
    pub fn segments(&self) -> &[Arc<SegmentSpec>] {
        &self.segments
    }

    /// Toggles local enablement for `name`. Returns false if the segment
    /// is not declared.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.segment(name) {
            Some(spec) => {
                spec.set_enabled(enabled);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PipelineDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineDefinition")
            .field("name", &self.name)
            .field("segments", &self.segments)
            .finish()
    }
}

/// Handed to a segment build callback: wires nodes, ports, and runnables
/// for one placed instance.
pub struct SegmentBuilder<'a> {
    address: SegmentAddress,
    adapters: &'a AdapterRegistry,
    manifolds: &'a ManifoldLayer,
    pending: Vec<(LaunchOptions, Arc<dyn Runnable>)>,
}

impl<'a> SegmentBuilder<'a> {
    pub(crate) fn new(
        address: SegmentAddress,
        adapters: &'a AdapterRegistry,
        manifolds: &'a ManifoldLayer,
    ) -> Self {
        Self {
            address,
            adapters,
            manifolds,
            pending: Vec::new(),
        }
    }

    /// The address of the instance being built.
    #[must_use]
    pub fn address(&self) -> SegmentAddress {
        self.address
    }

    /// The runtime's edge adapter registry.
    #[must_use]
    pub fn adapter_registry(&self) -> &AdapterRegistry {
        self.adapters
    }

    /// Connects two same-type endpoints inside the segment.
    ///
    /// # Errors
    ///
    /// Returns the wiring failure.
    pub fn connect<T>(
        &self,
        source: &dyn WritableAcceptor<T>,
        sink: &dyn WritableProvider<T>,
    ) -> Result<(), PipelineError> {
        make_edge(source, sink).map_err(PipelineError::Edge)
    }

    /// Schedules a segment runnable for launch. Runnables ignite together
    /// once the instance is fully wired and the manifold routes are
    /// reconciled, so nothing emits before its routes exist.
    pub fn launch(&mut self, options: LaunchOptions, runnable: Arc<dyn Runnable>) {
        self.pending.push((options, runnable));
    }

    /// Attaches a producer endpoint to the named egress port: the endpoint
    /// writes into the port's manifold.
    ///
    /// # Errors
    ///
    /// Returns the manifold or wiring failure.
    pub fn egress_port<T: Codable>(
        &mut self,
        port: &str,
        source: &dyn WritableAcceptor<T>,
    ) -> Result<(), PipelineError> {
        let manifold = self.manifolds.typed::<T>(port)?;
        let edge = manifold.input_edge(self.address);
        source.accept_writable_edge(edge).map_err(PipelineError::Edge)
    }

    /// Attaches a consumer endpoint to the named ingress port: the port's
    /// manifold delivers into the endpoint once this instance is in the
    /// reconciled output set.
    ///
    /// # Errors
    ///
    /// Returns the manifold or wiring failure.
    pub fn ingress_port<T: Codable>(
        &mut self,
        port: &str,
        sink: &dyn WritableProvider<T>,
    ) -> Result<(), PipelineError> {
        let manifold = self.manifolds.typed::<T>(port)?;
        let edge = sink.writable_edge().map_err(PipelineError::Edge)?;
        manifold.register_local_output(self.address, edge);
        Ok(())
    }

    pub(crate) fn into_pending(self) -> Vec<(LaunchOptions, Arc<dyn Runnable>)> {
        self.pending
    }
}
