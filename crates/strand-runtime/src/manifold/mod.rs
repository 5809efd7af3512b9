//! # Manifolds
//!
//! A manifold is the typed N-to-M junction for one named port of a
//! pipeline: it aggregates the egress edges of N local segment instances
//! and fans out to M segment inputs, local or remote, keyed by segment
//! address.
//!
//! Two ingress loops drive a manifold:
//!
//! - the **local ingress** pulls the aggregated input channel and forwards
//!   each item per the routing policy (round-robin over the currently
//!   reconciled outputs) — local outputs through an in-process edge,
//!   remote outputs encoded into a descriptor and handed to the data
//!   plane;
//! - the **network ingress** decodes descriptors arriving for the
//!   manifold's tag and forwards them to local outputs only.
//!
//! Reconfiguration is atomic: `update_outputs` builds the new routing
//! table aside and swaps it in one step, so routing continues on the
//! previous set until the swap.

pub mod layer;

pub use layer::ManifoldLayer;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::{Mutex, RwLock};

use strand_core::channel::{Channel, ChannelConfig, ChannelError};
use strand_core::edge::{ChannelWriter, ReadableEdge, WritableEdge};
use strand_core::runnable::{Context, EngineFactory, LaunchOptions, RunError, Runnable, Runner};

use crate::codable::{self, Codable, CodableError};
use crate::pipeline::SegmentAddress;
use crate::transport::{DataPlane, DescriptorReceiver, Endpoint, TransportError};

/// Derives the data-plane tag for a port name.
#[must_use]
pub fn port_tag(port_name: &str) -> u64 {
    fxhash::hash64(port_name)
}

/// Where one output address routes to.
enum OutputRoute<T> {
    /// In-process edge into a local segment input.
    Local(Arc<dyn WritableEdge<T>>),
    /// Remote segment input reached through the data plane.
    Remote { endpoint: Endpoint },
}

/// Reconciliation and lifecycle surface shared by manifolds of any record
/// type. The pipeline manager drives manifolds through this trait.
pub trait ManifoldControl: Send + Sync {
    /// The port this manifold joins.
    fn port_name(&self) -> String;

    /// The data-plane tag descriptors for this port travel under.
    fn tag(&self) -> u64;

    /// Reconciles the output set: `(address, is_local)` pairs. Local
    /// addresses resolve against registered local outputs; obsolete local
    /// registrations are released. The swap is atomic.
    ///
    /// # Errors
    ///
    /// Returns [`ManifoldError::MissingLocalOutput`] if a requested local
    /// address has no registered edge.
    fn update_outputs(&self, requested: &[(SegmentAddress, bool)]) -> Result<(), ManifoldError>;

    /// Records the requested input set. Input edges themselves are opened
    /// by segment construction and closed by segment teardown.
    fn update_inputs(&self, requested: &[SegmentAddress]);

    /// Begins shutdown: closes the aggregated input once the remaining
    /// segment writers release, and interrupts the network ingress.
    fn stop(&self);

    /// Forces termination of both ingress loops.
    fn kill(&self);

    /// Joins the ingress loops.
    ///
    /// # Errors
    ///
    /// The first fatal [`RunError`] either loop reported.
    fn join(&self) -> Result<(), RunError>;
}

/// The typed N-to-M junction for one named port.
pub struct Manifold<T: Codable> {
    port_name: String,
    tag: u64,
    data_plane: Arc<dyn DataPlane>,
    channel: Arc<Channel<T>>,
    /// Holds the aggregated channel open across segment churn; dropped on
    /// stop.
    input_anchor: Mutex<Option<ChannelWriter<T>>>,
    inputs: Mutex<FxHashSet<SegmentAddress>>,
    local_outputs: RwLock<FxHashMap<SegmentAddress, Arc<dyn WritableEdge<T>>>>,
    table: RwLock<Vec<(SegmentAddress, OutputRoute<T>)>>,
    cursor: AtomicUsize,
    net_cursor: AtomicUsize,
    local_forwards: AtomicU64,
    remote_forwards: AtomicU64,
    remote_receives: AtomicU64,
    active_loops: AtomicUsize,
    local_runner: Mutex<Option<Runner>>,
    network_runner: Mutex<Option<Runner>>,
}

impl<T: Codable> Manifold<T> {
    /// Creates a manifold for `port_name`.
    #[must_use]
    pub fn new(port_name: impl Into<String>, data_plane: Arc<dyn DataPlane>) -> Arc<Self> {
        let port_name = port_name.into();
        let tag = port_tag(&port_name);
        let channel = Arc::new(Channel::with_config(ChannelConfig::default()));
        Arc::new(Self {
            tag,
            data_plane,
            input_anchor: Mutex::new(Some(ChannelWriter::new(Arc::clone(&channel)))),
            channel,
            inputs: Mutex::new(FxHashSet::default()),
            local_outputs: RwLock::new(FxHashMap::default()),
            table: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            net_cursor: AtomicUsize::new(0),
            local_forwards: AtomicU64::new(0),
            remote_forwards: AtomicU64::new(0),
            remote_receives: AtomicU64::new(0),
            active_loops: AtomicUsize::new(0),
            local_runner: Mutex::new(None),
            network_runner: Mutex::new(None),
            port_name,
        })
    }

    /// Hands out a writable edge into the aggregated input, registering
    /// `address` as an actual input. The edge belongs to the producing
    /// segment; dropping it is that segment's completion.
    #[must_use]
    pub fn input_edge(self: &Arc<Self>, address: SegmentAddress) -> Arc<dyn WritableEdge<T>> {
        self.inputs.lock().insert(address);
        Arc::new(ChannelWriter::new(Arc::clone(&self.channel)))
    }

    /// Registers the local input edge of a consumer segment instance.
    /// `update_outputs` resolves local addresses against these.
    pub fn register_local_output(&self, address: SegmentAddress, edge: Arc<dyn WritableEdge<T>>) {
        self.local_outputs.write().insert(address, edge);
    }

    /// Starts the local and network ingress loops.
    ///
    /// # Errors
    ///
    /// Returns the subscription or launch failure.
    pub fn start(self: &Arc<Self>, factory: &EngineFactory) -> Result<(), ManifoldError> {
        let receiver = self.data_plane.subscribe(self.tag)?;

        self.active_loops.store(2, Ordering::Release);
        let local = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(LocalIngress(Arc::clone(self))))?;
        let network = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(NetworkIngress {
                manifold: Arc::clone(self),
                receiver,
            }))?;

        *self.local_runner.lock() = Some(local);
        *self.network_runner.lock() = Some(network);
        tracing::debug!(port = %self.port_name, tag = self.tag, "manifold started");
        Ok(())
    }

    /// The currently registered actual inputs.
    #[must_use]
    pub fn inputs(&self) -> Vec<SegmentAddress> {
        let mut inputs: Vec<_> = self.inputs.lock().iter().copied().collect();
        inputs.sort_unstable();
        inputs
    }

    /// The addresses in the active routing table.
    #[must_use]
    pub fn outputs(&self) -> Vec<SegmentAddress> {
        self.table.read().iter().map(|(addr, _)| *addr).collect()
    }

    /// Items forwarded to local outputs.
    #[must_use]
    pub fn local_forwards(&self) -> u64 {
        self.local_forwards.load(Ordering::Relaxed)
    }

    /// Items encoded and handed to the data plane.
    #[must_use]
    pub fn remote_forwards(&self) -> u64 {
        self.remote_forwards.load(Ordering::Relaxed)
    }

    /// Descriptors received from the data plane.
    #[must_use]
    pub fn remote_receives(&self) -> u64 {
        self.remote_receives.load(Ordering::Relaxed)
    }

    /// Forwards one locally produced item per the routing policy.
    fn forward(&self, item: T) -> Result<(), ChannelError> {
        let table = self.table.read();
        if table.is_empty() {
            return Err(ChannelError::Fault(format!(
                "manifold '{}' has no outputs",
                self.port_name
            )));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % table.len();
        match &table[index].1 {
            OutputRoute::Local(edge) => {
                edge.await_write(item)?;
                self.local_forwards.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            OutputRoute::Remote { endpoint } => {
                let descriptor = codable::encode(&item).map_err(fault_status)?;
                self.data_plane
                    .send(self.tag, endpoint, descriptor)
                    .map_err(fault_status)?;
                self.remote_forwards.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Forwards one item that arrived over the network to a local output.
    fn forward_local(&self, item: T) -> Result<(), ChannelError> {
        let table = self.table.read();
        let locals: Vec<&Arc<dyn WritableEdge<T>>> = table
            .iter()
            .filter_map(|(_, route)| match route {
                OutputRoute::Local(edge) => Some(edge),
                OutputRoute::Remote { .. } => None,
            })
            .collect();
        if locals.is_empty() {
            return Err(ChannelError::Fault(format!(
                "manifold '{}' received remote data but has no local outputs",
                self.port_name
            )));
        }
        let index = self.net_cursor.fetch_add(1, Ordering::Relaxed) % locals.len();
        locals[index].await_write(item)?;
        self.local_forwards.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Releases the routing table and registered local outputs. Invoked by
    /// the last ingress loop to complete, propagating closure downstream.
    fn release_outputs(&self) {
        self.table.write().clear();
        self.local_outputs.write().clear();
    }

    fn loop_completed(&self) {
        if self.active_loops.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.release_outputs();
        }
    }
}

fn fault_status(error: impl std::fmt::Display) -> ChannelError {
    ChannelError::Fault(error.to_string())
}

impl<T: Codable> ManifoldControl for Manifold<T> {
    fn port_name(&self) -> String {
        self.port_name.clone()
    }

    fn tag(&self) -> u64 {
        self.tag
    }

    fn update_outputs(&self, requested: &[(SegmentAddress, bool)]) -> Result<(), ManifoldError> {
        // Build the replacement table aside; the active table keeps
        // routing until the swap below.
        let mut sorted: Vec<(SegmentAddress, bool)> = requested.to_vec();
        sorted.sort_unstable_by_key(|(addr, _)| *addr);

        let mut next = Vec::with_capacity(sorted.len());
        {
            let locals = self.local_outputs.read();
            for (address, is_local) in &sorted {
                let route = if *is_local {
                    let edge = locals
                        .get(address)
                        .ok_or(ManifoldError::MissingLocalOutput(*address))?;
                    OutputRoute::Local(Arc::clone(edge))
                } else {
                    OutputRoute::Remote {
                        endpoint: Endpoint::for_executor(u64::from(address.executor_id())),
                    }
                };
                next.push((*address, route));
            }
        }

        *self.table.write() = next;

        // Drop local registrations that are no longer requested; their
        // edges release and the segment inputs observe closure.
        let keep: FxHashSet<SegmentAddress> = sorted
            .iter()
            .filter(|(_, is_local)| *is_local)
            .map(|(addr, _)| *addr)
            .collect();
        self.local_outputs
            .write()
            .retain(|address, _| keep.contains(address));

        tracing::debug!(
            port = %self.port_name,
            outputs = sorted.len(),
            "manifold outputs reconciled"
        );
        Ok(())
    }

    fn update_inputs(&self, requested: &[SegmentAddress]) {
        *self.inputs.lock() = requested.iter().copied().collect();
    }

    fn stop(&self) {
        self.input_anchor.lock().take();
        if let Some(runner) = self.local_runner.lock().as_ref() {
            runner.stop();
        }
        // The network ingress has no upstream closure to drain toward;
        // interrupt it.
        if let Some(runner) = self.network_runner.lock().as_ref() {
            runner.kill();
        }
    }

    fn kill(&self) {
        self.input_anchor.lock().take();
        if let Some(runner) = self.local_runner.lock().as_ref() {
            runner.kill();
        }
        if let Some(runner) = self.network_runner.lock().as_ref() {
            runner.kill();
        }
    }

    fn join(&self) -> Result<(), RunError> {
        let local = self.local_runner.lock().take();
        let network = self.network_runner.lock().take();
        let mut result = Ok(());
        if let Some(runner) = local {
            result = runner.await_join();
        }
        if let Some(runner) = network {
            let network_result = runner.await_join();
            if result.is_ok() {
                result = network_result;
            }
        }
        result
    }
}

impl<T: Codable> std::fmt::Debug for Manifold<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manifold")
            .field("port_name", &self.port_name)
            .field("tag", &self.tag)
            .field("inputs", &self.inputs.lock().len())
            .field("outputs", &self.table.read().len())
            .finish_non_exhaustive()
    }
}

/// Pulls the aggregated local input and forwards per policy.
struct LocalIngress<T: Codable>(Arc<Manifold<T>>);

impl<T: Codable> Runnable for LocalIngress<T> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        loop {
            if ctx.stop_requested() {
                return Ok(());
            }
            let item = match self.0.channel.await_read_timeout(Context::STOP_POLL) {
                Ok(item) => item,
                Err(ChannelError::Timeout) => continue,
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::UpstreamRead(status)),
            };
            match self.0.forward(item) {
                Ok(()) => {}
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::DownstreamWrite(status)),
            }
        }
    }

    fn on_complete(&self) {
        self.0.loop_completed();
    }
}

/// Decodes descriptors arriving for the manifold's tag and forwards them
/// to local outputs.
struct NetworkIngress<T: Codable> {
    manifold: Arc<Manifold<T>>,
    receiver: DescriptorReceiver,
}

impl<T: Codable> Runnable for NetworkIngress<T> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        loop {
            if ctx.stop_requested() {
                return Ok(());
            }
            let descriptor = match self.receiver.await_read_timeout(Context::STOP_POLL) {
                Ok(descriptor) => descriptor,
                Err(ChannelError::Timeout) => continue,
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::UpstreamRead(status)),
            };
            let item: T = codable::decode(&descriptor)
                .map_err(|e| RunError::UpstreamRead(fault_status(e)))?;
            self.manifold
                .remote_receives
                .fetch_add(1, Ordering::Relaxed);
            match self.manifold.forward_local(item) {
                Ok(()) => {}
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::DownstreamWrite(status)),
            }
        }
    }

    fn on_complete(&self) {
        self.manifold.loop_completed();
    }
}

/// Manifold reconciliation failures.
#[derive(Debug, thiserror::Error)]
pub enum ManifoldError {
    /// A requested local output has no registered edge.
    #[error("no local output registered for {0}")]
    MissingLocalOutput(SegmentAddress),

    /// The port is already bound to a manifold of a different record type.
    #[error("port '{port}' is bound to a manifold of a different record type")]
    PortTypeMismatch {
        /// The conflicting port.
        port: String,
    },

    /// Encoding a payload for remote transfer failed.
    #[error(transparent)]
    Codable(#[from] CodableError),

    /// The data plane rejected a transfer.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An ingress loop failed to launch.
    #[error(transparent)]
    Engine(#[from] strand_core::runnable::EngineError),
}
