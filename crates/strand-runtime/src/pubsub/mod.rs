//! # Publisher/Subscriber link-up
//!
//! A [`Publisher`] is a writable edge endpoint: every write is encoded
//! into a descriptor and handed to the data plane, targeted at one of the
//! currently known tagged subscriber instances (round-robin). A
//! [`Subscriber`] is the matching source endpoint: a progress runnable
//! decodes descriptors arriving for its tag and pushes them downstream.
//!
//! Both sides are [`SubscriptionService`]s: the control plane delivers a
//! `tag -> instance` map on every update; the map is swapped atomically
//! and registered connections-changed handlers run after the swap.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};

use strand_core::channel::ChannelError;
use strand_core::edge::{EdgeError, ReadableEdge, WritableAcceptor, WritableEdge, WritableSlot};
use strand_core::runnable::{
    Context, EngineError, EngineFactory, LaunchOptions, RunError, Runnable, Runner,
};

use crate::codable::{self, Codable, CodableError};
use crate::transport::{DataPlane, DescriptorReceiver, Endpoint, TransportError};

/// The control-plane's view of a subscription: tag to hosting instance id.
pub type TaggedInstances = FxHashMap<u64, u64>;

/// Callback invoked after the tagged-instance map is swapped.
pub type ConnectionsChangedHandler = Box<dyn Fn(&TaggedInstances) + Send + Sync>;

/// Shared surface of publisher and subscriber link-ups.
pub trait SubscriptionService: Send + Sync {
    /// The service this endpoint belongs to.
    fn service_name(&self) -> &str;

    /// The tag the control plane assigned to this endpoint.
    fn tag(&self) -> u64;

    /// Atomically replaces the tagged-instance map, then invokes the
    /// registered handlers with the new map.
    fn update_tagged_instances(&self, tagged: TaggedInstances);

    /// Registers a handler invoked after every map swap.
    fn register_connections_changed_handler(&self, handler: ConnectionsChangedHandler);
}

struct TaggedState {
    instances: TaggedInstances,
    /// Tags in sorted order, for deterministic round-robin.
    order: Vec<u64>,
}

impl TaggedState {
    fn new(instances: TaggedInstances) -> Self {
        let mut order: Vec<u64> = instances.keys().copied().collect();
        order.sort_unstable();
        Self { instances, order }
    }
}

/// The publishing end of a subscription service.
///
/// Writes serialize into descriptors and leave through the data plane; the
/// target instance rotates round-robin over the known tagged instances.
pub struct Publisher<T: Codable> {
    service_name: String,
    tag: u64,
    data_plane: Arc<dyn DataPlane>,
    tagged: RwLock<TaggedState>,
    cursor: AtomicUsize,
    handlers: Mutex<Vec<ConnectionsChangedHandler>>,
    published: AtomicU64,
    _record: std::marker::PhantomData<fn(T)>,
}

impl<T: Codable> Publisher<T> {
    /// Creates a publisher for `service_name` under `tag`.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        tag: u64,
        data_plane: Arc<dyn DataPlane>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service_name: service_name.into(),
            tag,
            data_plane,
            tagged: RwLock::new(TaggedState::new(TaggedInstances::default())),
            cursor: AtomicUsize::new(0),
            handlers: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
            _record: std::marker::PhantomData,
        })
    }

    /// Descriptors handed to the data plane.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl<T: Codable> WritableEdge<T> for Publisher<T> {
    fn await_write(&self, value: T) -> Result<(), ChannelError> {
        let descriptor =
            codable::encode(&value).map_err(|e| ChannelError::Fault(e.to_string()))?;

        let (target_tag, instance) = {
            let tagged = self.tagged.read();
            if tagged.order.is_empty() {
                return Err(ChannelError::Fault(format!(
                    "service '{}' has no tagged instances",
                    self.service_name
                )));
            }
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % tagged.order.len();
            let target_tag = tagged.order[index];
            (target_tag, tagged.instances[&target_tag])
        };

        self.data_plane
            .send(target_tag, &Endpoint::for_executor(instance), descriptor)
            .map_err(|e| ChannelError::Fault(e.to_string()))?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl<T: Codable> SubscriptionService for Publisher<T> {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn tag(&self) -> u64 {
        self.tag
    }

    fn update_tagged_instances(&self, tagged: TaggedInstances) {
        *self.tagged.write() = TaggedState::new(tagged);
        let state = self.tagged.read();
        for handler in self.handlers.lock().iter() {
            handler(&state.instances);
        }
    }

    fn register_connections_changed_handler(&self, handler: ConnectionsChangedHandler) {
        self.handlers.lock().push(handler);
    }
}

/// The subscribing end of a subscription service.
///
/// A progress runnable decodes descriptors arriving for the subscriber's
/// tag and pushes the records through the downstream edge.
pub struct Subscriber<T: Codable> {
    service_name: String,
    tag: u64,
    data_plane: Arc<dyn DataPlane>,
    output: WritableSlot<T>,
    tagged: RwLock<TaggedInstances>,
    handlers: Mutex<Vec<ConnectionsChangedHandler>>,
    received: AtomicU64,
    runner: Mutex<Option<Runner>>,
}

impl<T: Codable> Subscriber<T> {
    /// Creates a subscriber for `service_name` under `tag`.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        tag: u64,
        data_plane: Arc<dyn DataPlane>,
    ) -> Arc<Self> {
        Arc::new(Self {
            service_name: service_name.into(),
            tag,
            data_plane,
            output: WritableSlot::new("subscriber.output"),
            tagged: RwLock::new(TaggedInstances::default()),
            handlers: Mutex::new(Vec::new()),
            received: AtomicU64::new(0),
            runner: Mutex::new(None),
        })
    }

    /// Subscribes on the data plane and starts the progress runnable.
    ///
    /// # Errors
    ///
    /// Returns the subscription or launch failure.
    pub fn start(self: &Arc<Self>, factory: &EngineFactory) -> Result<(), PubSubError> {
        let receiver = self.data_plane.subscribe(self.tag)?;
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(SubscriberWorker {
                subscriber: Arc::clone(self),
                receiver,
            }))?;
        *self.runner.lock() = Some(runner);
        tracing::debug!(service = %self.service_name, tag = self.tag, "subscriber linked");
        Ok(())
    }

    /// Interrupts the progress runnable.
    pub fn stop(&self) {
        if let Some(runner) = self.runner.lock().as_ref() {
            runner.kill();
        }
    }

    /// Joins the progress runnable.
    ///
    /// # Errors
    ///
    /// The fatal error it reported, if any.
    pub fn join(&self) -> Result<(), RunError> {
        match self.runner.lock().take() {
            Some(runner) => runner.await_join(),
            None => Ok(()),
        }
    }

    /// Records pushed downstream.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl<T: Codable> WritableAcceptor<T> for Subscriber<T> {
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<T>>) -> Result<(), EdgeError> {
        self.output.bind(edge)
    }
}

impl<T: Codable> SubscriptionService for Subscriber<T> {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn tag(&self) -> u64 {
        self.tag
    }

    fn update_tagged_instances(&self, tagged: TaggedInstances) {
        *self.tagged.write() = tagged;
        let state = self.tagged.read();
        for handler in self.handlers.lock().iter() {
            handler(&state);
        }
    }

    fn register_connections_changed_handler(&self, handler: ConnectionsChangedHandler) {
        self.handlers.lock().push(handler);
    }
}

/// The subscriber's progress runnable.
struct SubscriberWorker<T: Codable> {
    subscriber: Arc<Subscriber<T>>,
    receiver: DescriptorReceiver,
}

impl<T: Codable> Runnable for SubscriberWorker<T> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        let downstream = self.subscriber.output.get()?;
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
            let record: T = codable::decode(&descriptor)
                .map_err(|e| RunError::UpstreamRead(ChannelError::Fault(e.to_string())))?;
            match downstream.await_write(record) {
                Ok(()) => {
                    self.subscriber.received.fetch_add(1, Ordering::Relaxed);
                }
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::DownstreamWrite(status)),
            }
        }
    }

    fn on_complete(&self) {
        self.subscriber.output.release();
    }
}

/// Pub/sub link-up failures.
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// The data plane rejected the subscription.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The progress runnable failed to launch.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A payload failed to encode or decode.
    #[error(transparent)]
    Codable(#[from] CodableError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackDataPlane, LoopbackFabric};
    use std::time::{Duration, Instant};
    use strand_core::node::LambdaSink;
    use strand_core::edge::WritableProvider;

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        check()
    }

    #[test]
    fn test_publisher_to_subscriber_roundtrip() {
        let fabric = LoopbackFabric::new();
        let plane_a: Arc<dyn DataPlane> =
            Arc::new(LoopbackDataPlane::attach(Arc::clone(&fabric), 1));
        let plane_b: Arc<dyn DataPlane> =
            Arc::new(LoopbackDataPlane::attach(Arc::clone(&fabric), 2));
        let factory = EngineFactory::new();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(LambdaSink::new(move |value: u64| seen.lock().push(value)))
        };

        // Subscriber on executor 2, tag 77, feeding the sink.
        let subscriber = Subscriber::<u64>::new("ticks", 77, plane_b);
        subscriber
            .accept_writable_edge(sink.writable_edge().unwrap())
            .unwrap();
        subscriber.start(&factory).unwrap();
        let sink_runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&sink) as Arc<dyn Runnable>)
            .unwrap();

        // Publisher on executor 1, told about the subscriber instance.
        let publisher = Publisher::<u64>::new("ticks", 1000, plane_a);
        let mut tagged = TaggedInstances::default();
        tagged.insert(77, 2);
        publisher.update_tagged_instances(tagged);

        for i in 0..5u64 {
            publisher.await_write(i).unwrap();
        }
        assert_eq!(publisher.published(), 5);

        assert!(wait_until(Duration::from_secs(5), || seen.lock().len() == 5));
        assert_eq!(subscriber.received(), 5);

        subscriber.stop();
        subscriber.join().unwrap();
        sink_runner.kill();
        sink_runner.await_join().unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_round_robin_over_instances() {
        let fabric = LoopbackFabric::new();
        let plane: Arc<dyn DataPlane> =
            Arc::new(LoopbackDataPlane::attach(Arc::clone(&fabric), 1));

        // Two raw subscriptions standing in for two subscriber instances.
        let plane_x: Arc<dyn DataPlane> =
            Arc::new(LoopbackDataPlane::attach(Arc::clone(&fabric), 10));
        let plane_y: Arc<dyn DataPlane> =
            Arc::new(LoopbackDataPlane::attach(Arc::clone(&fabric), 11));
        let x = plane_x.subscribe(1).unwrap();
        let y = plane_y.subscribe(2).unwrap();

        let publisher = Publisher::<u64>::new("spread", 1000, plane);
        let mut tagged = TaggedInstances::default();
        tagged.insert(1, 10);
        tagged.insert(2, 11);
        publisher.update_tagged_instances(tagged);

        for i in 0..4u64 {
            publisher.await_write(i).unwrap();
        }

        let mut x_count = 0;
        while x.await_read_timeout(Duration::from_millis(50)).is_ok() {
            x_count += 1;
        }
        let mut y_count = 0;
        while y.await_read_timeout(Duration::from_millis(50)).is_ok() {
            y_count += 1;
        }
        assert_eq!(x_count, 2);
        assert_eq!(y_count, 2);
    }

    #[test]
    fn test_write_without_instances_is_fault() {
        let fabric = LoopbackFabric::new();
        let plane: Arc<dyn DataPlane> = Arc::new(LoopbackDataPlane::attach(fabric, 1));
        let publisher = Publisher::<u64>::new("empty", 5, plane);

        let err = publisher.await_write(1).unwrap_err();
        assert!(err.is_fault());
    }

    #[test]
    fn test_handlers_run_after_swap() {
        let fabric = LoopbackFabric::new();
        let plane: Arc<dyn DataPlane> = Arc::new(LoopbackDataPlane::attach(fabric, 1));
        let publisher = Publisher::<u64>::new("svc", 5, plane);

        let observed = Arc::new(Mutex::new(Vec::new()));
        {
            let observed = Arc::clone(&observed);
            publisher.register_connections_changed_handler(Box::new(move |tagged| {
                let mut snapshot: Vec<u64> = tagged.keys().copied().collect();
                snapshot.sort_unstable();
                observed.lock().push(snapshot);
            }));
        }

        let mut tagged = TaggedInstances::default();
        tagged.insert(3, 30);
        tagged.insert(4, 40);
        publisher.update_tagged_instances(tagged);
        publisher.update_tagged_instances(TaggedInstances::default());

        assert_eq!(*observed.lock(), vec![vec![3, 4], vec![]]);
    }
}
