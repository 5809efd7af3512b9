//! Key-based demultiplexers.
//!
//! A router has one input and N named outputs. Every accepted item is
//! forwarded to exactly one downstream (chosen by the key function) or
//! fails with an item-level error; nothing is silently dropped. Ordering is
//! preserved per key only.
//!
//! Variants:
//!
//! - [`StaticRouterComponent`]: key set fixed at construction, driven by
//!   the upstream's push.
//! - [`DynamicRouterComponent`]: `get_source` grows the key set,
//!   `drop_source` removes a key, releasing its downstream edge after
//!   already-forwarded items have drained.
//! - [`RouterRunnable`]: owns an inbound channel and runs its own pull loop
//!   on an engine.
//! - [`TaggedRouter`]: routes `(key, value)` pairs; the key is stripped on
//!   the way out.

use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fxhash::FxHashSet;

use crate::channel::{Channel, ChannelConfig, ChannelError};
use crate::edge::{
    ChannelWriter, EdgeError, MultiWritableSlot, WritableAcceptor, WritableEdge, WritableProvider,
};
use crate::runnable::{Context, RunError, Runnable};

/// Item-level routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The computed key has no bound downstream.
    #[error("no downstream bound for key {0}")]
    UnboundKey(String),

    /// The key set is fixed and does not contain the requested key.
    #[error("router has no route for key {0}")]
    UnknownKey(String),

    /// The key or convert function panicked on this item.
    #[error("router handler panicked")]
    HandlerPanicked,

    /// The chosen downstream rejected the write.
    #[error("downstream write failed: {0}")]
    Downstream(ChannelError),
}

impl RouterError {
    /// Collapses the failure into the status observed on the ingress edge.
    #[must_use]
    pub fn into_status(self) -> ChannelError {
        match self {
            Self::Downstream(status) => status,
            other => ChannelError::Fault(other.to_string()),
        }
    }
}

type KeyFn<K, I> = Arc<dyn Fn(&I) -> K + Send + Sync>;
type ConvertFn<I, O> = Arc<dyn Fn(I) -> O + Send + Sync>;

/// The routing core shared by every router variant.
///
/// Owns the key function, the optional conversion, and the keyed
/// downstream bindings. Downstream maps are mutated only through the
/// owning component or a control-path call; the dispatch path takes read
/// access.
pub struct Router<K, I, O = I> {
    key_fn: KeyFn<K, I>,
    convert_fn: ConvertFn<I, O>,
    downstreams: MultiWritableSlot<K, O>,
    fixed_keys: Option<FxHashSet<K>>,
    routed: AtomicU64,
    failed: AtomicU64,
}

impl<K, I, O> Router<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn with_parts(
        fixed_keys: Option<Vec<K>>,
        key_fn: KeyFn<K, I>,
        convert_fn: ConvertFn<I, O>,
    ) -> Self {
        Self {
            key_fn,
            convert_fn,
            downstreams: MultiWritableSlot::new(),
            fixed_keys: fixed_keys.map(|keys| keys.into_iter().collect()),
            routed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Routes one item: compute its key, convert, and forward to the bound
    /// downstream.
    ///
    /// # Errors
    ///
    /// Item-level failures: an unbound key, a panicking handler, or the
    /// downstream's write status. The router stays usable after any of
    /// them.
    pub fn route(&self, value: I) -> Result<(), RouterError> {
        let key = match catch_unwind(AssertUnwindSafe(|| (self.key_fn)(&value))) {
            Ok(key) => key,
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(RouterError::HandlerPanicked);
            }
        };

        let Some(edge) = self.downstreams.get(&key) else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return Err(RouterError::UnboundKey(format!("{key:?}")));
        };

        let output = match catch_unwind(AssertUnwindSafe(move || (self.convert_fn)(value))) {
            Ok(output) => output,
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                return Err(RouterError::HandlerPanicked);
            }
        };

        match edge.await_write(output) {
            Ok(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(status) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(RouterError::Downstream(status))
            }
        }
    }

    fn source(self: &Arc<Self>, key: &K) -> Result<RouterSource<K, I, O>, RouterError> {
        if let Some(fixed) = &self.fixed_keys {
            if !fixed.contains(key) {
                return Err(RouterError::UnknownKey(format!("{key:?}")));
            }
        }
        Ok(RouterSource {
            router: Arc::clone(self),
            key: key.clone(),
        })
    }

    /// Returns true if `key` has a bound downstream.
    #[must_use]
    pub fn has_source(&self, key: &K) -> bool {
        self.downstreams.contains(key)
    }

    /// Releases every downstream binding.
    fn release_downstreams(&self) {
        self.downstreams.release_all();
    }

    /// Items successfully forwarded.
    #[must_use]
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    /// Items that failed at routing or on the downstream write.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// The source-side endpoint for one router key.
///
/// Obtained from `get_source(key)`; installing a downstream binds its
/// writable edge under the key. Re-binding a key replaces (and releases)
/// the prior binding.
pub struct RouterSource<K, I, O> {
    router: Arc<Router<K, I, O>>,
    key: K,
}

impl<K, I, O> WritableAcceptor<O> for RouterSource<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<O>>) -> Result<(), EdgeError> {
        self.router.downstreams.bind(self.key.clone(), edge);
        Ok(())
    }
}

/// The push-driven ingress edge of a component router.
///
/// Dropping the ingress (upstream completion) releases every downstream
/// binding.
struct RouterIngress<K, I, O> {
    router: Arc<Router<K, I, O>>,
}

impl<K, I, O> WritableEdge<I> for RouterIngress<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn await_write(&self, value: I) -> Result<(), ChannelError> {
        self.router.route(value).map_err(RouterError::into_status)
    }
}

impl<K, I, O> Drop for RouterIngress<K, I, O> {
    fn drop(&mut self) {
        self.router.downstreams.release_all();
    }
}

/// A router component with the key set fixed at construction.
///
/// Driven by the upstream's push: the upstream connects to this component
/// like to any consumer, and each written item is dispatched to the
/// downstream bound for its key.
pub struct StaticRouterComponent<K, I, O = I> {
    router: Arc<Router<K, I, O>>,
    claimed: AtomicBool,
}

/// Routes `(key, value)` pairs by their first component, forwarding the
/// value alone.
pub type TaggedRouter<K, T> = StaticRouterComponent<K, (K, T), T>;

impl<K, I> StaticRouterComponent<K, I>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
{
    /// Creates a static router over `route_keys` with a key function.
    pub fn new(
        route_keys: Vec<K>,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            router: Arc::new(Router::with_parts(
                Some(route_keys),
                Arc::new(key_fn),
                Arc::new(|value| value),
            )),
            claimed: AtomicBool::new(false),
        }
    }
}

impl<K, I, O> StaticRouterComponent<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a static router whose input and output types differ; every
    /// routed item passes through `convert_fn`.
    pub fn with_convert(
        route_keys: Vec<K>,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
        convert_fn: impl Fn(I) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            router: Arc::new(Router::with_parts(
                Some(route_keys),
                Arc::new(key_fn),
                Arc::new(convert_fn),
            )),
            claimed: AtomicBool::new(false),
        }
    }

    /// Returns the source endpoint for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownKey`] for a key outside the fixed set.
    pub fn get_source(&self, key: &K) -> Result<RouterSource<K, I, O>, RouterError> {
        self.router.source(key)
    }

    /// Returns true if `key` has a bound downstream.
    #[must_use]
    pub fn has_source(&self, key: &K) -> bool {
        self.router.has_source(key)
    }

    /// Items successfully forwarded.
    #[must_use]
    pub fn routed(&self) -> u64 {
        self.router.routed()
    }

    /// Items that failed at routing or on the downstream write.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.router.failed()
    }
}

impl<K, T> StaticRouterComponent<K, (K, T), T>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Creates a tagged router over `route_keys`: the key is the pair's
    /// first component and is dropped on forwarding.
    #[must_use]
    pub fn tagged(route_keys: Vec<K>) -> Self {
        Self::with_convert(route_keys, |pair: &(K, T)| pair.0.clone(), |pair| pair.1)
    }
}

impl<K, I, O> WritableProvider<I> for StaticRouterComponent<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<I>>, EdgeError> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(EdgeError::AlreadyClaimed("router.ingress".to_string()));
        }
        Ok(Arc::new(RouterIngress {
            router: Arc::clone(&self.router),
        }))
    }
}

/// A router component whose key set grows and shrinks at run time.
pub struct DynamicRouterComponent<K, I, O = I> {
    router: Arc<Router<K, I, O>>,
    claimed: AtomicBool,
}

impl<K, I> DynamicRouterComponent<K, I>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
{
    /// Creates a dynamic router with a key function.
    pub fn new(key_fn: impl Fn(&I) -> K + Send + Sync + 'static) -> Self {
        Self {
            router: Arc::new(Router::with_parts(None, Arc::new(key_fn), Arc::new(|v| v))),
            claimed: AtomicBool::new(false),
        }
    }
}

impl<K, I, O> DynamicRouterComponent<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a dynamic router whose input and output types differ.
    pub fn with_convert(
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
        convert_fn: impl Fn(I) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            router: Arc::new(Router::with_parts(
                None,
                Arc::new(key_fn),
                Arc::new(convert_fn),
            )),
            claimed: AtomicBool::new(false),
        }
    }

    /// Returns the source endpoint for `key`, growing the key set.
    #[must_use]
    pub fn get_source(&self, key: &K) -> RouterSource<K, I, O> {
        self.router
            .source(key)
            .expect("dynamic routers have no fixed key set")
    }

    /// Removes `key`, releasing its downstream edge. Items already
    /// forwarded stay buffered on the consumer side and drain; items
    /// arriving for the key afterwards fail with
    /// [`RouterError::UnboundKey`].
    ///
    /// Returns whether the key had a bound downstream.
    pub fn drop_source(&self, key: &K) -> bool {
        self.router.downstreams.release(key)
    }

    /// Returns true if `key` has a bound downstream.
    #[must_use]
    pub fn has_source(&self, key: &K) -> bool {
        self.router.has_source(key)
    }

    /// Items successfully forwarded.
    #[must_use]
    pub fn routed(&self) -> u64 {
        self.router.routed()
    }

    /// Items that failed at routing or on the downstream write.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.router.failed()
    }
}

impl<K, I, O> WritableProvider<I> for DynamicRouterComponent<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<I>>, EdgeError> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(EdgeError::AlreadyClaimed("router.ingress".to_string()));
        }
        Ok(Arc::new(RouterIngress {
            router: Arc::clone(&self.router),
        }))
    }
}

/// A static router that owns an inbound channel and pulls it on an engine.
pub struct RouterRunnable<K, I, O = I> {
    router: Arc<Router<K, I, O>>,
    channel: Arc<Channel<I>>,
}

impl<K, I> RouterRunnable<K, I>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
{
    /// Creates a runnable router over `route_keys` with a key function.
    pub fn new(
        route_keys: Vec<K>,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            router: Arc::new(Router::with_parts(
                Some(route_keys),
                Arc::new(key_fn),
                Arc::new(|value| value),
            )),
            channel: Arc::new(Channel::with_config(ChannelConfig::default())),
        }
    }
}

impl<K, I, O> RouterRunnable<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a runnable router whose input and output types differ.
    pub fn with_convert(
        route_keys: Vec<K>,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
        convert_fn: impl Fn(I) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            router: Arc::new(Router::with_parts(
                Some(route_keys),
                Arc::new(key_fn),
                Arc::new(convert_fn),
            )),
            channel: Arc::new(Channel::with_config(ChannelConfig::default())),
        }
    }

    /// Returns the source endpoint for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownKey`] for a key outside the fixed set.
    pub fn get_source(&self, key: &K) -> Result<RouterSource<K, I, O>, RouterError> {
        self.router.source(key)
    }

    /// Returns true if `key` has a bound downstream.
    #[must_use]
    pub fn has_source(&self, key: &K) -> bool {
        self.router.has_source(key)
    }

    /// Items successfully forwarded.
    #[must_use]
    pub fn routed(&self) -> u64 {
        self.router.routed()
    }

    /// Items that failed at routing or on the downstream write.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.router.failed()
    }
}

impl<K, T> RouterRunnable<K, (K, T), T>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Creates a runnable tagged router over `route_keys`.
    #[must_use]
    pub fn tagged(route_keys: Vec<K>) -> Self {
        Self::with_convert(route_keys, |pair: &(K, T)| pair.0.clone(), |pair| pair.1)
    }
}

impl<K, I, O> WritableProvider<I> for RouterRunnable<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<I>>, EdgeError> {
        Ok(Arc::new(ChannelWriter::new(Arc::clone(&self.channel))))
    }
}

impl<K, I, O> Runnable for RouterRunnable<K, I, O>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        loop {
            if ctx.stop_requested() {
                return Ok(());
            }
            let item = match self.channel.await_read_timeout(Context::STOP_POLL) {
                Ok(item) => item,
                Err(ChannelError::Timeout) => continue,
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::UpstreamRead(status)),
            };
            match self.router.route(item) {
                Ok(()) => {}
                Err(RouterError::Downstream(ChannelError::Closed)) => return Ok(()),
                Err(error) => return Err(RunError::DownstreamWrite(error.into_status())),
            }
        }
    }

    fn on_complete(&self) {
        self.router.release_downstreams();
        self.channel.close();
    }
}
