//! Edge traits, channel-backed handles, and binding slots.

use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};

use crate::channel::{Channel, ChannelError};

use super::error::EdgeError;

/// The writable half of an edge. Writers forward to the downstream channel,
/// possibly through a type adapter.
pub trait WritableEdge<T>: Send + Sync {
    /// Writes a value through the edge, suspending on back-pressure.
    ///
    /// # Errors
    ///
    /// Returns the downstream channel status: `Closed` once the consumer is
    /// gone, or `Fault` for an item-level dispatch failure.
    fn await_write(&self, value: T) -> Result<(), ChannelError>;
}

/// The readable half of an edge.
pub trait ReadableEdge<T>: Send + Sync {
    /// Reads the next value, suspending while the channel is empty.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the channel is closed and drained.
    fn await_read(&self) -> Result<T, ChannelError>;

    /// Reads the next value with a deadline.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once closed and drained, `Timeout` on deadline.
    fn await_read_timeout(&self, timeout: Duration) -> Result<T, ChannelError>;
}

/// A writer handle onto a channel.
///
/// Handles are counted on the channel itself: creating or cloning a writer
/// registers it, and dropping the last one closes the channel so the
/// consumer observes upstream completion. Handles created independently for
/// the same channel share one count.
pub struct ChannelWriter<T> {
    channel: Arc<Channel<T>>,
}

impl<T> ChannelWriter<T> {
    /// Creates a writer for a channel, registering it.
    #[must_use]
    pub fn new(channel: Arc<Channel<T>>) -> Self {
        channel.register_writer();
        Self { channel }
    }

    /// Returns true if the underlying channel is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl<T: Send> WritableEdge<T> for ChannelWriter<T> {
    fn await_write(&self, value: T) -> Result<(), ChannelError> {
        self.channel.await_write(value)
    }
}

impl<T> Clone for ChannelWriter<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.channel))
    }
}

impl<T> Drop for ChannelWriter<T> {
    fn drop(&mut self) {
        self.channel.release_writer();
    }
}

/// A reader handle onto a channel.
pub struct ChannelReader<T> {
    channel: Arc<Channel<T>>,
}

impl<T> ChannelReader<T> {
    /// Creates a reader for a channel.
    #[must_use]
    pub fn new(channel: Arc<Channel<T>>) -> Self {
        Self { channel }
    }
}

impl<T: Send> ReadableEdge<T> for ChannelReader<T> {
    fn await_read(&self) -> Result<T, ChannelError> {
        self.channel.await_read()
    }

    fn await_read_timeout(&self, timeout: Duration) -> Result<T, ChannelError> {
        self.channel.await_read_timeout(timeout)
    }
}

/// An endpoint that accepts a writable edge (the producer side of a
/// connection).
pub trait WritableAcceptor<T> {
    /// Installs the edge this endpoint writes through.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::AlreadyBound`] if an edge is already installed.
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<T>>) -> Result<(), EdgeError>;
}

/// An endpoint that owns a channel and provides writable edges onto it (the
/// consumer side of a connection).
pub trait WritableProvider<T> {
    /// Hands out the writable edge for this endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::AlreadyClaimed`] if the endpoint enforces a
    /// single upstream and the edge was already handed out.
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<T>>, EdgeError>;
}

/// Single-binding slot for a writable edge.
///
/// Backs the producer side of sources and nodes: exactly one downstream
/// edge may be installed, and release drops the writer so the downstream
/// observes completion.
pub struct WritableSlot<T> {
    name: String,
    edge: Mutex<Option<Arc<dyn WritableEdge<T>>>>,
}

impl<T> WritableSlot<T> {
    /// Creates an empty slot, named for diagnostics.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edge: Mutex::new(None),
        }
    }

    /// Installs an edge.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::AlreadyBound`] if the slot is occupied.
    pub fn bind(&self, edge: Arc<dyn WritableEdge<T>>) -> Result<(), EdgeError> {
        let mut slot = self.edge.lock();
        if slot.is_some() {
            return Err(EdgeError::AlreadyBound(self.name.clone()));
        }
        *slot = Some(edge);
        Ok(())
    }

    /// Returns the bound edge.
    ///
    /// # Errors
    ///
    /// Returns [`EdgeError::NotConnected`] if nothing is bound.
    pub fn get(&self) -> Result<Arc<dyn WritableEdge<T>>, EdgeError> {
        self.edge
            .lock()
            .clone()
            .ok_or_else(|| EdgeError::NotConnected(self.name.clone()))
    }

    /// Returns true if an edge is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.edge.lock().is_some()
    }

    /// Releases the bound edge, if any.
    pub fn release(&self) {
        self.edge.lock().take();
    }
}

/// Keyed multi-acceptor slot: N distinct writable edges identified by key.
///
/// Binding an already-bound key replaces the prior binding, releasing its
/// edge.
pub struct MultiWritableSlot<K, T> {
    edges: RwLock<FxHashMap<K, Arc<dyn WritableEdge<T>>>>,
}

impl<K, T> MultiWritableSlot<K, T> {
    /// Creates an empty multi-acceptor slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            edges: RwLock::new(FxHashMap::default()),
        }
    }

    /// Releases every bound edge.
    pub fn release_all(&self) {
        self.edges.write().clear();
    }

    /// Returns the number of bound edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    /// Returns true if no edges are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }
}

impl<K, T> MultiWritableSlot<K, T>
where
    K: std::hash::Hash + Eq + Clone,
{
    /// Installs (or replaces) the edge for `key`.
    pub fn bind(&self, key: K, edge: Arc<dyn WritableEdge<T>>) {
        self.edges.write().insert(key, edge);
    }

    /// Returns the edge bound for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<dyn WritableEdge<T>>> {
        self.edges.read().get(key).cloned()
    }

    /// Returns true if `key` has a bound edge.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.edges.read().contains_key(key)
    }

    /// Releases the edge for `key`, returning whether one was bound.
    pub fn release(&self, key: &K) -> bool {
        self.edges.write().remove(key).is_some()
    }

    /// Returns the currently bound keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.edges.read().keys().cloned().collect()
    }
}

impl<K, T> Default for MultiWritableSlot<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
