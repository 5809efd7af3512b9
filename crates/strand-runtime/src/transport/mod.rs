//! # Data-plane transport
//!
//! The data plane is a pluggable interface: `send(tag, endpoint,
//! descriptor)` on the producing side, a tagged descriptor subscription on
//! the consuming side. Transport internals (registration caches, wire
//! protocols) live behind the [`DataPlane`] trait.
//!
//! [`LoopbackFabric`] is the in-process implementation: multiple executors
//! attach to one fabric and exchange descriptors by `(executor, tag)`,
//! which is enough to exercise full multi-executor pipelines in a single
//! process.

use std::fmt;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use strand_core::channel::{Channel, ChannelConfig, ChannelError};
use strand_core::edge::ChannelReader;

use crate::codable::Descriptor;

/// An opaque peer address on the data plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// The executor hosting the peer.
    pub executor_id: u64,
    /// Transport-specific address string (informational for loopback).
    pub address: String,
}

impl Endpoint {
    /// Creates an endpoint for an executor with no transport address.
    #[must_use]
    pub fn for_executor(executor_id: u64) -> Self {
        Self {
            executor_id,
            address: String::new(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.is_empty() {
            write!(f, "executor-{}", self.executor_id)
        } else {
            write!(f, "executor-{}@{}", self.executor_id, self.address)
        }
    }
}

/// Receiving half of a tagged descriptor stream.
pub type DescriptorReceiver = ChannelReader<Descriptor>;

/// The pluggable data-plane client.
pub trait DataPlane: Send + Sync {
    /// Sends a descriptor to `endpoint`, demultiplexed by `tag` on the
    /// receiving side.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the endpoint has no subscriber for
    /// the tag or the transfer fails.
    fn send(&self, tag: u64, endpoint: &Endpoint, descriptor: Descriptor)
        -> Result<(), TransportError>;

    /// Subscribes to descriptors arriving locally for `tag`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the subscription cannot be
    /// installed.
    fn subscribe(&self, tag: u64) -> Result<DescriptorReceiver, TransportError>;

    /// The endpoint other peers use to reach this client.
    fn local_endpoint(&self) -> Endpoint;
}

/// Data-plane failures. Fatal for the runnable that hits them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No subscriber is registered for `(endpoint, tag)`.
    #[error("no route to {endpoint} for tag {tag}")]
    NoRoute {
        /// The destination endpoint.
        endpoint: Endpoint,
        /// The tag with no subscriber.
        tag: u64,
    },

    /// The receiving channel rejected the descriptor.
    #[error("transfer failed: {0}")]
    Transfer(#[from] ChannelError),
}

/// Shared in-process exchange attaching multiple executors.
#[derive(Default)]
pub struct LoopbackFabric {
    routes: RwLock<FxHashMap<(u64, u64), Arc<Channel<Descriptor>>>>,
}

impl LoopbackFabric {
    /// Creates an empty fabric.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn install(&self, executor_id: u64, tag: u64) -> Arc<Channel<Descriptor>> {
        let channel = Arc::new(Channel::with_config(ChannelConfig::with_capacity(256)));
        self.routes
            .write()
            .insert((executor_id, tag), Arc::clone(&channel));
        channel
    }

    fn route(&self, executor_id: u64, tag: u64) -> Option<Arc<Channel<Descriptor>>> {
        self.routes.read().get(&(executor_id, tag)).cloned()
    }
}

impl fmt::Debug for LoopbackFabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackFabric")
            .field("routes", &self.routes.read().len())
            .finish()
    }
}

/// A data-plane client attached to a [`LoopbackFabric`].
pub struct LoopbackDataPlane {
    fabric: Arc<LoopbackFabric>,
    local: Endpoint,
}

impl LoopbackDataPlane {
    /// Attaches a client for `executor_id` to the fabric.
    #[must_use]
    pub fn attach(fabric: Arc<LoopbackFabric>, executor_id: u64) -> Self {
        Self {
            fabric,
            local: Endpoint::for_executor(executor_id),
        }
    }
}

impl DataPlane for LoopbackDataPlane {
    fn send(
        &self,
        tag: u64,
        endpoint: &Endpoint,
        descriptor: Descriptor,
    ) -> Result<(), TransportError> {
        let Some(channel) = self.fabric.route(endpoint.executor_id, tag) else {
            return Err(TransportError::NoRoute {
                endpoint: endpoint.clone(),
                tag,
            });
        };
        tracing::trace!(
            tag,
            destination = %endpoint,
            bytes = descriptor.payload_len(),
            "loopback send"
        );
        channel.await_write(descriptor)?;
        Ok(())
    }

    fn subscribe(&self, tag: u64) -> Result<DescriptorReceiver, TransportError> {
        let channel = self.fabric.install(self.local.executor_id, tag);
        Ok(ChannelReader::new(channel))
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codable::encode;
    use strand_core::edge::ReadableEdge;

    #[test]
    fn test_send_to_subscriber() {
        let fabric = LoopbackFabric::new();
        let a = LoopbackDataPlane::attach(Arc::clone(&fabric), 1);
        let b = LoopbackDataPlane::attach(Arc::clone(&fabric), 2);

        let receiver = b.subscribe(42).unwrap();
        let descriptor = encode(&vec![1.0, 2.0]).unwrap();
        a.send(42, &b.local_endpoint(), descriptor.clone()).unwrap();

        assert_eq!(receiver.await_read(), Ok(descriptor));
    }

    #[test]
    fn test_no_route_is_error() {
        let fabric = LoopbackFabric::new();
        let a = LoopbackDataPlane::attach(fabric, 1);

        let err = a
            .send(9, &Endpoint::for_executor(3), encode(&1u8).unwrap())
            .unwrap_err();
        assert!(matches!(err, TransportError::NoRoute { tag: 9, .. }));
    }

    #[test]
    fn test_tags_are_demultiplexed() {
        let fabric = LoopbackFabric::new();
        let node = LoopbackDataPlane::attach(Arc::clone(&fabric), 5);

        let odd = node.subscribe(1).unwrap();
        let even = node.subscribe(2).unwrap();

        node.send(2, &node.local_endpoint(), encode(&"even".to_string()).unwrap())
            .unwrap();
        node.send(1, &node.local_endpoint(), encode(&"odd".to_string()).unwrap())
            .unwrap();

        let decoded: String = crate::codable::decode(&odd.await_read().unwrap()).unwrap();
        assert_eq!(decoded, "odd");
        let decoded: String = crate::codable::decode(&even.await_read().unwrap()).unwrap();
        assert_eq!(decoded, "even");
    }
}
