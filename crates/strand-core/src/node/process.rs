//! One-in/N-out processing nodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::{Channel, ChannelConfig, ChannelError};
use crate::edge::{
    ChannelWriter, EdgeError, WritableAcceptor, WritableEdge, WritableProvider, WritableSlot,
};
use crate::runnable::{Context, RunError, Runnable};

type HandlerFn<I, O> =
    Arc<dyn Fn(I, &mut NodeOutput<'_, O>) -> Result<(), ChannelError> + Send + Sync>;

/// A processing node: owns its inbound channel, applies a user handler per
/// item, and pushes results through its downstream edge.
///
/// The handler may emit zero or more outputs per input. The read loop runs
/// once per engine; with more than one engine the handler executes
/// concurrently and item order across engines is unspecified.
pub struct ProcessingNode<I, O> {
    channel: Arc<Channel<I>>,
    output: WritableSlot<O>,
    handler: HandlerFn<I, O>,
    reads: AtomicU64,
    emits: AtomicU64,
}

impl<I: Send + 'static, O: Send + 'static> ProcessingNode<I, O> {
    /// Creates a node that emits `map(input)` for every input.
    pub fn new(map: impl Fn(I) -> O + Send + Sync + 'static) -> Self {
        Self::with_handler(move |input, out| out.emit(map(input)))
    }

    /// Creates a node with full control over emission.
    pub fn with_handler(
        handler: impl Fn(I, &mut NodeOutput<'_, O>) -> Result<(), ChannelError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_config(handler, ChannelConfig::default())
    }

    /// Creates a node with a custom inbound channel configuration.
    pub fn with_config(
        handler: impl Fn(I, &mut NodeOutput<'_, O>) -> Result<(), ChannelError> + Send + Sync + 'static,
        config: ChannelConfig,
    ) -> Self {
        Self {
            channel: Arc::new(Channel::with_config(config)),
            output: WritableSlot::new("node.output"),
            handler: Arc::new(handler),
            reads: AtomicU64::new(0),
            emits: AtomicU64::new(0),
        }
    }

    /// Items pulled from upstream plus items emitted downstream.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.reads.load(Ordering::Relaxed) + self.emits.load(Ordering::Relaxed)
    }
}

impl<I: Send + 'static, O> WritableProvider<I> for ProcessingNode<I, O> {
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<I>>, EdgeError> {
        Ok(Arc::new(ChannelWriter::new(Arc::clone(&self.channel))))
    }
}

impl<I, O> WritableAcceptor<O> for ProcessingNode<I, O> {
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<O>>) -> Result<(), EdgeError> {
        self.output.bind(edge)
    }
}

impl<I: Send + 'static, O: Send + 'static> Runnable for ProcessingNode<I, O> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        let downstream = self.output.get()?;
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
            self.reads.fetch_add(1, Ordering::Relaxed);

            let mut out = NodeOutput {
                edge: &downstream,
                emits: &self.emits,
            };
            match (self.handler)(item, &mut out) {
                Ok(()) => {}
                // Downstream gone: stop pulling, let upstream see closure.
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::DownstreamWrite(status)),
            }
        }
    }

    fn on_complete(&self) {
        self.output.release();
        self.channel.close();
    }
}

/// Emission handle passed to a node handler.
pub struct NodeOutput<'a, O> {
    edge: &'a Arc<dyn WritableEdge<O>>,
    emits: &'a AtomicU64,
}

impl<O> NodeOutput<'_, O> {
    /// Emits a value downstream, suspending on back-pressure.
    ///
    /// # Errors
    ///
    /// Returns the downstream channel status.
    pub fn emit(&mut self, value: O) -> Result<(), ChannelError> {
        self.edge.await_write(value)?;
        self.emits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::make_edge;
    use crate::runnable::{EngineFactory, LaunchOptions};

    #[test]
    fn test_maps_values() {
        let node = ProcessingNode::new(|x: f64| x * 2.0);
        let out = Arc::new(Channel::with_capacity(8));
        node.accept_writable_edge(Arc::new(ChannelWriter::new(Arc::clone(&out))))
            .unwrap();

        let upstream = node.writable_edge().unwrap();

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(node))
            .unwrap();

        upstream.await_write(1.5).unwrap();
        upstream.await_write(2.5).unwrap();
        drop(upstream);

        runner.await_join().unwrap();
        assert_eq!(out.await_read(), Ok(3.0));
        assert_eq!(out.await_read(), Ok(5.0));
        assert_eq!(out.await_read(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_handler_fanout_emission() {
        // One input produces two outputs.
        let node = ProcessingNode::with_handler(|x: i32, out| {
            out.emit(x)?;
            out.emit(-x)
        });
        let out = Arc::new(Channel::with_capacity(8));
        node.accept_writable_edge(Arc::new(ChannelWriter::new(Arc::clone(&out))))
            .unwrap();
        let upstream = node.writable_edge().unwrap();

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(node))
            .unwrap();

        upstream.await_write(3).unwrap();
        drop(upstream);
        runner.await_join().unwrap();

        assert_eq!(out.await_read(), Ok(3));
        assert_eq!(out.await_read(), Ok(-3));
    }

    #[test]
    fn test_processed_counts_reads_and_emits() {
        let node = Arc::new(ProcessingNode::new(|x: i32| x));
        let sink = crate::node::LambdaSink::new(|_: i32| {});
        make_edge(node.as_ref(), &sink).unwrap();

        let upstream = node.writable_edge().unwrap();
        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&node) as Arc<dyn Runnable>)
            .unwrap();

        for i in 0..3 {
            upstream.await_write(i).unwrap();
        }
        drop(upstream);
        runner.await_join().unwrap();

        assert_eq!(node.processed(), 6);
    }
}
