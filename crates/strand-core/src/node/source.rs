//! Generator-driven sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::ChannelError;
use crate::edge::{EdgeError, WritableAcceptor, WritableEdge, WritableSlot};
use crate::runnable::{Context, RunError, Runnable};

type GeneratorFn<T> =
    Arc<dyn Fn(&mut SourceContext<'_, T>) -> Result<(), RunError> + Send + Sync>;

/// A source runnable driven by a user generator.
///
/// The generator runs once per engine and emits values through
/// [`SourceContext::emit`]. Long-running generators observe
/// [`SourceContext::finish_requested`] between emissions so `Stop` can end
/// the stream cooperatively. When the last engine returns, the downstream
/// edge is released and the consumer observes closure.
pub struct LambdaSource<T> {
    output: WritableSlot<T>,
    generator: GeneratorFn<T>,
    emitted: AtomicU64,
}

impl<T: Send + 'static> LambdaSource<T> {
    /// Creates a source from a generator callback.
    pub fn new(
        generator: impl Fn(&mut SourceContext<'_, T>) -> Result<(), RunError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            output: WritableSlot::new("source.output"),
            generator: Arc::new(generator),
            emitted: AtomicU64::new(0),
        }
    }

    /// Total values emitted across all engines.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl<T> WritableAcceptor<T> for LambdaSource<T> {
    fn accept_writable_edge(&self, edge: Arc<dyn WritableEdge<T>>) -> Result<(), EdgeError> {
        self.output.bind(edge)
    }
}

impl<T: Send + 'static> Runnable for LambdaSource<T> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        let edge = self.output.get()?;
        let mut source_ctx = SourceContext {
            edge,
            ctx,
            emitted: &self.emitted,
        };
        (self.generator)(&mut source_ctx)
    }

    fn on_complete(&self) {
        self.output.release();
    }
}

/// Emission context handed to a source generator.
pub struct SourceContext<'a, T> {
    edge: Arc<dyn WritableEdge<T>>,
    ctx: &'a Context,
    emitted: &'a AtomicU64,
}

impl<T> SourceContext<'_, T> {
    /// Emits a value downstream, suspending on back-pressure.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the downstream is gone; generators should end
    /// the stream when they see it.
    pub fn emit(&mut self, value: T) -> Result<(), ChannelError> {
        self.edge.await_write(value)?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Process-unique id of the engine running this generator.
    #[must_use]
    pub fn engine_id(&self) -> u64 {
        self.ctx.engine_id()
    }

    /// Rank of this engine within the launch group.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.ctx.rank()
    }

    /// Total engines in the launch group.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ctx.size()
    }

    /// Returns true once termination (`Stop` or `Kill`) was requested.
    /// Long-running generators check this between emissions.
    #[must_use]
    pub fn finish_requested(&self) -> bool {
        self.ctx.finish_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::edge::ChannelWriter;
    use crate::runnable::{EngineFactory, LaunchOptions};

    fn wire_to_channel<T: Send + 'static>(source: &LambdaSource<T>, capacity: usize) -> Arc<Channel<T>> {
        let channel = Arc::new(Channel::with_capacity(capacity));
        source
            .accept_writable_edge(Arc::new(ChannelWriter::new(Arc::clone(&channel))))
            .unwrap();
        channel
    }

    #[test]
    fn test_emits_in_order_then_closes() {
        let source = LambdaSource::new(|ctx| {
            for x in [1.0, 2.0, 3.0] {
                if ctx.emit(x).is_err() {
                    break;
                }
            }
            Ok(())
        });
        let channel = wire_to_channel(&source, 8);

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(source))
            .unwrap();
        runner.await_join().unwrap();

        assert_eq!(channel.await_read(), Ok(1.0));
        assert_eq!(channel.await_read(), Ok(2.0));
        assert_eq!(channel.await_read(), Ok(3.0));
        assert_eq!(channel.await_read(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_unwired_source_fails_at_run() {
        let source = LambdaSource::<i32>::new(|_| Ok(()));
        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(source))
            .unwrap();
        let err = runner.await_join().unwrap_err();
        assert!(matches!(err, RunError::Wiring(_)));
    }

    #[test]
    fn test_concurrent_source_emits_engine_ids() {
        let source = LambdaSource::new(|ctx| {
            let id = ctx.engine_id();
            ctx.emit(id).ok();
            Ok(())
        });
        let channel = wire_to_channel(&source, 16);

        let factory = EngineFactory::new();
        let options = LaunchOptions::with_pe_count(2).engines_per_pe(2);
        let runner = factory.launcher(options).ignite(Arc::new(source)).unwrap();
        runner.await_join().unwrap();

        let mut ids = Vec::new();
        while let Ok(id) = channel.await_read() {
            ids.push(id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_stop_ends_long_running_generator() {
        let source = LambdaSource::new(|ctx| {
            let mut i = 0u64;
            while !ctx.finish_requested() {
                if ctx.emit(i).is_err() {
                    break;
                }
                i += 1;
            }
            Ok(())
        });
        let channel = wire_to_channel(&source, 4);

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::new(source))
            .unwrap();

        // Drain a few values, then request a cooperative stop.
        for _ in 0..8 {
            channel.await_read().unwrap();
        }
        runner.stop();
        // Keep draining so the generator is not parked on back-pressure.
        while channel.await_read().is_ok() {}
        runner.await_join().unwrap();
    }
}
