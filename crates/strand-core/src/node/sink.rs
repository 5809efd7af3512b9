//! Callback sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::channel::{Channel, ChannelConfig, ChannelError};
use crate::edge::{ChannelWriter, EdgeError, WritableEdge, WritableProvider};
use crate::runnable::{Context, RunError, Runnable};

type SinkFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A sink runnable: owns its inbound channel and applies a user callback
/// per item.
///
/// Completion closes the channel, so upstream writers observe `Closed`
/// instead of parking forever.
pub struct LambdaSink<T> {
    channel: Arc<Channel<T>>,
    handler: SinkFn<T>,
    received: AtomicU64,
}

impl<T: Send + 'static> LambdaSink<T> {
    /// Creates a sink from a per-item callback.
    pub fn new(handler: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self::with_config(handler, ChannelConfig::default())
    }

    /// Creates a sink with a custom inbound channel configuration.
    pub fn with_config(handler: impl Fn(T) + Send + Sync + 'static, config: ChannelConfig) -> Self {
        Self {
            channel: Arc::new(Channel::with_config(config)),
            handler: Arc::new(handler),
            received: AtomicU64::new(0),
        }
    }

    /// Total items the callback has been invoked with.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl<T: Send + 'static> WritableProvider<T> for LambdaSink<T> {
    fn writable_edge(&self) -> Result<Arc<dyn WritableEdge<T>>, EdgeError> {
        Ok(Arc::new(ChannelWriter::new(Arc::clone(&self.channel))))
    }
}

impl<T: Send + 'static> Runnable for LambdaSink<T> {
    fn run(&self, ctx: &Context) -> Result<(), RunError> {
        loop {
            if ctx.stop_requested() {
                return Ok(());
            }
            match self.channel.await_read_timeout(Context::STOP_POLL) {
                Ok(item) => {
                    self.received.fetch_add(1, Ordering::Relaxed);
                    (self.handler)(item);
                }
                Err(ChannelError::Timeout) => {}
                Err(ChannelError::Closed) => return Ok(()),
                Err(status) => return Err(RunError::UpstreamRead(status)),
            }
        }
    }

    fn on_complete(&self) {
        self.channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::{EngineFactory, LaunchOptions};
    use parking_lot::Mutex;

    #[test]
    fn test_receives_until_upstream_closes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Arc::new(LambdaSink::new(move |x: i32| seen.lock().push(x)))
        };
        let upstream = sink.writable_edge().unwrap();

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&sink) as Arc<dyn Runnable>)
            .unwrap();

        for i in 0..5 {
            upstream.await_write(i).unwrap();
        }
        drop(upstream);
        runner.await_join().unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.received(), 5);
    }

    #[test]
    fn test_completion_closes_channel_for_writers() {
        let sink = Arc::new(LambdaSink::new(|_: i32| {}));
        let upstream = sink.writable_edge().unwrap();

        let factory = EngineFactory::new();
        let runner = factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&sink) as Arc<dyn Runnable>)
            .unwrap();

        runner.kill();
        runner.await_join().unwrap();

        // The killed sink closed its channel; writers observe it.
        assert_eq!(upstream.await_write(1), Err(ChannelError::Closed));
    }
}
