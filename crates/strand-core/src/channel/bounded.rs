//! Bounded FIFO channel with blocking writes and reads.
//!
//! The channel is the designated suspension point of the execution core:
//! `await_write` parks while the queue is full, `await_read` parks while it
//! is empty, and `close()` wakes every waiter. Any number of writers and
//! readers may share one channel; FIFO order is only guaranteed for a single
//! writer/reader pair.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::config::{ChannelConfig, ChannelStats, StatsInner};
use super::error::{ChannelError, TryWriteError};

struct ChannelState<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// A bounded multi-producer multi-consumer FIFO channel.
///
/// Values written before [`close()`](Channel::close) remain readable until
/// the queue drains; afterwards every read reports
/// [`ChannelError::Closed`]. Writes never succeed on a closed channel.
pub struct Channel<T> {
    state: Mutex<ChannelState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    writers: AtomicUsize,
    stats: Option<StatsInner>,
}

impl<T> Channel<T> {
    /// Creates a channel with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Creates a channel with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(ChannelConfig::with_capacity(capacity))
    }

    /// Creates a channel from a configuration.
    #[must_use]
    pub fn with_config(config: ChannelConfig) -> Self {
        let capacity = config.capacity.max(super::config::MIN_CAPACITY);
        Self {
            state: Mutex::new(ChannelState {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            writers: AtomicUsize::new(0),
            stats: config.track_stats.then(StatsInner::default),
        }
    }

    /// Registers a writer handle. Paired with [`release_writer`](Self::release_writer).
    pub(crate) fn register_writer(&self) {
        self.writers.fetch_add(1, Ordering::AcqRel);
    }

    /// Releases a writer handle. The channel closes when the last registered
    /// writer is released (upstream completion).
    pub(crate) fn release_writer(&self) {
        if self.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.close();
        }
    }

    /// Writes a value, suspending while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel is closed before the
    /// value is accepted. The value is dropped in that case.
    pub fn await_write(&self, value: T) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(value);
                if let Some(stats) = &self.stats {
                    stats.track_written();
                }
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            if let Some(stats) = &self.stats {
                stats.track_write_blocked();
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Writes a value, suspending up to `timeout` while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the channel closes first, or
    /// [`ChannelError::Timeout`] if the deadline passes. The value is
    /// dropped in either case.
    pub fn await_write_timeout(&self, value: T, timeout: Duration) -> Result<(), ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(value);
                if let Some(stats) = &self.stats {
                    stats.track_written();
                }
                drop(state);
                self.not_empty.notify_one();
                return Ok(());
            }
            if let Some(stats) = &self.stats {
                stats.track_write_blocked();
            }
            if self.not_full.wait_until(&mut state, deadline).timed_out() {
                return Err(ChannelError::Timeout);
            }
        }
    }

    /// Reads the next value, suspending while the channel is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once the channel is closed and
    /// drained.
    pub fn await_read(&self) -> Result<T, ChannelError> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                if let Some(stats) = &self.stats {
                    stats.track_read();
                }
                drop(state);
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if let Some(stats) = &self.stats {
                stats.track_read_empty();
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Reads the next value, suspending up to `timeout` while the channel is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] once closed and drained, or
    /// [`ChannelError::Timeout`] if the deadline passes with the channel
    /// still empty.
    pub fn await_read_timeout(&self, timeout: Duration) -> Result<T, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                if let Some(stats) = &self.stats {
                    stats.track_read();
                }
                drop(state);
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(ChannelError::Closed);
            }
            if let Some(stats) = &self.stats {
                stats.track_read_empty();
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return Err(ChannelError::Timeout);
            }
        }
    }

    /// Writes a value without blocking.
    ///
    /// # Errors
    ///
    /// Returns a [`TryWriteError`] carrying the value if the channel is full
    /// or closed.
    pub fn try_write(&self, value: T) -> Result<(), TryWriteError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TryWriteError::closed(value));
        }
        if state.queue.len() >= self.capacity {
            return Err(TryWriteError::full(value));
        }
        state.queue.push_back(value);
        if let Some(stats) = &self.stats {
            stats.track_written();
        }
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Reads a value without blocking. Returns `None` when the channel is
    /// empty, closed or not.
    #[must_use]
    pub fn try_read(&self) -> Option<T> {
        let mut state = self.state.lock();
        let value = state.queue.pop_front();
        if value.is_some() {
            if let Some(stats) = &self.stats {
                stats.track_read();
            }
            drop(state);
            self.not_full.notify_one();
        } else if let Some(stats) = &self.stats {
            stats.track_read_empty();
        }
        value
    }

    /// Closes the channel. Idempotent; wakes all suspended writers and
    /// readers. Buffered values remain readable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Returns true if the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns the number of buffered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if no values are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a statistics snapshot, all-zero unless tracking was enabled.
    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats
            .as_ref()
            .map(StatsInner::snapshot)
            .unwrap_or_default()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_read() {
        let channel = Channel::with_capacity(8);
        channel.await_write(1).unwrap();
        channel.await_write(2).unwrap();
        assert_eq!(channel.await_read(), Ok(1));
        assert_eq!(channel.await_read(), Ok(2));
    }

    #[test]
    fn test_fifo_order() {
        let channel = Channel::with_capacity(128);
        for i in 0..100 {
            channel.await_write(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(channel.await_read(), Ok(i));
        }
    }

    #[test]
    fn test_capacity_enforced() {
        let channel = Channel::with_capacity(2);
        channel.try_write(1).unwrap();
        channel.try_write(2).unwrap();
        let err = channel.try_write(3).unwrap_err();
        assert!(err.is_full());
        assert_eq!(err.into_inner(), 3);
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let channel = Channel::with_capacity(8);
        channel.await_write(1).unwrap();
        channel.await_write(2).unwrap();
        channel.close();

        // Buffered values survive close.
        assert_eq!(channel.await_read(), Ok(1));
        assert_eq!(channel.await_read(), Ok(2));

        // Once drained, every read reports closed.
        assert_eq!(channel.await_read(), Err(ChannelError::Closed));
        assert_eq!(channel.await_read(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_no_write_after_close() {
        let channel = Channel::with_capacity(8);
        channel.close();
        assert_eq!(channel.await_write(1), Err(ChannelError::Closed));
        assert!(channel.try_write(2).unwrap_err().is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = Channel::<i32>::with_capacity(8);
        channel.close();
        channel.close();
        assert!(channel.is_closed());
    }

    #[test]
    fn test_read_timeout_on_empty() {
        let channel = Channel::<i32>::with_capacity(8);
        let result = channel.await_read_timeout(Duration::from_millis(10));
        assert_eq!(result, Err(ChannelError::Timeout));
    }

    #[test]
    fn test_write_timeout_on_full() {
        let channel = Channel::with_capacity(1);
        channel.await_write(1).unwrap();
        let result = channel.await_write_timeout(2, Duration::from_millis(10));
        assert_eq!(result, Err(ChannelError::Timeout));
    }

    #[test]
    fn test_write_unblocks_blocked_reader() {
        let channel = Arc::new(Channel::with_capacity(4));
        let reader = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.await_read())
        };
        thread::sleep(Duration::from_millis(20));
        channel.await_write(7).unwrap();
        assert_eq!(reader.join().unwrap(), Ok(7));
    }

    #[test]
    fn test_close_wakes_blocked_writer() {
        let channel = Arc::new(Channel::with_capacity(1));
        channel.await_write(1).unwrap();
        let writer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.await_write(2))
        };
        thread::sleep(Duration::from_millis(20));
        channel.close();
        assert_eq!(writer.join().unwrap(), Err(ChannelError::Closed));
    }

    #[test]
    fn test_spsc_concurrent_fifo() {
        const ITEMS: usize = 50_000;
        let channel = Arc::new(Channel::with_capacity(64));

        let producer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                for i in 0..ITEMS {
                    channel.await_write(i).unwrap();
                }
                channel.close();
            })
        };

        let consumer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut received = Vec::with_capacity(ITEMS);
                while let Ok(item) = channel.await_read() {
                    received.push(item);
                }
                received
            })
        };

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received.len(), ITEMS);
        for (i, &item) in received.iter().enumerate() {
            assert_eq!(item, i);
        }
    }

    #[test]
    fn test_mpsc_delivers_everything() {
        const PRODUCERS: usize = 4;
        const ITEMS_PER_PRODUCER: usize = 5_000;
        let channel = Arc::new(Channel::with_capacity(32));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..ITEMS_PER_PRODUCER {
                        channel.await_write(p * ITEMS_PER_PRODUCER + i).unwrap();
                    }
                })
            })
            .collect();

        let consumer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                let mut received = Vec::new();
                while let Ok(item) = channel.await_read() {
                    received.push(item);
                }
                received
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        channel.close();

        let mut received = consumer.join().unwrap();
        received.sort_unstable();
        assert_eq!(received.len(), PRODUCERS * ITEMS_PER_PRODUCER);
        for (i, &item) in received.iter().enumerate() {
            assert_eq!(item, i);
        }
    }

    #[test]
    fn test_stats_tracking() {
        let channel = Channel::with_config(ChannelConfig::with_capacity(8).track_stats(true));
        channel.await_write(1).unwrap();
        channel.await_write(2).unwrap();
        let _ = channel.await_read();
        let _ = channel.try_read();
        let _ = channel.try_read(); // empty

        let stats = channel.stats();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.read, 2);
        assert!(stats.read_empty >= 1);
        assert_eq!(stats.in_flight(), 0);
    }
}
