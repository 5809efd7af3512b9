//! Channel configuration and statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// Minimum channel capacity (a zero-capacity channel could never accept a
/// write).
pub const MIN_CAPACITY: usize = 1;

/// Configuration for a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum number of buffered values.
    pub capacity: usize,

    /// Whether to track statistics (small overhead).
    pub track_stats: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            track_stats: false,
        }
    }
}

impl ChannelConfig {
    /// Creates a configuration with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(MIN_CAPACITY),
            ..Default::default()
        }
    }

    /// Enables statistics tracking.
    #[must_use]
    pub fn track_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }
}

/// Point-in-time snapshot of channel statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Total values written.
    pub written: u64,

    /// Total values read.
    pub read: u64,

    /// Times a write suspended on a full channel.
    pub write_blocked: u64,

    /// Times a read found the channel empty.
    pub read_empty: u64,
}

impl ChannelStats {
    /// Returns the number of values currently buffered according to the
    /// counters.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.written.saturating_sub(self.read)
    }
}

/// Internal statistics counters.
#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    written: AtomicU64,
    read: AtomicU64,
    write_blocked: AtomicU64,
    read_empty: AtomicU64,
}

impl StatsInner {
    #[inline]
    pub(crate) fn track_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn track_read(&self) {
        self.read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn track_write_blocked(&self) {
        self.write_blocked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn track_read_empty(&self) {
        self.read_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            written: self.written.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
            write_blocked: self.write_blocked.load(Ordering::Relaxed),
            read_empty: self.read_empty.load(Ordering::Relaxed),
        }
    }
}
