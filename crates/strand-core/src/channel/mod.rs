//! # Channel substrate
//!
//! Bounded FIFO channels connecting producers to consumers with
//! back-pressure and an explicit closed state.
//!
//! ## Semantics
//!
//! - `await_write` suspends while the channel is full and returns
//!   [`ChannelError::Closed`] if the channel closes before the value is
//!   accepted. No write succeeds after close.
//! - `await_read` suspends while the channel is empty and returns
//!   [`ChannelError::Closed`] only once the channel is closed **and**
//!   drained. Every value written before close is observable.
//! - `close` is idempotent and wakes all waiters.
//! - Capacity is enforced strictly; the queue never grows past it.
//!
//! ## Ordering
//!
//! For a single producer and single consumer, values are delivered in
//! write order. With multiple producers, ordering across producers is
//! unspecified.
//!
//! ## Module Structure
//!
//! - [`bounded`]: The channel implementation
//! - [`config`]: Capacity and statistics configuration
//! - [`error`]: Status values returned by channel operations

pub mod bounded;
pub mod config;
pub mod error;

pub use bounded::Channel;
pub use config::{ChannelConfig, ChannelStats, DEFAULT_CAPACITY};
pub use error::{ChannelError, TryWriteError};
