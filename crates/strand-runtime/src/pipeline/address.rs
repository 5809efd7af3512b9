//! Segment addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The placement address of one segment instance, packed into a single
/// integer so comparisons and hashing stay cheap.
///
/// Layout, high to low: `executor_id` (16 bits), `pipeline_instance_id`
/// (16 bits), `segment_rank` (32 bits).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentAddress(u64);

impl SegmentAddress {
    /// Packs the address triple.
    #[must_use]
    pub fn new(executor_id: u16, pipeline_instance_id: u16, segment_rank: u32) -> Self {
        Self(
            (u64::from(executor_id) << 48)
                | (u64::from(pipeline_instance_id) << 32)
                | u64::from(segment_rank),
        )
    }

    /// Reconstructs an address from its packed form.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The packed form.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// The executor this instance is placed on.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Shifted into range by construction
    pub fn executor_id(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// The owning pipeline instance.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Shifted into range by construction
    pub fn pipeline_instance_id(self) -> u16 {
        (self.0 >> 32) as u16
    }

    /// The segment's rank within the pipeline.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Masked into range by construction
    pub fn segment_rank(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for SegmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "E{}/P{}/S{}",
            self.executor_id(),
            self.pipeline_instance_id(),
            self.segment_rank()
        )
    }
}

impl fmt::Debug for SegmentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentAddress({self})")
    }
}
