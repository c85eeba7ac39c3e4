//! Metric helpers for `framecast`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

/// Name of the counter tracking datagrams sent or accepted.
pub const DATAGRAMS_TOTAL: &str = "framecast_datagrams_total";
/// Name of the counter tracking frames sent or reassembled.
pub const FRAMES_TOTAL: &str = "framecast_frames_total";
/// Name of the counter tracking rejected datagrams and chunks.
pub const DROPS_TOTAL: &str = "framecast_drops_total";
/// Name of the counter tracking chunks refused by a frame builder.
pub const CONFLICTS_TOTAL: &str = "framecast_reassembly_conflicts_total";
/// Name of the counter tracking incomplete frames discarded by the reassembler.
pub const EVICTIONS_TOTAL: &str = "framecast_evictions_total";
/// Name of the gauge tracking frames held by the reassembler.
pub const FRAMES_IN_FLIGHT: &str = "framecast_frames_in_flight";

/// Direction of datagram or frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Received from the network.
    Inbound,
    /// Sent to the network.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "labels only feed metrics"))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Why the reassembler discarded an incomplete frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionCause {
    /// The frame outlived the reassembly timeout.
    Expired,
    /// The in-flight table was full.
    Capacity,
}

impl EvictionCause {
    /// Label value used for this cause.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EvictionCause::Expired => "expired",
            EvictionCause::Capacity => "capacity",
        }
    }
}

#[cfg(feature = "metrics")]
mod record {
    use metrics::{counter, gauge};

    use super::{
        CONFLICTS_TOTAL,
        DATAGRAMS_TOTAL,
        DROPS_TOTAL,
        Direction,
        EVICTIONS_TOTAL,
        EvictionCause,
        FRAMES_IN_FLIGHT,
        FRAMES_TOTAL,
    };

    /// Record a datagram for the given direction.
    pub fn inc_datagrams(direction: Direction) {
        counter!(DATAGRAMS_TOTAL, "direction" => direction.as_str()).increment(1);
    }

    /// Record a frame for the given direction.
    pub fn inc_frames(direction: Direction) {
        counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    }

    /// Record a dropped datagram or chunk.
    pub fn inc_drops(reason: &'static str) { counter!(DROPS_TOTAL, "reason" => reason).increment(1); }

    /// Record a chunk refused by a frame builder.
    pub fn inc_conflicts(reason: &'static str) {
        counter!(CONFLICTS_TOTAL, "reason" => reason).increment(1);
    }

    /// Record discarded incomplete frames.
    pub fn add_evictions(cause: EvictionCause, count: usize) {
        counter!(EVICTIONS_TOTAL, "cause" => cause.as_str())
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Publish the number of frames held by the reassembler.
    #[expect(
        clippy::cast_precision_loss,
        reason = "gauge values are f64; in-flight counts stay far below 2^52"
    )]
    pub fn set_in_flight(count: usize) { gauge!(FRAMES_IN_FLIGHT).set(count as f64); }
}

#[cfg(not(feature = "metrics"))]
mod record {
    use super::{Direction, EvictionCause};

    pub fn inc_datagrams(_: Direction) {}
    pub fn inc_frames(_: Direction) {}
    pub fn inc_drops(_: &'static str) {}
    pub fn inc_conflicts(_: &'static str) {}
    pub fn add_evictions(_: EvictionCause, _: usize) {}
    pub fn set_in_flight(_: usize) {}
}

pub use record::{add_evictions, inc_conflicts, inc_datagrams, inc_drops, inc_frames, set_in_flight};
