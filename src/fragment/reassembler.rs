//! Inbound helper that stitches chunks back into complete frames.
//!
//! [`Reassembler`] mirrors the outbound [`Fragmenter`](crate::fragment::Fragmenter)
//! by collecting chunks keyed by [`FrameId`]. Completed frames stay in the
//! table until [`Reassembler::drain_completed`] hands them over. Incomplete
//! frames are bounded by [`ReassemblyLimits`]: they expire after a timeout and
//! the least recently updated one is evicted when the table is full.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use log::{debug, warn};

use super::{FrameBuilder, FrameStatus, ReassemblyConflict};
use crate::{
    chunk::Chunk,
    frame::{Frame, FrameId},
    metrics::{self, EvictionCause},
    protocol::{ProtocolConfig, SlaveOffsets},
};

/// Default lifetime of an incomplete frame.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of incomplete frames held at once.
pub const DEFAULT_MAX_IN_FLIGHT: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(value) => value,
    None => NonZeroUsize::MIN,
};

/// Bounds applied to incomplete frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReassemblyLimits {
    timeout: Option<Duration>,
    max_in_flight: Option<NonZeroUsize>,
}

impl Default for ReassemblyLimits {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_REASSEMBLY_TIMEOUT),
            max_in_flight: Some(DEFAULT_MAX_IN_FLIGHT),
        }
    }
}

impl ReassemblyLimits {
    /// Keep incomplete frames forever, however many there are.
    ///
    /// Only the timeout and the table cap are lifted. Chunks are still
    /// checked by [`FrameBuilder`], so duplicates and out-of-order implicit
    /// slaves are refused as with any other limits.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            timeout: None,
            max_in_flight: None,
        }
    }

    /// Set or clear the incomplete-frame timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set or clear the cap on incomplete frames.
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: Option<NonZeroUsize>) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Lifetime of an incomplete frame, measured from its first chunk.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> { self.timeout }

    /// Cap on incomplete frames.
    #[must_use]
    pub const fn max_in_flight(&self) -> Option<NonZeroUsize> { self.max_in_flight }
}

#[derive(Debug)]
struct InFlight {
    builder: FrameBuilder,
    started_at: Instant,
    updated_at: Instant,
}

impl InFlight {
    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        !self.builder.is_complete() && now.saturating_duration_since(self.started_at) >= timeout
    }
}

/// Stateful frame re-assembler.
#[derive(Debug)]
pub struct Reassembler {
    config: ProtocolConfig,
    limits: ReassemblyLimits,
    frames: HashMap<FrameId, InFlight>,
}

impl Reassembler {
    /// Create a re-assembler for `config` bounded by `limits`.
    #[must_use]
    pub fn new(config: ProtocolConfig, limits: ReassemblyLimits) -> Self {
        Self {
            config,
            limits,
            frames: HashMap::new(),
        }
    }

    /// Protocol the re-assembler decodes.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig { &self.config }

    /// Bounds applied to incomplete frames.
    #[must_use]
    pub const fn limits(&self) -> &ReassemblyLimits { &self.limits }

    /// Process a chunk using the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyConflict`] when the frame refuses the chunk.
    pub fn push_chunk(&mut self, chunk: &Chunk<'_>) -> Result<FrameStatus, ReassemblyConflict> {
        self.push_chunk_at(chunk, Instant::now())
    }

    /// Process a chunk using an explicit clock reading.
    ///
    /// Expired frames are purged first. A chunk for an unknown frame opens a
    /// new entry, evicting the least recently updated incomplete frame when
    /// the table is full. A refused first chunk leaves no entry behind.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyConflict`] when the frame refuses the chunk.
    pub fn push_chunk_at(
        &mut self,
        chunk: &Chunk<'_>,
        now: Instant,
    ) -> Result<FrameStatus, ReassemblyConflict> {
        self.purge_expired_at(now);

        let frame_id = chunk.frame_id();
        if let Some(entry) = self.frames.get_mut(&frame_id) {
            let status = entry.builder.put(chunk)?;
            entry.updated_at = now;
            return Ok(status);
        }

        if matches!(chunk, Chunk::Slave(_)) && self.config.slave_offsets() == SlaveOffsets::Implicit {
            return Err(ReassemblyConflict::OrphanSlave { frame_id });
        }

        let mut builder = FrameBuilder::new(self.config, *chunk.meta());
        let status = builder.put(chunk)?;
        if status == FrameStatus::Incomplete {
            self.make_room();
        }
        self.frames.insert(
            frame_id,
            InFlight {
                builder,
                started_at: now,
                updated_at: now,
            },
        );
        metrics::set_in_flight(self.frames.len());
        Ok(status)
    }

    /// Whether the frame `frame_id` is complete and waiting to be drained.
    #[must_use]
    pub fn is_complete(&self, frame_id: FrameId) -> bool {
        self.frames
            .get(&frame_id)
            .is_some_and(|entry| entry.builder.is_complete())
    }

    /// Remove and return every completed frame, oldest first.
    pub fn drain_completed(&mut self) -> Vec<Frame> {
        let ready: Vec<FrameId> = self
            .frames
            .iter()
            .filter(|(_, entry)| entry.builder.is_complete())
            .map(|(id, _)| *id)
            .collect();
        let mut drained: Vec<(Instant, Frame)> = ready
            .into_iter()
            .filter_map(|id| self.frames.remove(&id))
            .filter_map(|entry| {
                let started_at = entry.started_at;
                entry.builder.into_frame().map(|frame| (started_at, frame))
            })
            .collect();
        drained.sort_by_key(|(started_at, _)| *started_at);
        if !drained.is_empty() {
            metrics::set_in_flight(self.frames.len());
        }
        drained.into_iter().map(|(_, frame)| frame).collect()
    }

    /// Remove incomplete frames that outlived the timeout.
    ///
    /// Returns the identifiers of frames that were evicted.
    pub fn purge_expired(&mut self) -> Vec<FrameId> { self.purge_expired_at(Instant::now()) }

    /// Remove incomplete frames that outlived the timeout using an explicit
    /// clock reading.
    ///
    /// Returns the identifiers of frames that were evicted.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<FrameId> {
        let Some(timeout) = self.limits.timeout else {
            return Vec::new();
        };
        let mut evicted = Vec::new();
        self.frames.retain(|frame_id, entry| {
            let expired = entry.is_expired(now, timeout);
            if expired {
                evicted.push(*frame_id);
            }
            !expired
        });
        if !evicted.is_empty() {
            debug!("expired {} incomplete frames: {evicted:?}", evicted.len());
            metrics::add_evictions(EvictionCause::Expired, evicted.len());
            metrics::set_in_flight(self.frames.len());
        }
        evicted
    }

    /// Evict the least recently updated incomplete frame if the cap is reached.
    fn make_room(&mut self) {
        let Some(cap) = self.limits.max_in_flight else {
            return;
        };
        if self.incomplete_len() < cap.get() {
            return;
        }
        let victim = self
            .frames
            .iter()
            .filter(|(_, entry)| !entry.builder.is_complete())
            .min_by_key(|(_, entry)| entry.updated_at)
            .map(|(id, _)| *id);
        let Some((frame_id, entry)) =
            victim.and_then(|id| self.frames.remove(&id).map(|entry| (id, entry)))
        else {
            return;
        };
        warn!(
            "evicted incomplete frame {frame_id} ({}/{} chunks) to stay within {cap} in-flight frames",
            entry.builder.collected_chunks(),
            entry.builder.expected_chunks(),
        );
        metrics::add_evictions(EvictionCause::Capacity, 1);
    }

    /// Number of frames held, complete or not.
    #[must_use]
    pub fn in_flight_len(&self) -> usize { self.frames.len() }

    /// Number of incomplete frames held.
    #[must_use]
    pub fn incomplete_len(&self) -> usize {
        self.frames
            .values()
            .filter(|entry| !entry.builder.is_complete())
            .count()
    }

    /// Drop every frame, complete or not.
    pub fn clear(&mut self) {
        self.frames.clear();
        metrics::set_in_flight(0);
    }
}
