//! Inbound pipeline combining the datagram gate and the reassembler.
//!
//! [`FrameReceiver::ingest_at`] never fails: malformed datagrams, malformed
//! chunks and refused chunks are logged, counted and dropped. The returned
//! [`IngestReport`] tells the caller what happened to one datagram.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use log::debug;

use super::{FrameStatus, Reassembler, ReassemblyLimits};
use crate::{
    datagram::{DatagramGate, GateStatsSnapshot, ProtocolError},
    frame::{Frame, FrameId},
    metrics::{self, Direction},
    protocol::ProtocolConfig,
};

/// Outcome of ingesting one datagram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Why the gate rejected the datagram, if it did.
    pub rejected: Option<ProtocolError>,
    /// Chunks accepted by the reassembler.
    pub accepted_chunks: usize,
    /// Chunks that were malformed or refused.
    pub dropped_chunks: usize,
    /// Frames completed by this datagram.
    pub completed_frames: usize,
}

/// Gate and reassembler for one receive pipeline.
#[derive(Debug)]
pub struct FrameReceiver {
    gate: DatagramGate,
    reassembler: Reassembler,
}

impl FrameReceiver {
    /// Create a receiver for `config` bounded by `limits`.
    #[must_use]
    pub fn new(config: ProtocolConfig, limits: ReassemblyLimits) -> Self {
        Self {
            gate: DatagramGate::new(config),
            reassembler: Reassembler::new(config, limits),
        }
    }

    /// Ingest a datagram using the current time.
    pub fn ingest(&mut self, datagram: &[u8]) -> IngestReport {
        self.ingest_at(datagram, Instant::now())
    }

    /// Ingest a datagram using an explicit clock reading.
    pub fn ingest_at(&mut self, datagram: &[u8], now: Instant) -> IngestReport {
        let mut report = IngestReport::default();
        let accepted = match self.gate.accept(datagram) {
            Ok(accepted) => accepted,
            Err(err) => {
                debug!("dropping datagram: {err}");
                report.rejected = Some(err);
                return report;
            }
        };

        for chunk in accepted.chunks() {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    debug!("dropping malformed chunk: {err}");
                    metrics::inc_drops("chunk");
                    report.dropped_chunks += 1;
                    continue;
                }
            };
            match self.reassembler.push_chunk_at(&chunk, now) {
                Ok(FrameStatus::Complete) => {
                    report.accepted_chunks += 1;
                    report.completed_frames += 1;
                    metrics::inc_frames(Direction::Inbound);
                }
                Ok(FrameStatus::Incomplete) => report.accepted_chunks += 1,
                Err(conflict) => {
                    debug!("dropping chunk: {conflict}");
                    metrics::inc_conflicts(conflict.reason());
                    report.dropped_chunks += 1;
                }
            }
        }
        report
    }

    /// Whether the frame `frame_id` is complete and waiting to be drained.
    #[must_use]
    pub fn is_complete(&self, frame_id: FrameId) -> bool { self.reassembler.is_complete(frame_id) }

    /// Remove and return every completed frame, oldest first.
    pub fn drain_completed(&mut self) -> Vec<Frame> { self.reassembler.drain_completed() }

    /// Remove incomplete frames that outlived the timeout.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<FrameId> {
        self.reassembler.purge_expired_at(now)
    }

    /// Counters of gate outcomes.
    #[must_use]
    pub fn gate_stats(&self) -> GateStatsSnapshot { self.gate.stats().snapshot() }

    /// Borrow the reassembler.
    #[must_use]
    pub const fn reassembler(&self) -> &Reassembler { &self.reassembler }
}

/// [`FrameReceiver`] shared between a receive loop and a consumer.
///
/// Every operation takes the lock for its own duration only; a poisoned lock
/// is recovered, since the receiver holds no invariant a panic could break
/// halfway.
#[derive(Clone, Debug)]
pub struct SharedFrameReceiver(Arc<Mutex<FrameReceiver>>);

impl SharedFrameReceiver {
    /// Wrap `receiver` for shared use.
    #[must_use]
    pub fn new(receiver: FrameReceiver) -> Self { Self(Arc::new(Mutex::new(receiver))) }

    fn lock(&self) -> MutexGuard<'_, FrameReceiver> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Protocol the receiver decodes.
    #[must_use]
    pub fn config(&self) -> ProtocolConfig { *self.lock().reassembler().config() }

    /// See [`FrameReceiver::ingest`].
    pub fn ingest(&self, datagram: &[u8]) -> IngestReport { self.lock().ingest(datagram) }

    /// See [`FrameReceiver::ingest_at`].
    pub fn ingest_at(&self, datagram: &[u8], now: Instant) -> IngestReport {
        self.lock().ingest_at(datagram, now)
    }

    /// See [`FrameReceiver::is_complete`].
    #[must_use]
    pub fn is_complete(&self, frame_id: FrameId) -> bool { self.lock().is_complete(frame_id) }

    /// See [`FrameReceiver::drain_completed`].
    #[must_use]
    pub fn drain_completed(&self) -> Vec<Frame> { self.lock().drain_completed() }

    /// See [`FrameReceiver::purge_expired_at`].
    pub fn purge_expired_at(&self, now: Instant) -> Vec<FrameId> { self.lock().purge_expired_at(now) }

    /// See [`FrameReceiver::gate_stats`].
    #[must_use]
    pub fn gate_stats(&self) -> GateStatsSnapshot { self.lock().gate_stats() }

    /// Number of frames held by the reassembler.
    #[must_use]
    pub fn in_flight_len(&self) -> usize { self.lock().reassembler().in_flight_len() }
}
