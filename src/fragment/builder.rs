//! Per-frame accumulator used by the reassembler.
//!
//! A [`FrameBuilder`] collects the chunks of one frame id. Each `put_*`
//! method checks the chunk in full before touching any state, so a refused
//! chunk leaves the builder exactly as it was.
//!
//! Slaves that arrive ahead of their master are held as separate payloads.
//! The contiguous frame buffer only grows once the master has fixed the
//! frame size, so a stray slave with a large offset costs no more memory
//! than its own payload.

use std::collections::HashSet;

use bytes::Bytes;

use super::{FrameStatus, ReassemblyConflict};
use crate::{
    chunk::{Chunk, ChunkMeta, MasterChunk, SlaveChunk},
    frame::{Frame, FrameId},
    protocol::{ProtocolConfig, SlaveOffsets},
};

#[derive(Clone, Copy, Debug)]
struct MasterInfo {
    number: u16,
    frame_size: usize,
}

/// Accumulates the chunks of a single frame.
#[derive(Debug)]
pub struct FrameBuilder {
    config: ProtocolConfig,
    meta: ChunkMeta,
    master: Option<MasterInfo>,
    expected: usize,
    collected: usize,
    data: Vec<u8>,
    /// Explicit-offset slaves received before the master.
    pending: Vec<(usize, Bytes)>,
    filled: usize,
    slaves: HashSet<u16>,
}

impl FrameBuilder {
    /// Create an empty builder for the frame described by `meta`.
    #[must_use]
    pub fn new(config: ProtocolConfig, meta: ChunkMeta) -> Self {
        Self {
            config,
            meta,
            master: None,
            expected: 0,
            collected: 0,
            data: Vec::new(),
            pending: Vec::new(),
            filled: 0,
            slaves: HashSet::new(),
        }
    }

    /// Identifier of the frame under construction.
    #[must_use]
    pub const fn frame_id(&self) -> FrameId { self.meta.frame_id }

    /// Whether the master chunk has been recorded.
    #[must_use]
    pub const fn has_master(&self) -> bool { self.master.is_some() }

    /// Chunks the frame consists of; zero until the master chunk arrives.
    #[must_use]
    pub const fn expected_chunks(&self) -> usize { self.expected }

    /// Chunks recorded so far.
    #[must_use]
    pub const fn collected_chunks(&self) -> usize { self.collected }

    /// Payload bytes currently held, whether placed or awaiting the master.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.data.len() + self.pending.iter().map(|(_, payload)| payload.len()).sum::<usize>()
    }

    /// Whether every chunk of the frame has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.master.is_some_and(|master| {
            self.collected == self.expected
                && self.filled == master.frame_size
                && self.data.len() == master.frame_size
        })
    }

    /// Record either chunk shape.
    ///
    /// # Errors
    ///
    /// See [`Self::put_master`] and [`Self::put_slave`].
    pub fn put(&mut self, chunk: &Chunk<'_>) -> Result<FrameStatus, ReassemblyConflict> {
        match chunk {
            Chunk::Master(master) => self.put_master(master),
            Chunk::Slave(slave) => self.put_slave(slave),
        }
    }

    /// Record the master chunk and learn the frame size.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyConflict`] for a second master, a payload larger
    /// than the declared frame, or a declared size that contradicts slave
    /// chunks already placed.
    pub fn put_master(&mut self, chunk: &MasterChunk<'_>) -> Result<FrameStatus, ReassemblyConflict> {
        let frame_id = self.frame_id();
        if self.master.is_some() {
            return Err(ReassemblyConflict::DuplicateMaster { frame_id });
        }
        let frame_size = usize::try_from(chunk.frame_size).unwrap_or(usize::MAX);
        if chunk.payload.len() > frame_size {
            return Err(ReassemblyConflict::BeyondFrame {
                frame_id,
                offset: 0,
                len: chunk.payload.len(),
                limit: frame_size,
            });
        }
        let expected = self.config.chunk_count(frame_size);
        let highest_slave = self.slaves.iter().max().map_or(0, |n| usize::from(*n));
        let held = self
            .pending
            .iter()
            .map(|(offset, payload)| offset + payload.len())
            .max()
            .unwrap_or(0);
        if held > frame_size || highest_slave >= expected {
            return Err(ReassemblyConflict::InconsistentSize {
                frame_id,
                declared: frame_size,
                held,
            });
        }

        self.meta = chunk.meta;
        self.master = Some(MasterInfo {
            number: chunk.number,
            frame_size,
        });
        self.expected = expected;
        self.record(chunk.payload.len());
        self.place(0, chunk.payload);
        for (offset, payload) in std::mem::take(&mut self.pending) {
            self.place(offset, &payload);
        }
        Ok(self.status())
    }

    /// Record a slave chunk.
    ///
    /// With explicit offsets the payload is written where the chunk says and
    /// slaves may arrive before the master. Without them the payload is
    /// appended, so the master must come first and slaves must follow in
    /// emission order.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyConflict`] when the chunk is a duplicate, out of
    /// order, misplaced, or would overflow the frame.
    pub fn put_slave(&mut self, chunk: &SlaveChunk<'_>) -> Result<FrameStatus, ReassemblyConflict> {
        let frame_id = self.frame_id();
        let slave_number = chunk.slave_number;
        if slave_number == 0 {
            return Err(ReassemblyConflict::SlaveNumberZero { frame_id });
        }
        if self.slaves.contains(&slave_number) {
            return Err(ReassemblyConflict::DuplicateSlave {
                frame_id,
                slave_number,
            });
        }
        if self.master.is_some() && usize::from(slave_number) >= self.expected {
            return Err(ReassemblyConflict::SlaveBeyondCount {
                frame_id,
                slave_number,
                expected: self.expected,
            });
        }

        let offset = match (self.config.slave_offsets(), chunk.offset) {
            (SlaveOffsets::Explicit, Some(0)) => {
                return Err(ReassemblyConflict::OffsetZero { frame_id });
            }
            (SlaveOffsets::Explicit, Some(offset)) => usize::try_from(offset).unwrap_or(usize::MAX),
            (SlaveOffsets::Implicit, None) => self.next_append_offset(slave_number)?,
            _ => return Err(ReassemblyConflict::OffsetMode { frame_id }),
        };

        let limit = self
            .master
            .map_or(self.config.max_frame_size(), |master| master.frame_size);
        let len = chunk.payload.len();
        if offset.checked_add(len).is_none_or(|end| end > limit) {
            return Err(ReassemblyConflict::BeyondFrame {
                frame_id,
                offset,
                len,
                limit,
            });
        }

        self.slaves.insert(slave_number);
        self.record(len);
        if self.master.is_some() {
            self.place(offset, chunk.payload);
        } else {
            self.pending.push((offset, Bytes::copy_from_slice(chunk.payload)));
        }
        Ok(self.status())
    }

    /// Append position for the next implicit slave.
    fn next_append_offset(&self, slave_number: u16) -> Result<usize, ReassemblyConflict> {
        let frame_id = self.frame_id();
        if self.master.is_none() {
            return Err(ReassemblyConflict::OrphanSlave { frame_id });
        }
        // Slave numbers are unique, so the next one is one past the count.
        let expected = u16::try_from(self.slaves.len() + 1).unwrap_or(u16::MAX);
        if slave_number != expected {
            return Err(ReassemblyConflict::OutOfOrder {
                frame_id,
                expected,
                found: slave_number,
            });
        }
        Ok(self.data.len())
    }

    fn record(&mut self, len: usize) {
        self.filled += len;
        self.collected += 1;
    }

    /// Copy `payload` into the frame buffer; only called once the master has
    /// bounded `offset + payload.len()` by the frame size.
    fn place(&mut self, offset: usize, payload: &[u8]) {
        let end = offset + payload.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(payload);
    }

    fn status(&self) -> FrameStatus {
        if self.is_complete() {
            FrameStatus::Complete
        } else {
            FrameStatus::Incomplete
        }
    }

    /// Consume the builder, returning the frame if it is complete.
    #[must_use]
    pub fn into_frame(self) -> Option<Frame> {
        if !self.is_complete() {
            return None;
        }
        let master = self.master?;
        Some(Frame {
            id: self.meta.frame_id,
            number: master.number,
            interpretation: self.meta.interpretation,
            time: self.meta.time,
            priority: self.meta.priority,
            task: self.meta.task.as_str().to_owned(),
            flow: self.meta.flow.as_str().to_owned(),
            data: Bytes::from(self.data),
        })
    }
}
