//! Error and status types emitted by the fragmentation layer.
//!
//! Fragmentation failures are programming errors surfaced to the caller.
//! Reassembly conflicts describe a single refused chunk; the frame it
//! targeted keeps its previous state.

use thiserror::Error;

use crate::{
    chunk::ChunkError,
    frame::{FrameId, ValidationError},
};

/// Result of feeding a chunk into a frame under reassembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame still expects more chunks.
    Incomplete,
    /// The chunk completed the frame.
    Complete,
}

/// Errors produced while fragmenting outbound frames.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FragmentationError {
    /// The frame failed validation and was not fragmented.
    #[error("invalid frame: {0}")]
    Invalid(#[from] ValidationError),
    /// A chunk could not be encoded.
    #[error("failed to encode chunk: {0}")]
    Chunk(#[from] ChunkError),
    /// The frame needs more slave chunks than the 16-bit counter can number.
    #[error("slave chunk counter overflow after {last}")]
    SlaveNumberOverflow { last: usize },
}

/// Reasons a chunk is refused by the frame it belongs to.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyConflict {
    /// A master chunk was already recorded for the frame.
    #[error("frame {frame_id}: duplicate master chunk")]
    DuplicateMaster { frame_id: FrameId },
    /// A slave chunk with this number was already recorded.
    #[error("frame {frame_id}: duplicate slave chunk {slave_number}")]
    DuplicateSlave { frame_id: FrameId, slave_number: u16 },
    /// Slave numbering starts at one.
    #[error("frame {frame_id}: slave chunk number 0 is invalid")]
    SlaveNumberZero { frame_id: FrameId },
    /// The slave number lies beyond the chunk count the frame size implies.
    #[error("frame {frame_id}: slave chunk {slave_number} exceeds the {expected} expected chunks")]
    SlaveBeyondCount {
        frame_id: FrameId,
        slave_number: u16,
        expected: usize,
    },
    /// A slave arrived out of emission order without an explicit offset.
    #[error("frame {frame_id}: expected slave chunk {expected}, found {found}")]
    OutOfOrder {
        frame_id: FrameId,
        expected: u16,
        found: u16,
    },
    /// A slave without an explicit offset arrived before its master.
    #[error("frame {frame_id}: slave chunk arrived before the master chunk")]
    OrphanSlave { frame_id: FrameId },
    /// Offset zero belongs to the master chunk.
    #[error("frame {frame_id}: slave chunk claims offset 0")]
    OffsetZero { frame_id: FrameId },
    /// The slave offset field does not match the configured protocol.
    #[error("frame {frame_id}: slave offset presence does not match the protocol")]
    OffsetMode { frame_id: FrameId },
    /// A payload would extend past the end of the frame.
    #[error("frame {frame_id}: {len} bytes at offset {offset} exceed the {limit}-byte frame")]
    BeyondFrame {
        frame_id: FrameId,
        offset: usize,
        len: usize,
        limit: usize,
    },
    /// A master chunk declares a size that contradicts data already held.
    #[error("frame {frame_id}: declared size {declared} contradicts {held} bytes already placed")]
    InconsistentSize {
        frame_id: FrameId,
        declared: usize,
        held: usize,
    },
}

impl ReassemblyConflict {
    /// Short label naming the conflict.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::DuplicateMaster { .. } => "duplicate_master",
            Self::DuplicateSlave { .. } => "duplicate_slave",
            Self::SlaveNumberZero { .. } => "slave_number_zero",
            Self::SlaveBeyondCount { .. } => "slave_beyond_count",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::OrphanSlave { .. } => "orphan_slave",
            Self::OffsetZero { .. } => "offset_zero",
            Self::OffsetMode { .. } => "offset_mode",
            Self::BeyondFrame { .. } => "beyond_frame",
            Self::InconsistentSize { .. } => "inconsistent_size",
        }
    }
}
