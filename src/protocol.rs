//! Wire constants and the chunk arithmetic shared by both ends.
//!
//! Two near-identical protocol variants exist in the field: the reference
//! protocol, where slave chunks carry no offset and must be appended in
//! arrival order, and the extended protocol, where every slave chunk carries
//! its byte offset into the frame. [`ProtocolConfig`] describes either one.
//! The fragmenter and the reassembler both derive their chunk layout from the
//! same configuration, so the number of chunks a sender emits and the number
//! a receiver waits for can never disagree.

use thiserror::Error;

use crate::{byte_order::Endianness, chunk::ChunkKind};

/// Magic value in the first two bytes of every datagram.
pub const PROTOCOL_VERSION: u16 = 0x0100;

/// Size of the datagram header preceding the chunks.
pub const DATAGRAM_HEADER_LEN: usize = 10;

/// Offset of the checksum field inside the datagram header.
pub const CHECKSUM_OFFSET: usize = 8;

/// Byte positions skipped when computing a datagram checksum.
pub const CHECKSUM_OFFSETS: [usize; 2] = [CHECKSUM_OFFSET, CHECKSUM_OFFSET + 1];

/// Width of the task and flow label fields.
pub const LABEL_WIDTH: usize = 6;

/// Default datagram ceiling, headers included.
pub const DEFAULT_MTU: usize = 1500;

/// Default chunk ceiling, chunk header included.
pub const DEFAULT_CHUNK_CEILING: usize = 512;

/// Highest slave number representable by the 16-bit counter.
pub const MAX_SLAVE_CHUNKS: usize = u16::MAX as usize;

/// Bytes shared by both chunk headers: kind, length, task, flow, frame id,
/// interpretation, priority and time.
const COMMON_HEADER_LEN: usize = 1 + 2 + LABEL_WIDTH + LABEL_WIDTH + 4 + 1 + 1 + 2;

/// Master chunk header: common fields, frame number and total frame size.
pub const MASTER_HEADER_LEN: usize = COMMON_HEADER_LEN + 2 + 4;

/// Slave chunk header without the offset field.
pub const SLAVE_HEADER_LEN: usize = COMMON_HEADER_LEN + 2;

/// Slave chunk header carrying a 32-bit frame offset.
pub const SLAVE_HEADER_WITH_OFFSET_LEN: usize = SLAVE_HEADER_LEN + 4;

/// How slave chunks locate their payload inside the frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SlaveOffsets {
    /// Reference protocol: no offset on the wire, payloads are appended in
    /// the order the slave chunks arrive.
    #[default]
    Implicit,
    /// Extended protocol: each slave chunk carries its byte offset, so chunks
    /// may arrive in any order.
    Explicit,
}

/// Position and payload capacity of one chunk in a frame's layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSlot {
    /// Zero-based index of the datagram carrying the chunk.
    pub datagram: usize,
    /// Master for the first slot, slave afterwards.
    pub kind: ChunkKind,
    /// Maximum payload bytes the chunk may carry.
    pub capacity: usize,
}

impl ChunkSlot {
    const fn slave(datagram: usize, capacity: usize) -> Self {
        Self {
            datagram,
            kind: ChunkKind::Slave,
            capacity,
        }
    }
}

/// Errors raised when protocol constants are inconsistent.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The datagram ceiling does not fit the 16-bit length field.
    #[error("mtu {mtu} exceeds the 16-bit datagram length field")]
    MtuTooLarge { mtu: usize },
    /// The chunk ceiling leaves no room for payload after the largest header.
    #[error("chunk ceiling {ceiling} must exceed the {header}-byte chunk header")]
    ChunkCeilingTooSmall { ceiling: usize, header: usize },
    /// A full chunk would not fit into a datagram.
    #[error("chunk ceiling {ceiling} exceeds the {available} bytes available per datagram")]
    ChunkCeilingTooLarge { ceiling: usize, available: usize },
    /// Frames must be allowed to carry at least one byte.
    #[error("maximum frame size must be non-zero")]
    MaxFrameSizeZero,
    /// The requested ceiling would overflow the slave numbering or the
    /// 32-bit frame size field.
    #[error("maximum frame size {requested} exceeds the protocol limit of {limit}")]
    MaxFrameSizeTooLarge { requested: usize, limit: usize },
}

/// Versioned description of the datagram protocol.
///
/// Every instance is internally consistent: constructors and `with_*`
/// methods reject combinations that would make the chunk arithmetic
/// meaningless.
///
/// # Examples
///
/// ```
/// use framecast::protocol::ProtocolConfig;
///
/// let config = ProtocolConfig::reference();
/// assert_eq!(config.master_capacity(), 483);
/// assert_eq!(config.slave_capacity(), 487);
/// assert_eq!(config.chunk_count(484), 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    version: u16,
    mtu: usize,
    chunk_ceiling: usize,
    endianness: Endianness,
    slave_offsets: SlaveOffsets,
    max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self { Self::reference() }
}

impl ProtocolConfig {
    /// The reference protocol: big-endian, implicit slave offsets, 1500-byte
    /// datagrams and 512-byte chunks.
    #[must_use]
    pub fn reference() -> Self { Self::with_offsets(SlaveOffsets::Implicit) }

    /// The extended protocol carrying explicit slave offsets.
    #[must_use]
    pub fn extended() -> Self { Self::with_offsets(SlaveOffsets::Explicit) }

    fn with_offsets(slave_offsets: SlaveOffsets) -> Self {
        let mut config = Self {
            version: PROTOCOL_VERSION,
            mtu: DEFAULT_MTU,
            chunk_ceiling: DEFAULT_CHUNK_CEILING,
            endianness: Endianness::Big,
            slave_offsets,
            max_frame_size: 0,
        };
        config.max_frame_size = config.frame_size_limit();
        config
    }

    /// Select the byte order of integer fields.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Override the protocol version magic.
    #[must_use]
    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// Change the datagram and chunk ceilings.
    ///
    /// The maximum frame size is lowered if the new geometry can no longer
    /// number enough slave chunks to carry it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the ceilings cannot hold a chunk header
    /// plus payload, or when `mtu` exceeds the 16-bit length field.
    pub fn with_ceilings(self, mtu: usize, chunk_ceiling: usize) -> Result<Self, ConfigError> {
        let mut next = Self {
            mtu,
            chunk_ceiling,
            ..self
        };
        next.check_geometry()?;
        next.max_frame_size = next.max_frame_size.min(next.frame_size_limit());
        Ok(next)
    }

    /// Set the largest frame payload accepted for fragmentation and
    /// reassembly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MaxFrameSizeZero`] for zero and
    /// [`ConfigError::MaxFrameSizeTooLarge`] above [`Self::frame_size_limit`].
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Result<Self, ConfigError> {
        if max_frame_size == 0 {
            return Err(ConfigError::MaxFrameSizeZero);
        }
        let limit = self.frame_size_limit();
        if max_frame_size > limit {
            return Err(ConfigError::MaxFrameSizeTooLarge {
                requested: max_frame_size,
                limit,
            });
        }
        self.max_frame_size = max_frame_size;
        Ok(self)
    }

    /// Check that the constants describe a usable protocol.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_geometry()?;
        if self.max_frame_size == 0 {
            return Err(ConfigError::MaxFrameSizeZero);
        }
        let limit = self.frame_size_limit();
        if self.max_frame_size > limit {
            return Err(ConfigError::MaxFrameSizeTooLarge {
                requested: self.max_frame_size,
                limit,
            });
        }
        Ok(())
    }

    fn check_geometry(&self) -> Result<(), ConfigError> {
        if self.mtu > usize::from(u16::MAX) {
            return Err(ConfigError::MtuTooLarge { mtu: self.mtu });
        }
        let header = MASTER_HEADER_LEN.max(self.slave_header_len());
        if self.chunk_ceiling <= header {
            return Err(ConfigError::ChunkCeilingTooSmall {
                ceiling: self.chunk_ceiling,
                header,
            });
        }
        let available = self.mtu.saturating_sub(DATAGRAM_HEADER_LEN);
        if self.chunk_ceiling > available {
            return Err(ConfigError::ChunkCeilingTooLarge {
                ceiling: self.chunk_ceiling,
                available,
            });
        }
        Ok(())
    }

    /// Protocol version magic.
    #[must_use]
    pub const fn version(&self) -> u16 { self.version }

    /// Datagram ceiling, headers included.
    #[must_use]
    pub const fn mtu(&self) -> usize { self.mtu }

    /// Chunk ceiling, chunk header included.
    #[must_use]
    pub const fn chunk_ceiling(&self) -> usize { self.chunk_ceiling }

    /// Byte order of integer fields.
    #[must_use]
    pub const fn endianness(&self) -> Endianness { self.endianness }

    /// Slave offset mode.
    #[must_use]
    pub const fn slave_offsets(&self) -> SlaveOffsets { self.slave_offsets }

    /// Largest frame payload accepted by this configuration.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize { self.max_frame_size }

    /// Master chunk header length.
    #[must_use]
    pub const fn master_header_len(&self) -> usize { MASTER_HEADER_LEN }

    /// Slave chunk header length for the configured offset mode.
    #[must_use]
    pub const fn slave_header_len(&self) -> usize {
        match self.slave_offsets {
            SlaveOffsets::Implicit => SLAVE_HEADER_LEN,
            SlaveOffsets::Explicit => SLAVE_HEADER_WITH_OFFSET_LEN,
        }
    }

    /// Payload bytes carried by a full master chunk.
    #[must_use]
    pub const fn master_capacity(&self) -> usize { self.chunk_ceiling - MASTER_HEADER_LEN }

    /// Payload bytes carried by a full slave chunk.
    #[must_use]
    pub const fn slave_capacity(&self) -> usize { self.chunk_ceiling - self.slave_header_len() }

    /// Largest frame whose slave chunks can be numbered without wrapping the
    /// 16-bit counter, capped by the 32-bit frame size field.
    ///
    /// For the reference geometry this is 30 911 158 bytes with implicit
    /// offsets and 30 649 018 bytes with explicit offsets.
    #[must_use]
    pub fn frame_size_limit(&self) -> usize {
        let limit = self.payload_capacity(MAX_SLAVE_CHUNKS);
        usize::try_from(u32::MAX).map_or(limit, |field_max| limit.min(field_max))
    }

    /// Number of chunks a frame of `frame_size` bytes is split into.
    ///
    /// Mirrors the fragmenter's datagram layout exactly; zero for an empty
    /// frame.
    #[must_use]
    pub fn chunk_count(&self, frame_size: usize) -> usize {
        if frame_size == 0 {
            return 0;
        }
        let mut remaining = frame_size.saturating_sub(self.master_capacity());
        let mut count = 1;

        for capacity in self.slave_slots(self.first_datagram_used()) {
            if remaining == 0 {
                return count;
            }
            remaining = remaining.saturating_sub(capacity);
            count += 1;
        }
        if remaining == 0 {
            return count;
        }

        let (per_datagram, bytes_per_datagram) = self.steady_datagram();
        let full = remaining / bytes_per_datagram;
        count += full * per_datagram;
        remaining -= full * bytes_per_datagram;

        for capacity in self.slave_slots(DATAGRAM_HEADER_LEN) {
            if remaining == 0 {
                break;
            }
            remaining = remaining.saturating_sub(capacity);
            count += 1;
        }
        count
    }

    /// Endless sequence of chunk slots in emission order.
    ///
    /// The fragmenter fills these slots front to back, truncating the last
    /// one it needs; [`Self::chunk_count`] counts the same slots.
    pub fn chunk_layout(&self) -> impl Iterator<Item = ChunkSlot> + use<> {
        let config = *self;
        let master = ChunkSlot {
            datagram: 0,
            kind: ChunkKind::Master,
            capacity: self.master_capacity(),
        };
        let first = self
            .slave_slots(self.first_datagram_used())
            .map(|capacity| ChunkSlot::slave(0, capacity));
        let steady = (1..).flat_map(move |datagram| {
            config
                .slave_slots(DATAGRAM_HEADER_LEN)
                .map(move |capacity| ChunkSlot::slave(datagram, capacity))
        });
        std::iter::once(master).chain(first).chain(steady)
    }

    /// Total payload carried by a master chunk followed by `slave_chunks`
    /// full slave chunks.
    fn payload_capacity(&self, slave_chunks: usize) -> usize {
        let mut total = self.master_capacity();
        let mut remaining = slave_chunks;

        for capacity in self.slave_slots(self.first_datagram_used()) {
            if remaining == 0 {
                return total;
            }
            total += capacity;
            remaining -= 1;
        }

        let (per_datagram, bytes_per_datagram) = self.steady_datagram();
        let full = remaining / per_datagram;
        total = total.saturating_add(full.saturating_mul(bytes_per_datagram));
        remaining -= full * per_datagram;

        total.saturating_add(
            self.slave_slots(DATAGRAM_HEADER_LEN)
                .take(remaining)
                .sum::<usize>(),
        )
    }

    /// Bytes occupied in the first datagram once a full master chunk is in.
    const fn first_datagram_used(&self) -> usize { DATAGRAM_HEADER_LEN + self.chunk_ceiling }

    /// Slave chunk count and payload bytes of a datagram holding only slaves.
    fn steady_datagram(&self) -> (usize, usize) {
        self.slave_slots(DATAGRAM_HEADER_LEN)
            .fold((0, 0), |(count, bytes), capacity| (count + 1, bytes + capacity))
    }

    /// Payload capacities of the slave chunks that still fit into a datagram
    /// with `used` bytes already written.
    ///
    /// A slave chunk is only started while more than a header's worth of
    /// space remains, so every yielded capacity is at least one byte.
    pub(crate) fn slave_slots(&self, used: usize) -> impl Iterator<Item = usize> + use<> {
        let mtu = self.mtu;
        let header = self.slave_header_len();
        let full = self.slave_capacity();
        let mut used = used;
        std::iter::from_fn(move || {
            let free = mtu.saturating_sub(used);
            if free <= header {
                return None;
            }
            let capacity = (free - header).min(full);
            used += header + capacity;
            Some(capacity)
        })
    }
}
