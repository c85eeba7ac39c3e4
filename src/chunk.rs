//! Encoding and decoding of master and slave chunks.
//!
//! Both chunk shapes open with a kind byte and a 16-bit total length, then
//! repeat the frame metadata so every chunk can be routed to its frame on its
//! own. Decoded chunks borrow their payload from the datagram they came from.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::{
    frame::{
        Frame,
        FrameId,
        Interpretation,
        Label,
        LabelError,
        LabelField,
        ValidationError,
        validate::encode_label,
    },
    protocol::{LABEL_WIDTH, ProtocolConfig, SlaveOffsets},
};

/// Chunk discriminator stored in the first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkKind {
    /// Continuation of a frame's payload.
    Slave = 0,
    /// Opening chunk carrying the full frame metadata.
    Master = 1,
}

impl TryFrom<u8> for ChunkKind {
    type Error = ChunkError;

    fn try_from(kind: u8) -> Result<Self, Self::Error> {
        match kind {
            0 => Ok(Self::Slave),
            1 => Ok(Self::Master),
            other => Err(ChunkError::UnknownKind { kind: other }),
        }
    }
}

/// Errors raised while encoding or decoding chunks.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    /// The kind byte is neither master nor slave.
    #[error("unknown chunk kind {kind}")]
    UnknownKind { kind: u8 },
    /// Fewer bytes remain than the chunk header needs.
    #[error("truncated chunk header: need {needed} bytes, {available} available")]
    TruncatedHeader { needed: usize, available: usize },
    /// The chunk carries no payload.
    #[error("chunk length {length} leaves no payload after the {header}-byte header")]
    EmptyPayload { length: usize, header: usize },
    /// The chunk is larger than the chunk ceiling.
    #[error("chunk length {length} exceeds the {ceiling}-byte ceiling")]
    TooLong { length: usize, ceiling: usize },
    /// The declared length runs past the end of the datagram.
    #[error("chunk length {length} overruns the {available} remaining bytes")]
    Overrun { length: usize, available: usize },
    /// A master chunk declares an unusable frame size.
    #[error("declared frame size {size} is outside 1..={max}")]
    FrameSize { size: u32, max: usize },
    /// The slave offset field does not match the configured protocol.
    #[error("slave offset presence does not match the {expected:?} protocol")]
    OffsetMode { expected: SlaveOffsets },
    /// A label field is not valid UTF-8.
    #[error("invalid {field} label: {source}")]
    Label {
        field: LabelField,
        #[source]
        source: LabelError,
    },
}

/// Metadata repeated in every chunk of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMeta {
    pub task: Label,
    pub flow: Label,
    pub frame_id: FrameId,
    pub interpretation: Interpretation,
    pub priority: u8,
    pub time: u16,
}

impl ChunkMeta {
    /// Encode the labels and copy the scalar metadata of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a label is empty or does not fit.
    pub fn for_frame(frame: &Frame) -> Result<Self, ValidationError> {
        Ok(Self {
            task: encode_label(&frame.task, LabelField::Task)?,
            flow: encode_label(&frame.flow, LabelField::Flow)?,
            frame_id: frame.id,
            interpretation: frame.interpretation,
            priority: frame.priority,
            time: frame.time,
        })
    }
}

/// Opening chunk of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MasterChunk<'a> {
    pub meta: ChunkMeta,
    /// Producer sequence number of the frame.
    pub number: u16,
    /// Total payload length of the frame.
    pub frame_size: u32,
    pub payload: &'a [u8],
}

/// Continuation chunk of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlaveChunk<'a> {
    pub meta: ChunkMeta,
    /// Position of the chunk among the frame's slaves, starting at 1.
    pub slave_number: u16,
    /// Byte offset into the frame; present only with explicit offsets.
    pub offset: Option<u32>,
    pub payload: &'a [u8],
}

/// Either chunk shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    Master(MasterChunk<'a>),
    Slave(SlaveChunk<'a>),
}

impl<'a> Chunk<'a> {
    /// Shared metadata of the chunk.
    #[must_use]
    pub const fn meta(&self) -> &ChunkMeta {
        match self {
            Self::Master(chunk) => &chunk.meta,
            Self::Slave(chunk) => &chunk.meta,
        }
    }

    /// Identifier of the frame the chunk belongs to.
    #[must_use]
    pub const fn frame_id(&self) -> FrameId { self.meta().frame_id }

    /// Payload slice carried by the chunk.
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        match self {
            Self::Master(chunk) => chunk.payload,
            Self::Slave(chunk) => chunk.payload,
        }
    }

    /// Discriminator of the chunk.
    #[must_use]
    pub const fn kind(&self) -> ChunkKind {
        match self {
            Self::Master(_) => ChunkKind::Master,
            Self::Slave(_) => ChunkKind::Slave,
        }
    }
}

/// Append `chunk` to `dst`.
///
/// # Errors
///
/// Returns [`ChunkError::EmptyPayload`] for an empty payload and
/// [`ChunkError::TooLong`] when the chunk exceeds the chunk ceiling.
pub fn encode_master(
    dst: &mut BytesMut,
    chunk: &MasterChunk<'_>,
    config: &ProtocolConfig,
) -> Result<(), ChunkError> {
    let length = checked_length(config.master_header_len(), chunk.payload.len(), config)?;
    let order = config.endianness();
    dst.reserve(usize::from(length));
    put_meta(dst, ChunkKind::Master, length, &chunk.meta, config);
    order.put_u16(dst, chunk.number);
    order.put_u32(dst, chunk.frame_size);
    dst.put_slice(chunk.payload);
    Ok(())
}

/// Append `chunk` to `dst`.
///
/// # Errors
///
/// As [`encode_master`], plus [`ChunkError::OffsetMode`] when the offset
/// field does not match the configured protocol.
pub fn encode_slave(
    dst: &mut BytesMut,
    chunk: &SlaveChunk<'_>,
    config: &ProtocolConfig,
) -> Result<(), ChunkError> {
    let expected = config.slave_offsets();
    match (expected, chunk.offset) {
        (SlaveOffsets::Implicit, None) | (SlaveOffsets::Explicit, Some(_)) => {}
        _ => return Err(ChunkError::OffsetMode { expected }),
    }
    let length = checked_length(config.slave_header_len(), chunk.payload.len(), config)?;
    let order = config.endianness();
    dst.reserve(usize::from(length));
    put_meta(dst, ChunkKind::Slave, length, &chunk.meta, config);
    order.put_u16(dst, chunk.slave_number);
    if let Some(offset) = chunk.offset {
        order.put_u32(dst, offset);
    }
    dst.put_slice(chunk.payload);
    Ok(())
}

fn checked_length(header: usize, payload: usize, config: &ProtocolConfig) -> Result<u16, ChunkError> {
    let length = header + payload;
    if payload == 0 {
        return Err(ChunkError::EmptyPayload { length, header });
    }
    let ceiling = config.chunk_ceiling();
    if length > ceiling {
        return Err(ChunkError::TooLong { length, ceiling });
    }
    u16::try_from(length).map_err(|_| ChunkError::TooLong { length, ceiling })
}

fn put_meta(dst: &mut BytesMut, kind: ChunkKind, length: u16, meta: &ChunkMeta, config: &ProtocolConfig) {
    let order = config.endianness();
    dst.put_u8(kind as u8);
    order.put_u16(dst, length);
    dst.put_slice(meta.task.as_bytes());
    dst.put_slice(meta.flow.as_bytes());
    order.put_u32(dst, meta.frame_id.get());
    dst.put_u8(meta.interpretation.into());
    dst.put_u8(meta.priority);
    order.put_u16(dst, meta.time);
}

/// Decode one chunk from the front of `src`, advancing it past the chunk.
///
/// On error `src` is left untouched.
///
/// # Errors
///
/// Returns [`ChunkError`] when the bytes do not form a well-formed chunk for
/// `config`.
pub fn decode_chunk<'a>(src: &mut &'a [u8], config: &ProtocolConfig) -> Result<Chunk<'a>, ChunkError> {
    let bytes: &'a [u8] = *src;
    let Some(&kind_byte) = bytes.first() else {
        return Err(ChunkError::TruncatedHeader {
            needed: 1,
            available: 0,
        });
    };
    let kind = ChunkKind::try_from(kind_byte)?;
    let header = match kind {
        ChunkKind::Master => config.master_header_len(),
        ChunkKind::Slave => config.slave_header_len(),
    };
    if bytes.len() < header {
        return Err(ChunkError::TruncatedHeader {
            needed: header,
            available: bytes.len(),
        });
    }

    let order = config.endianness();
    let mut cursor = &bytes[1..header];
    let length = usize::from(order.get_u16(&mut cursor));
    if length <= header {
        return Err(ChunkError::EmptyPayload { length, header });
    }
    if length > config.chunk_ceiling() {
        return Err(ChunkError::TooLong {
            length,
            ceiling: config.chunk_ceiling(),
        });
    }
    if length > bytes.len() {
        return Err(ChunkError::Overrun {
            length,
            available: bytes.len(),
        });
    }

    let meta = ChunkMeta {
        task: get_label(&mut cursor, LabelField::Task)?,
        flow: get_label(&mut cursor, LabelField::Flow)?,
        frame_id: FrameId::new(order.get_u32(&mut cursor)),
        interpretation: Interpretation::from(cursor.get_u8()),
        priority: cursor.get_u8(),
        time: order.get_u16(&mut cursor),
    };
    let payload = &bytes[header..length];
    let chunk = match kind {
        ChunkKind::Master => {
            let number = order.get_u16(&mut cursor);
            let frame_size = order.get_u32(&mut cursor);
            let max = config.max_frame_size();
            if frame_size == 0 || !usize::try_from(frame_size).is_ok_and(|size| size <= max) {
                return Err(ChunkError::FrameSize {
                    size: frame_size,
                    max,
                });
            }
            Chunk::Master(MasterChunk {
                meta,
                number,
                frame_size,
                payload,
            })
        }
        ChunkKind::Slave => {
            let slave_number = order.get_u16(&mut cursor);
            let offset = match config.slave_offsets() {
                SlaveOffsets::Implicit => None,
                SlaveOffsets::Explicit => Some(order.get_u32(&mut cursor)),
            };
            Chunk::Slave(SlaveChunk {
                meta,
                slave_number,
                offset,
                payload,
            })
        }
    };
    *src = &bytes[length..];
    Ok(chunk)
}

fn get_label(cursor: &mut &[u8], field: LabelField) -> Result<Label, ChunkError> {
    let mut raw = [0; LABEL_WIDTH];
    cursor.copy_to_slice(&mut raw);
    Label::decode(raw).map_err(|source| ChunkError::Label { field, source })
}

/// Iterator over the chunks of a datagram body.
///
/// Yields every well-formed chunk up to the first malformed one, then that
/// chunk's error, then stops.
#[derive(Clone, Debug)]
pub struct ChunkIter<'a> {
    rest: &'a [u8],
    config: ProtocolConfig,
    failed: bool,
}

impl<'a> ChunkIter<'a> {
    /// Iterate over the chunks packed into `body`.
    #[must_use]
    pub const fn new(body: &'a [u8], config: ProtocolConfig) -> Self {
        Self {
            rest: body,
            config,
            failed: false,
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let result = decode_chunk(&mut self.rest, &self.config);
        self.failed = result.is_err();
        Some(result)
    }
}
