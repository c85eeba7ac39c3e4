//! Outbound helper that splits frames into checksummed datagrams.
//!
//! [`Fragmenter`] walks the chunk layout of its [`ProtocolConfig`]: a master
//! chunk opens the first datagram, slave chunks fill the rest of it and every
//! following datagram. Each datagram is sealed with its length and checksum
//! once its last chunk is written.

use bytes::{Bytes, BytesMut};

use super::FragmentationError;
use crate::{
    checksum::crc16,
    chunk::{ChunkKind, ChunkMeta, MasterChunk, SlaveChunk, encode_master, encode_slave},
    datagram::DatagramHeader,
    frame::{Frame, FrameId, ValidationError, validate},
    protocol::{CHECKSUM_OFFSET, CHECKSUM_OFFSETS, ProtocolConfig, SlaveOffsets},
};

/// Offset of the length field inside the datagram header.
const LENGTH_OFFSET: usize = 2;

/// Datagrams produced for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatagramBatch {
    frame_id: FrameId,
    chunk_count: usize,
    datagrams: Vec<Bytes>,
}

impl DatagramBatch {
    /// Identifier shared by every chunk in the batch.
    #[must_use]
    pub const fn frame_id(&self) -> FrameId { self.frame_id }

    /// Number of chunks spread over the datagrams.
    #[must_use]
    pub const fn chunk_count(&self) -> usize { self.chunk_count }

    /// Number of datagrams.
    #[must_use]
    pub fn len(&self) -> usize { self.datagrams.len() }

    /// Whether the batch holds no datagrams.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.datagrams.is_empty() }

    /// Borrow the datagrams in emission order.
    #[must_use]
    pub fn datagrams(&self) -> &[Bytes] { &self.datagrams }

    /// Consume the batch, returning the datagrams.
    #[must_use]
    pub fn into_datagrams(self) -> Vec<Bytes> { self.datagrams }
}

impl IntoIterator for DatagramBatch {
    type Item = Bytes;
    type IntoIter = std::vec::IntoIter<Bytes>;

    fn into_iter(self) -> Self::IntoIter { self.datagrams.into_iter() }
}

/// Splits frames into datagrams.
///
/// The fragmenter holds no mutable state; one instance may serve any number
/// of threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fragmenter {
    config: ProtocolConfig,
}

impl Fragmenter {
    /// Create a fragmenter for `config`.
    #[must_use]
    pub const fn new(config: ProtocolConfig) -> Self { Self { config } }

    /// Protocol the fragmenter encodes.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig { &self.config }

    /// Validate `frame` and split it into datagrams.
    ///
    /// The output depends only on the frame and the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::Invalid`] when the frame fails
    /// validation. Other variants indicate an inconsistent configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use framecast::{fragment::Fragmenter, frame::Frame, protocol::ProtocolConfig};
    ///
    /// let fragmenter = Fragmenter::new(ProtocolConfig::reference());
    /// let batch = fragmenter
    ///     .fragment(&Frame::new("cam01", "video1", vec![0_u8; 1000]))
    ///     .unwrap();
    /// assert_eq!(batch.chunk_count(), 3);
    /// assert_eq!(batch.len(), 1);
    /// ```
    pub fn fragment(&self, frame: &Frame) -> Result<DatagramBatch, FragmentationError> {
        validate(frame, &self.config)?;
        let meta = ChunkMeta::for_frame(frame)?;
        let data = frame.data.as_ref();
        let frame_size = u32::try_from(data.len()).map_err(|_| ValidationError::TooLarge {
            size: data.len(),
            max: self.config.max_frame_size(),
        })?;

        let mut datagrams = Vec::new();
        let mut current: Option<(usize, BytesMut)> = None;
        let mut offset = 0;
        let mut chunk_count = 0;

        for slot in self.config.chunk_layout() {
            if offset == data.len() {
                break;
            }
            if let Some((_, full)) = current.take_if(|(index, _)| *index != slot.datagram) {
                datagrams.push(self.seal(full));
            }
            let (_, buf) = current.get_or_insert_with(|| (slot.datagram, self.open_datagram()));

            let end = (offset + slot.capacity).min(data.len());
            let payload = &data[offset..end];
            match slot.kind {
                ChunkKind::Master => encode_master(
                    buf,
                    &MasterChunk {
                        meta,
                        number: frame.number,
                        frame_size,
                        payload,
                    },
                    &self.config,
                )?,
                ChunkKind::Slave => {
                    let slave_number = u16::try_from(chunk_count)
                        .map_err(|_| FragmentationError::SlaveNumberOverflow { last: chunk_count - 1 })?;
                    let offset = match self.config.slave_offsets() {
                        SlaveOffsets::Implicit => None,
                        SlaveOffsets::Explicit => Some(u32::try_from(offset).map_err(|_| {
                            ValidationError::TooLarge {
                                size: data.len(),
                                max: self.config.max_frame_size(),
                            }
                        })?),
                    };
                    encode_slave(
                        buf,
                        &SlaveChunk {
                            meta,
                            slave_number,
                            offset,
                            payload,
                        },
                        &self.config,
                    )?;
                }
            }
            offset = end;
            chunk_count += 1;
        }
        if let Some((_, last)) = current {
            datagrams.push(self.seal(last));
        }

        Ok(DatagramBatch {
            frame_id: frame.id,
            chunk_count,
            datagrams,
        })
    }

    /// Start a datagram with a header whose length and checksum are patched
    /// by [`Self::seal`].
    fn open_datagram(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.config.mtu());
        DatagramHeader {
            version: self.config.version(),
            length: 0,
            reserved: 0,
            checksum: 0,
        }
        .encode(&mut buf, &self.config);
        buf
    }

    fn seal(&self, mut buf: BytesMut) -> Bytes {
        let order = self.config.endianness();
        // The layout never exceeds the mtu, which fits the length field.
        let length = u16::try_from(buf.len()).unwrap_or(u16::MAX);
        buf[LENGTH_OFFSET..LENGTH_OFFSET + 2].copy_from_slice(&order.u16_bytes(length));
        let checksum = crc16(&buf, &CHECKSUM_OFFSETS);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&order.u16_bytes(checksum));
        buf.freeze()
    }
}
