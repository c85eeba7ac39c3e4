//! Datagram header and the gate that screens inbound datagrams.
//!
//! Every datagram opens with a ten-byte header: protocol version, total
//! length, a reserved word and a CRC-16 over everything except the checksum
//! field itself. [`DatagramGate`] checks all four before any chunk is parsed.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BufMut;
use thiserror::Error;

use crate::{
    checksum::crc16,
    chunk::ChunkIter,
    protocol::{CHECKSUM_OFFSETS, DATAGRAM_HEADER_LEN, ProtocolConfig},
};

/// Decoded datagram header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatagramHeader {
    pub version: u16,
    /// Total datagram length, header included.
    pub length: u16,
    pub reserved: u32,
    pub checksum: u16,
}

impl DatagramHeader {
    /// Append the header to `dst` in the configured byte order.
    pub fn encode(&self, dst: &mut impl BufMut, config: &ProtocolConfig) {
        let order = config.endianness();
        order.put_u16(dst, self.version);
        order.put_u16(dst, self.length);
        order.put_u32(dst, self.reserved);
        order.put_u16(dst, self.checksum);
    }

    /// Read a header from the front of `bytes`.
    ///
    /// Returns `None` when fewer than [`DATAGRAM_HEADER_LEN`] bytes are
    /// available.
    #[must_use]
    pub fn decode(bytes: &[u8], config: &ProtocolConfig) -> Option<Self> {
        let mut cursor = bytes.get(..DATAGRAM_HEADER_LEN)?;
        let order = config.endianness();
        Some(Self {
            version: order.get_u16(&mut cursor),
            length: order.get_u16(&mut cursor),
            reserved: order.get_u32(&mut cursor),
            checksum: order.get_u16(&mut cursor),
        })
    }
}

/// Reasons the gate rejects a datagram.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram holds no chunk bytes after the header.
    #[error("datagram of {len} bytes is too short")]
    TooShort { len: usize },
    /// The datagram exceeds the MTU ceiling.
    #[error("datagram of {len} bytes exceeds the {mtu}-byte ceiling")]
    TooLong { len: usize, mtu: usize },
    /// The version magic does not match.
    #[error("protocol version {found:#06x} does not match {expected:#06x}")]
    VersionMismatch { expected: u16, found: u16 },
    /// The declared length differs from the received length.
    #[error("declared length {declared} differs from received length {actual}")]
    LengthMismatch { declared: u16, actual: usize },
    /// The checksum does not match the datagram contents.
    #[error("checksum {declared:#06x} does not match computed {computed:#06x}")]
    ChecksumMismatch { declared: u16, computed: u16 },
}

impl ProtocolError {
    /// Short label naming the rejection reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::TooShort { .. } => "too_short",
            Self::TooLong { .. } => "too_long",
            Self::VersionMismatch { .. } => "version",
            Self::LengthMismatch { .. } => "length",
            Self::ChecksumMismatch { .. } => "checksum",
        }
    }
}

/// A datagram that passed the gate.
#[derive(Clone, Copy, Debug)]
pub struct Datagram<'a> {
    header: DatagramHeader,
    body: &'a [u8],
    config: ProtocolConfig,
}

impl<'a> Datagram<'a> {
    /// The validated header.
    #[must_use]
    pub const fn header(&self) -> &DatagramHeader { &self.header }

    /// Chunk bytes following the header.
    #[must_use]
    pub const fn body(&self) -> &'a [u8] { self.body }

    /// Iterate over the chunks in the body.
    #[must_use]
    pub const fn chunks(&self) -> ChunkIter<'a> { ChunkIter::new(self.body, self.config) }
}

/// Counters of gate outcomes.
#[derive(Debug, Default)]
pub struct GateStats {
    accepted: AtomicU64,
    too_short: AtomicU64,
    too_long: AtomicU64,
    version: AtomicU64,
    length: AtomicU64,
    checksum: AtomicU64,
}

/// Point-in-time copy of [`GateStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateStatsSnapshot {
    pub accepted: u64,
    pub too_short: u64,
    pub too_long: u64,
    pub version: u64,
    pub length: u64,
    pub checksum: u64,
}

impl GateStatsSnapshot {
    /// Total rejected datagrams.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.too_short + self.too_long + self.version + self.length + self.checksum
    }
}

impl GateStats {
    fn record(&self, outcome: Result<(), &ProtocolError>) {
        let counter = match outcome {
            Ok(()) => &self.accepted,
            Err(ProtocolError::TooShort { .. }) => &self.too_short,
            Err(ProtocolError::TooLong { .. }) => &self.too_long,
            Err(ProtocolError::VersionMismatch { .. }) => &self.version,
            Err(ProtocolError::LengthMismatch { .. }) => &self.length,
            Err(ProtocolError::ChecksumMismatch { .. }) => &self.checksum,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            too_short: self.too_short.load(Ordering::Relaxed),
            too_long: self.too_long.load(Ordering::Relaxed),
            version: self.version.load(Ordering::Relaxed),
            length: self.length.load(Ordering::Relaxed),
            checksum: self.checksum.load(Ordering::Relaxed),
        }
    }
}

/// Validates inbound datagrams before their chunks reach the reassembler.
#[derive(Debug, Default)]
pub struct DatagramGate {
    config: ProtocolConfig,
    stats: GateStats,
}

impl DatagramGate {
    /// Create a gate for `config`.
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            stats: GateStats::default(),
        }
    }

    /// Protocol the gate checks against.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig { &self.config }

    /// Outcome counters.
    #[must_use]
    pub const fn stats(&self) -> &GateStats { &self.stats }

    /// Check `bytes` and expose its chunks on success.
    ///
    /// Checks run in order: size bounds, version, declared length, checksum.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProtocolError`] encountered. Rejections are
    /// counted in [`Self::stats`] and in the drop metric.
    pub fn accept<'a>(&self, bytes: &'a [u8]) -> Result<Datagram<'a>, ProtocolError> {
        let outcome = self.check(bytes);
        self.stats.record(outcome.as_ref().map(|_| ()));
        match &outcome {
            Ok(_) => crate::metrics::inc_datagrams(crate::metrics::Direction::Inbound),
            Err(err) => crate::metrics::inc_drops(err.reason()),
        }
        outcome
    }

    fn check<'a>(&self, bytes: &'a [u8]) -> Result<Datagram<'a>, ProtocolError> {
        let len = bytes.len();
        let Some(header) = DatagramHeader::decode(bytes, &self.config) else {
            return Err(ProtocolError::TooShort { len });
        };
        if len == DATAGRAM_HEADER_LEN {
            return Err(ProtocolError::TooShort { len });
        }
        if len > self.config.mtu() {
            return Err(ProtocolError::TooLong {
                len,
                mtu: self.config.mtu(),
            });
        }
        if header.version != self.config.version() {
            return Err(ProtocolError::VersionMismatch {
                expected: self.config.version(),
                found: header.version,
            });
        }
        if usize::from(header.length) != len {
            return Err(ProtocolError::LengthMismatch {
                declared: header.length,
                actual: len,
            });
        }
        let computed = crc16(bytes, &CHECKSUM_OFFSETS);
        if computed != header.checksum {
            return Err(ProtocolError::ChecksumMismatch {
                declared: header.checksum,
                computed,
            });
        }
        Ok(Datagram {
            header,
            body: &bytes[DATAGRAM_HEADER_LEN..],
            config: self.config,
        })
    }
}
