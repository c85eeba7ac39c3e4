//! Byte-order selection for integer fields on the wire.
//!
//! The reference protocol writes every integer in network byte order, but
//! deployments have been observed using little-endian peers as well. The
//! helpers here keep the choice in one place so the chunk codec and the
//! datagram header never branch on endianness themselves.

use bytes::{Buf, BufMut};

/// Byte order used for encoding and decoding integer fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Most significant byte first (network byte order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

impl Endianness {
    /// Append `value` to `dst` in this byte order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use framecast::byte_order::Endianness;
    ///
    /// let mut buf = BytesMut::new();
    /// Endianness::Big.put_u16(&mut buf, 0x1234);
    /// Endianness::Little.put_u16(&mut buf, 0x1234);
    /// assert_eq!(&buf[..], &[0x12, 0x34, 0x34, 0x12]);
    /// ```
    pub fn put_u16(self, dst: &mut impl BufMut, value: u16) {
        match self {
            Self::Big => dst.put_u16(value),
            Self::Little => dst.put_u16_le(value),
        }
    }

    /// Append `value` to `dst` in this byte order.
    pub fn put_u32(self, dst: &mut impl BufMut, value: u32) {
        match self {
            Self::Big => dst.put_u32(value),
            Self::Little => dst.put_u32_le(value),
        }
    }

    /// Read a `u16` from `src` in this byte order.
    ///
    /// Callers must check that at least two bytes remain; [`Buf::get_u16`]
    /// panics otherwise.
    pub fn get_u16(self, src: &mut impl Buf) -> u16 {
        match self {
            Self::Big => src.get_u16(),
            Self::Little => src.get_u16_le(),
        }
    }

    /// Read a `u32` from `src` in this byte order.
    ///
    /// Callers must check that at least four bytes remain.
    pub fn get_u32(self, src: &mut impl Buf) -> u32 {
        match self {
            Self::Big => src.get_u32(),
            Self::Little => src.get_u32_le(),
        }
    }

    /// Serialise a `u16` into its on-wire representation.
    ///
    /// # Examples
    ///
    /// ```
    /// use framecast::byte_order::Endianness;
    ///
    /// assert_eq!(Endianness::Big.u16_bytes(0xBEEF), [0xBE, 0xEF]);
    /// assert_eq!(Endianness::Little.u16_bytes(0xBEEF), [0xEF, 0xBE]);
    /// ```
    #[must_use]
    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Self::Big => value.to_be_bytes(),
            Self::Little => value.to_le_bytes(),
        }
    }
}
