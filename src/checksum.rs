//! CRC-16 checksum used to protect datagrams.
//!
//! The protocol uses the CCITT-FALSE parameterisation (polynomial `0x1021`,
//! initial value `0xFFFF`, no reflection, no final XOR), catalogued as
//! `CRC-16/IBM-3740`. The checksum field sits inside the datagram it protects,
//! so callers pass the field's byte offsets to have them skipped.

use crc::{CRC_16_IBM_3740, Crc};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC-16 of `bytes`, ignoring every position in `excluded`.
///
/// Offsets outside `bytes` are ignored and duplicates are harmless.
///
/// # Examples
///
/// ```
/// use framecast::checksum::crc16;
///
/// assert_eq!(crc16(b"IIOt8", &[]), 0x77A9);
/// assert_eq!(crc16(b"xIIOt8", &[0]), 0x77A9);
/// ```
#[must_use]
pub fn crc16(bytes: &[u8], excluded: &[usize]) -> u16 {
    let mut skip: Vec<usize> = excluded
        .iter()
        .copied()
        .filter(|offset| *offset < bytes.len())
        .collect();
    skip.sort_unstable();
    skip.dedup();

    let mut digest = CRC16.digest();
    let mut start = 0;
    for offset in skip {
        if let Some(segment) = bytes.get(start..offset) {
            digest.update(segment);
        }
        start = offset + 1;
    }
    if let Some(rest) = bytes.get(start..) {
        digest.update(rest);
    }
    digest.finalize()
}
