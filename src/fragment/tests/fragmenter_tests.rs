//! Tests for outbound fragmentation and the datagram layout.

use rstest::rstest;

use super::{chunks_in, sample_frame};
use crate::{
    byte_order::Endianness,
    checksum::crc16,
    chunk::{Chunk, ChunkKind},
    frame::{Frame, FrameId, ValidationError},
    fragment::{FragmentationError, Fragmenter},
    protocol::{CHECKSUM_OFFSETS, ProtocolConfig, SlaveOffsets},
};

#[rstest]
#[case::single_byte(1, 1, vec![40])]
#[case::full_master(483, 1, vec![522])]
#[case::one_past_master(484, 2, vec![548])]
#[case::first_datagram_full(1411, 3, vec![1500])]
#[case::spills_into_second(1413, 4, vec![1500, 37])]
fn reference_layout(#[case] len: usize, #[case] chunks: usize, #[case] sizes: Vec<usize>) {
    let fragmenter = Fragmenter::new(ProtocolConfig::reference());
    let batch = fragmenter
        .fragment(&sample_frame(1, len))
        .expect("fragment frame");

    assert_eq!(batch.chunk_count(), chunks);
    assert_eq!(
        batch.datagrams().iter().map(|d| d.len()).collect::<Vec<_>>(),
        sizes
    );
}

#[test]
fn large_frames_respect_mtu_and_chunk_ceiling() {
    let config = ProtocolConfig::reference();
    let batch = Fragmenter::new(config)
        .fragment(&sample_frame(2, 100_000))
        .expect("fragment frame");

    assert_eq!(batch.chunk_count(), 212);
    assert_eq!(batch.len(), 71);
    assert_eq!(batch.chunk_count(), config.chunk_count(100_000));
    for datagram in batch.datagrams() {
        assert!(datagram.len() <= config.mtu());
        for chunk in chunks_in(datagram, &config) {
            let header = match chunk.kind() {
                ChunkKind::Master => config.master_header_len(),
                ChunkKind::Slave => config.slave_header_len(),
            };
            assert!(header + chunk.payload().len() <= config.chunk_ceiling());
        }
    }
}

#[rstest]
#[case::reference(ProtocolConfig::reference())]
#[case::extended(ProtocolConfig::extended())]
fn slaves_are_numbered_from_one(#[case] config: ProtocolConfig) {
    let frame = sample_frame(3, 5_000);
    let batch = Fragmenter::new(config)
        .fragment(&frame)
        .expect("fragment frame");

    let chunks: Vec<Chunk<'_>> = batch
        .datagrams()
        .iter()
        .flat_map(|d| chunks_in(d, &config))
        .collect();
    assert_eq!(chunks.len(), batch.chunk_count());

    let Chunk::Master(first) = chunks[0] else {
        panic!("first chunk must be the master");
    };
    assert_eq!(first.frame_size, 5_000);
    assert_eq!(first.number, 7);

    let mut position = first.payload.len();
    for (expected_number, chunk) in (1_u16..).zip(&chunks[1..]) {
        let Chunk::Slave(slave) = chunk else {
            panic!("only the first chunk is a master");
        };
        assert_eq!(slave.slave_number, expected_number);
        match config.slave_offsets() {
            SlaveOffsets::Implicit => assert_eq!(slave.offset, None),
            SlaveOffsets::Explicit => {
                assert_eq!(slave.offset, Some(u32::try_from(position).expect("fits")));
            }
        }
        position += slave.payload.len();
    }
    assert_eq!(position, frame.data.len());
}

#[rstest]
#[case::big(Endianness::Big, [0x01, 0x00])]
#[case::little(Endianness::Little, [0x00, 0x01])]
fn headers_carry_version_length_and_checksum(
    #[case] endianness: Endianness,
    #[case] version: [u8; 2],
) {
    let config = ProtocolConfig::reference().with_endianness(endianness);
    let batch = Fragmenter::new(config)
        .fragment(&sample_frame(4, 3_000))
        .expect("fragment frame");

    for datagram in batch.datagrams() {
        assert_eq!(datagram[0..2], version);
        let length = u16::try_from(datagram.len()).expect("fits");
        assert_eq!(datagram[2..4], endianness.u16_bytes(length));
        assert_eq!(datagram[4..8], [0; 4]);
        let checksum = crc16(datagram, &CHECKSUM_OFFSETS);
        assert_eq!(datagram[8..10], endianness.u16_bytes(checksum));
    }
}

#[test]
fn output_is_deterministic() {
    let fragmenter = Fragmenter::new(ProtocolConfig::extended());
    let frame = sample_frame(5, 7_777);
    assert_eq!(
        fragmenter.fragment(&frame).expect("first run"),
        fragmenter.fragment(&frame).expect("second run")
    );
}

#[test]
fn batch_reports_frame_id() {
    let batch = Fragmenter::default()
        .fragment(&sample_frame(0xDEAD, 10))
        .expect("fragment frame");
    assert_eq!(batch.frame_id(), FrameId::new(0xDEAD));
    assert!(!batch.is_empty());
    assert_eq!(batch.into_iter().count(), 1);
}

#[rstest]
#[case::empty(Frame::new("cam01", "video1", Vec::new()), ValidationError::EmptyData)]
#[case::oversized(
    Frame::new("cam01", "video1", vec![0_u8; 2_049]),
    ValidationError::TooLarge { size: 2_049, max: 2_048 },
)]
fn refuses_invalid_frames(#[case] frame: Frame, #[case] expected: ValidationError) {
    let config = ProtocolConfig::reference()
        .with_max_frame_size(2_048)
        .expect("valid ceiling");
    assert_eq!(
        Fragmenter::new(config).fragment(&frame),
        Err(FragmentationError::Invalid(expected))
    );
}
