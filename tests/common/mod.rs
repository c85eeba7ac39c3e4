//! Shared helpers for integration tests.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use bytes::{BufMut, Bytes, BytesMut};
use framecast::{
    Endianness,
    Frame,
    FrameId,
    Interpretation,
    ProtocolConfig,
    checksum::crc16,
    datagram::DatagramHeader,
    protocol::{CHECKSUM_OFFSETS, DATAGRAM_HEADER_LEN},
};
use proptest::{
    collection::vec,
    prelude::{Just, Strategy, any, prop_oneof},
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestRng, TestRunner},
};

pub fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

/// Both offset modes in both byte orders.
pub fn config_strategy() -> impl Strategy<Value = ProtocolConfig> {
    prop_oneof![
        Just(ProtocolConfig::reference()),
        Just(ProtocolConfig::reference().with_endianness(Endianness::Little)),
        Just(ProtocolConfig::extended()),
        Just(ProtocolConfig::extended().with_endianness(Endianness::Little)),
    ]
}

/// Frame lengths biased towards chunk and datagram boundaries.
pub fn length_strategy(max: usize) -> impl Strategy<Value = usize> {
    prop_oneof![
        Just(1_usize),
        Just(483_usize),
        Just(484_usize),
        Just(1_411_usize),
        Just(1_412_usize),
        Just(2_826_usize),
        Just(2_827_usize),
        1_usize..=max,
    ]
}

/// Arbitrary valid frames with payloads of up to `max` bytes.
pub fn frame_strategy(max: usize) -> impl Strategy<Value = Frame> {
    let metadata = (
        any::<u32>(),
        any::<u16>(),
        any::<u8>(),
        any::<u16>(),
        any::<u8>(),
        "[a-z0-9]{1,6}",
        "[a-z0-9]{1,6}",
    );
    let data = length_strategy(max).prop_flat_map(|len| vec(any::<u8>(), len));
    (metadata, data).prop_map(|((id, number, tag, time, priority, task, flow), data)| {
        Frame::new(task, flow, data)
            .with_id(FrameId::new(id))
            .with_number(number)
            .with_interpretation(Interpretation::from(tag))
            .with_time(time)
            .with_priority(priority)
    })
}

pub fn sample_frame(id: u32, len: usize) -> Frame {
    let data: Vec<u8> = (0..len)
        .map(|i| u8::try_from(i % 251).expect("remainder fits in u8"))
        .collect();
    Frame::new("cam01", "video1", data)
        .with_id(FrameId::new(id))
        .with_interpretation(Interpretation::Video)
}

/// Wrap `body` in a datagram with a correct header.
pub fn seal(body: &[u8], config: &ProtocolConfig) -> Bytes {
    let mut datagram = BytesMut::with_capacity(DATAGRAM_HEADER_LEN + body.len());
    DatagramHeader {
        version: config.version(),
        length: u16::try_from(DATAGRAM_HEADER_LEN + body.len()).expect("datagram fits u16"),
        reserved: 0,
        checksum: 0,
    }
    .encode(&mut datagram, config);
    datagram.put_slice(body);
    let checksum = crc16(&datagram, &CHECKSUM_OFFSETS);
    datagram[8..10].copy_from_slice(&config.endianness().u16_bytes(checksum));
    datagram.freeze()
}
