//! End-to-end checks: fragment frames, deliver the datagrams, reassemble.

mod common;

use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use common::{config_strategy, deterministic_runner, frame_strategy, sample_frame};
use framecast::{
    Fragmenter,
    FrameReceiver,
    ProtocolConfig,
    ReassemblyLimits,
    chunk::ChunkKind,
    datagram::DatagramGate,
};
use proptest::{
    prelude::{Just, Strategy},
    prop_assert,
    prop_assert_eq,
    test_runner::TestCaseError,
};
use rstest::rstest;

fn fail(err: impl std::fmt::Display) -> TestCaseError { TestCaseError::fail(err.to_string()) }

#[rstest]
#[case(5_000, 96)]
#[case(40_000, 24)]
fn generated_frames_round_trip(#[case] max_len: usize, #[case] cases: u32) {
    let mut runner = deterministic_runner(cases);
    let strategy = (config_strategy(), frame_strategy(max_len));

    runner
        .run(&strategy, |(config, frame)| {
            let batch = Fragmenter::new(config).fragment(&frame).map_err(fail)?;
            prop_assert_eq!(batch.chunk_count(), config.chunk_count(frame.data.len()));

            let mut receiver = FrameReceiver::new(config, ReassemblyLimits::default());
            for datagram in batch.datagrams() {
                prop_assert!(datagram.len() <= config.mtu());
                let report = receiver.ingest(datagram);
                prop_assert_eq!(report.rejected, None);
                prop_assert_eq!(report.dropped_chunks, 0);
            }
            prop_assert_eq!(receiver.drain_completed(), vec![frame]);
            prop_assert_eq!(receiver.reassembler().in_flight_len(), 0);
            Ok(())
        })
        .expect("fragmented frames should reassemble");
}

#[test]
fn chunk_headers_and_payloads_fit_the_ceiling() {
    let mut runner = deterministic_runner(64);
    let strategy = (config_strategy(), frame_strategy(8_000));

    runner
        .run(&strategy, |(config, frame)| {
            let gate = DatagramGate::new(config);
            let batch = Fragmenter::new(config).fragment(&frame).map_err(fail)?;
            let mut masters = 0;
            for datagram in batch.datagrams() {
                let accepted = gate.accept(datagram).map_err(fail)?;
                for chunk in accepted.chunks() {
                    let chunk = chunk.map_err(fail)?;
                    let header = match chunk.kind() {
                        ChunkKind::Master => {
                            masters += 1;
                            config.master_header_len()
                        }
                        ChunkKind::Slave => config.slave_header_len(),
                    };
                    prop_assert!(header + chunk.payload().len() <= config.chunk_ceiling());
                    prop_assert!(!chunk.payload().is_empty());
                }
            }
            prop_assert_eq!(masters, 1);
            Ok(())
        })
        .expect("chunks should respect the ceiling");
}

#[test]
fn explicit_offsets_survive_datagram_reordering() {
    let config = ProtocolConfig::extended();
    let mut runner = deterministic_runner(64);
    let strategy = frame_strategy(12_000).prop_flat_map(move |frame| {
        let count = Fragmenter::new(config)
            .fragment(&frame)
            .map_or(1, |batch| batch.len());
        let order: Vec<usize> = (0..count).collect();
        (Just(frame), Just(order).prop_shuffle())
    });

    runner
        .run(&strategy, |(frame, order)| {
            let batch = Fragmenter::new(config).fragment(&frame).map_err(fail)?;
            let mut receiver = FrameReceiver::new(config, ReassemblyLimits::default());
            for index in order {
                receiver.ingest(&batch.datagrams()[index]);
            }
            prop_assert_eq!(receiver.drain_completed(), vec![frame]);
            Ok(())
        })
        .expect("explicit offsets should tolerate reordering");
}

#[test]
fn implicit_offsets_refuse_reordered_delivery() {
    let config = ProtocolConfig::reference();
    let frame = sample_frame(1, 6_000);
    let batch = Fragmenter::new(config).fragment(&frame).expect("fragment frame");
    assert!(batch.len() > 1);

    let mut receiver = FrameReceiver::new(config, ReassemblyLimits::default());
    let dropped: usize = batch
        .datagrams()
        .iter()
        .rev()
        .map(|datagram| receiver.ingest(datagram).dropped_chunks)
        .sum();
    assert!(dropped > 0);
    assert!(!receiver.is_complete(frame.id));
    assert!(receiver.drain_completed().is_empty());
}

#[test]
fn lost_datagrams_leave_frames_incomplete_until_they_expire() {
    let config = ProtocolConfig::extended();
    let mut runner = deterministic_runner(48);
    let strategy = frame_strategy(12_000)
        .prop_filter("needs two datagrams", move |frame| {
            frame.data.len() > 1_411
        })
        .prop_flat_map(move |frame| {
            let count = Fragmenter::new(config)
                .fragment(&frame)
                .map_or(2, |batch| batch.len());
            (Just(frame), 0..count)
        });

    runner
        .run(&strategy, |(frame, lost)| {
            let batch = Fragmenter::new(config).fragment(&frame).map_err(fail)?;
            let limits = ReassemblyLimits::default().with_timeout(Some(Duration::from_secs(1)));
            let mut receiver = FrameReceiver::new(config, limits);
            let start = Instant::now();
            for (index, datagram) in batch.datagrams().iter().enumerate() {
                if index != lost {
                    receiver.ingest_at(datagram, start);
                }
            }
            prop_assert!(!receiver.is_complete(frame.id));
            prop_assert!(receiver.drain_completed().is_empty());

            let expired = receiver.purge_expired_at(start + Duration::from_secs(1));
            prop_assert_eq!(expired, vec![frame.id]);
            prop_assert_eq!(receiver.reassembler().in_flight_len(), 0);
            Ok(())
        })
        .expect("a lost datagram should never yield a frame");
}

#[test]
fn interleaved_frames_reassemble_independently() {
    let config = ProtocolConfig::reference();
    let frames: Vec<_> = (0..4).map(|i| sample_frame(500 + i, 3_000 + 700 * i as usize)).collect();
    let batches: Vec<_> = frames
        .iter()
        .map(|frame| Fragmenter::new(config).fragment(frame).expect("fragment frame"))
        .collect();

    let limits = ReassemblyLimits::default().with_max_in_flight(NonZeroUsize::new(4));
    let mut receiver = FrameReceiver::new(config, limits);
    let longest = batches.iter().map(|b| b.len()).max().unwrap_or(0);
    for round in 0..longest {
        for batch in &batches {
            if let Some(datagram) = batch.datagrams().get(round) {
                receiver.ingest(datagram);
            }
        }
    }

    let mut received = receiver.drain_completed();
    received.sort_by_key(|frame| frame.id);
    assert_eq!(received, frames);
}
