//! Tests for the gate-plus-reassembler pipeline.

use std::{thread, time::Instant};

use bytes::BytesMut;

use super::{reseal, sample_frame};
use crate::{
    datagram::ProtocolError,
    fragment::{FrameReceiver, Fragmenter, IngestReport, ReassemblyLimits, SharedFrameReceiver},
    protocol::ProtocolConfig,
};

fn receiver(config: ProtocolConfig) -> FrameReceiver { FrameReceiver::new(config, ReassemblyLimits::default()) }

#[test]
fn ingests_a_whole_batch() {
    let config = ProtocolConfig::reference();
    let mut receiver = receiver(config);
    let frame = sample_frame(40, 3_000);
    let batch = Fragmenter::new(config).fragment(&frame).expect("fragment frame");

    let reports: Vec<IngestReport> = batch.datagrams().iter().map(|d| receiver.ingest(d)).collect();
    assert_eq!(
        reports.iter().map(|r| r.accepted_chunks).sum::<usize>(),
        batch.chunk_count()
    );
    assert_eq!(reports.last().map(|r| r.completed_frames), Some(1));
    assert!(reports.iter().all(|r| r.rejected.is_none() && r.dropped_chunks == 0));
    assert_eq!(receiver.drain_completed(), vec![frame]);
    assert_eq!(receiver.gate_stats().accepted, u64::try_from(batch.len()).expect("fits"));
}

#[test]
fn corrupted_datagrams_are_absorbed() {
    let config = ProtocolConfig::reference();
    let mut receiver = receiver(config);
    let frame = sample_frame(41, 100);
    let batch = Fragmenter::new(config).fragment(&frame).expect("fragment frame");
    let mut corrupted = batch.datagrams()[0].to_vec();
    corrupted[50] ^= 0x10;

    let report = receiver.ingest(&corrupted);
    assert!(matches!(
        report.rejected,
        Some(ProtocolError::ChecksumMismatch { .. })
    ));
    assert!(!receiver.is_complete(frame.id));
    assert_eq!(receiver.gate_stats().checksum, 1);

    receiver.ingest(&batch.datagrams()[0]);
    assert!(receiver.is_complete(frame.id));
}

#[test]
fn chunks_before_a_malformed_chunk_survive() {
    let config = ProtocolConfig::reference();
    let mut receiver = receiver(config);
    let frame = sample_frame(42, 200);
    let batch = Fragmenter::new(config).fragment(&frame).expect("fragment frame");

    let mut edited = BytesMut::from(&batch.datagrams()[0][..]);
    edited.extend_from_slice(&[0xEE; 12]);
    let datagram = reseal(edited, &config);

    let report = receiver.ingest(&datagram);
    assert_eq!(report.rejected, None);
    assert_eq!(report.accepted_chunks, 1);
    assert_eq!(report.dropped_chunks, 1);
    assert_eq!(report.completed_frames, 1);
}

#[test]
fn duplicate_datagrams_are_dropped_as_conflicts() {
    let config = ProtocolConfig::reference();
    let mut receiver = receiver(config);
    let frame = sample_frame(43, 1_000);
    let batch = Fragmenter::new(config).fragment(&frame).expect("fragment frame");
    let datagram = &batch.datagrams()[0];

    assert_eq!(receiver.ingest(datagram).completed_frames, 1);
    let replay = receiver.ingest(datagram);
    assert_eq!(replay.accepted_chunks, 0);
    assert_eq!(replay.dropped_chunks, batch.chunk_count());
    assert_eq!(receiver.drain_completed(), vec![frame]);
}

#[test]
fn shared_receiver_feeds_a_concurrent_consumer() {
    let config = ProtocolConfig::extended();
    let shared = SharedFrameReceiver::new(receiver(config));
    let frames: Vec<_> = (0..8).map(|i| sample_frame(100 + i, 2_500)).collect();
    let batches: Vec<_> = frames
        .iter()
        .map(|f| Fragmenter::new(config).fragment(f).expect("fragment frame"))
        .collect();

    let producer = {
        let shared = shared.clone();
        thread::spawn(move || {
            for batch in &batches {
                for datagram in batch.datagrams() {
                    shared.ingest_at(datagram, Instant::now());
                }
            }
        })
    };

    let mut received = Vec::new();
    while received.len() < frames.len() {
        received.extend(shared.drain_completed());
        thread::yield_now();
    }
    producer.join().expect("producer thread");

    received.sort_by_key(|f| f.id);
    assert_eq!(received, frames);
    assert_eq!(shared.in_flight_len(), 0);
}
