//! Outbound side: fragment a frame and write its datagrams.

use std::{io, net::SocketAddr, sync::Arc};

use log::{debug, warn};
use thiserror::Error;

use super::DatagramSink;
use crate::{
    fragment::{FragmentationError, Fragmenter},
    frame::Frame,
    metrics::{self, Direction},
    protocol::ProtocolConfig,
    subscription::SubscriptionRegistry,
};

/// Errors returned while sending a frame.
#[derive(Debug, Error)]
pub enum SendError {
    /// The frame could not be fragmented.
    #[error(transparent)]
    Fragment(#[from] FragmentationError),
    /// The socket refused a datagram.
    #[error("datagram send failed: {0}")]
    Io(#[from] io::Error),
    /// The socket accepted only part of a datagram.
    #[error("short send: wrote {written} of {len} bytes")]
    Truncated { written: usize, len: usize },
}

/// Fragments frames and writes the datagrams to a sink.
///
/// A failed datagram aborts the rest of its frame; the receiver discards the
/// partial frame once it expires.
#[derive(Debug)]
pub struct FrameSender<S> {
    fragmenter: Fragmenter,
    sink: S,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl<S: DatagramSink> FrameSender<S> {
    /// Create a sender writing to `sink` and routing published frames through
    /// `subscriptions`.
    #[must_use]
    pub fn new(config: ProtocolConfig, sink: S, subscriptions: Arc<SubscriptionRegistry>) -> Self {
        Self {
            fragmenter: Fragmenter::new(config),
            sink,
            subscriptions,
        }
    }

    /// Protocol the sender encodes.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig { self.fragmenter.config() }

    /// Registry consulted by [`FrameSender::publish`].
    #[must_use]
    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> { &self.subscriptions }

    /// Send `frame` to `target`, returning the number of datagrams written.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the frame is invalid or the sink fails.
    pub async fn send_to(&self, frame: &Frame, target: SocketAddr) -> Result<usize, SendError> {
        let batch = self.fragmenter.fragment(frame)?;
        let count = batch.len();
        for datagram in batch {
            let written = self
                .sink
                .send_to(&datagram, target)
                .await
                .inspect_err(|err| warn!("sending frame {} to {target} failed: {err}", frame.id))?;
            if written != datagram.len() {
                return Err(SendError::Truncated {
                    written,
                    len: datagram.len(),
                });
            }
            metrics::inc_datagrams(Direction::Outbound);
        }
        metrics::inc_frames(Direction::Outbound);
        debug!("sent frame {} in {count} datagrams to {target}", frame.id);
        Ok(count)
    }

    /// Send `frame` to the address subscribed to its flow.
    ///
    /// Returns `Ok(None)` when nobody subscribed to the flow.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the frame is invalid or the sink fails.
    pub async fn publish(&self, frame: &Frame) -> Result<Option<usize>, SendError> {
        let Some(target) = self.subscriptions.lookup(&frame.flow) else {
            debug!("no subscriber for flow {:?}", frame.flow);
            return Ok(None);
        };
        self.send_to(frame, target).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use rstest::{fixture, rstest};

    use super::{FrameSender, SendError};
    use crate::{
        fragment::FragmentationError,
        frame::{Frame, FrameId, ValidationError},
        protocol::ProtocolConfig,
        subscription::SubscriptionRegistry,
        transport::DatagramSink,
    };

    /// Records datagrams; fails or truncates on request.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        fail_after: Option<usize>,
        truncate: bool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().expect("sink lock").clone()
        }
    }

    #[async_trait]
    impl DatagramSink for RecordingSink {
        async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<usize> {
            let mut sent = self.sent.lock().expect("sink lock");
            if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
                return Err(io::Error::other("network unreachable"));
            }
            sent.push((datagram.to_vec(), target));
            Ok(if self.truncate { datagram.len() - 1 } else { datagram.len() })
        }
    }

    fn addr(port: u16) -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], port)) }

    fn frame(flow: &str, len: usize) -> Frame {
        Frame::new("cam01", flow, vec![0x5A; len]).with_id(FrameId::new(77))
    }

    #[fixture]
    fn sender() -> FrameSender<Arc<RecordingSink>> {
        FrameSender::new(
            ProtocolConfig::reference(),
            Arc::new(RecordingSink::default()),
            Arc::new(SubscriptionRegistry::new()),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn send_to_writes_every_datagram(sender: FrameSender<Arc<RecordingSink>>) {
        let sent = sender
            .send_to(&frame("video1", 5_000), addr(9000))
            .await
            .expect("send frame");
        assert_eq!(sent, 4);
        let recorded = sender.sink.sent();
        assert_eq!(recorded.len(), 4);
        assert!(recorded.iter().all(|(_, target)| *target == addr(9000)));
    }

    #[rstest]
    #[tokio::test]
    async fn publish_routes_by_flow(sender: FrameSender<Arc<RecordingSink>>) {
        sender.subscriptions().subscribe("video1", addr(9100));

        assert_eq!(
            sender.publish(&frame("audio1", 10)).await.expect("publish"),
            None
        );
        assert_eq!(
            sender.publish(&frame("video1", 10)).await.expect("publish"),
            Some(1)
        );
        assert_eq!(sender.sink.sent()[0].1, addr(9100));
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_frames_send_nothing(sender: FrameSender<Arc<RecordingSink>>) {
        let err = sender
            .send_to(&frame("video1", 0), addr(9000))
            .await
            .expect_err("empty frame");
        assert!(matches!(
            err,
            SendError::Fragment(FragmentationError::Invalid(ValidationError::EmptyData))
        ));
        assert!(sender.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_aborts_the_frame() {
        let sink = Arc::new(RecordingSink {
            fail_after: Some(1),
            ..RecordingSink::default()
        });
        let sender = FrameSender::new(
            ProtocolConfig::reference(),
            Arc::clone(&sink),
            Arc::new(SubscriptionRegistry::new()),
        );
        let err = sender
            .send_to(&frame("video1", 5_000), addr(9000))
            .await
            .expect_err("second datagram fails");
        assert!(matches!(err, SendError::Io(_)));
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn short_writes_are_reported() {
        let sink = RecordingSink {
            truncate: true,
            ..RecordingSink::default()
        };
        let sender = FrameSender::new(
            ProtocolConfig::reference(),
            sink,
            Arc::new(SubscriptionRegistry::new()),
        );
        let err = sender
            .send_to(&frame("video1", 10), addr(9000))
            .await
            .expect_err("truncated");
        assert!(matches!(
            err,
            SendError::Truncated {
                written: 48,
                len: 49
            }
        ));
    }
}
