//! Inbound receive loop.

use std::{io, time::Instant};

use log::{debug, warn};
use tokio::{
    net::UdpSocket,
    sync::mpsc,
    time::{self, Duration, MissedTickBehavior, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{fragment::SharedFrameReceiver, frame::Frame};

/// How often [`run_receiver`] purges expired frames by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Read datagrams from `socket` until `shutdown` is cancelled.
///
/// Every datagram is ingested by `receiver`; completed frames are forwarded
/// to `frames` in completion order. Expired frames are purged every `sweep`.
/// The loop also ends when the frame consumer is dropped.
///
/// The read buffer is one byte larger than the MTU so oversized datagrams
/// reach the gate and are rejected instead of being silently truncated.
///
/// # Errors
///
/// This function currently always returns `Ok(())`; receive errors are
/// logged and retried with back-off.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn run_receiver(
    socket: UdpSocket,
    receiver: SharedFrameReceiver,
    frames: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    sweep: Duration,
) -> io::Result<()> {
    let mut buf = vec![0_u8; receiver.config().mtu() + 1];
    let mut ticker = time::interval(sweep);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut delay = Duration::from_millis(10);

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            _ = ticker.tick() => {
                let expired = receiver.purge_expired_at(Instant::now());
                if !expired.is_empty() {
                    debug!("purged {} expired frames", expired.len());
                }
            }

            res = socket.recv_from(&mut buf) => match res {
                Ok((len, peer)) => {
                    delay = Duration::from_millis(10);
                    let report = receiver.ingest(&buf[..len]);
                    if let Some(err) = report.rejected {
                        debug!("rejected datagram from {peer}: {err}");
                    }
                    if report.completed_frames == 0 {
                        continue;
                    }
                    for frame in receiver.drain_completed() {
                        if frames.send(frame).await.is_err() {
                            debug!("frame consumer dropped; stopping receiver");
                            return Ok(());
                        }
                    }
                }
                Err(err) => {
                    warn!("receive error: {err}");
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(1));
                }
            },
        }
    }
    Ok(())
}
