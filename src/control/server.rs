//! TCP listener speaking the control line protocol.

use std::{io, sync::Arc};

use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    time::{Duration, sleep},
};
use tokio_util::{
    codec::{Framed, LinesCodec, LinesCodecError},
    sync::CancellationToken,
    task::TaskTracker,
};

use super::command::{ControlError, error_reply, handle_line};
use crate::subscription::SubscriptionRegistry;

/// Longest request line accepted, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Accept control connections until `shutdown` is cancelled.
///
/// Each connection is served on its own task and closed after an over-long
/// request line. The function returns once every connection task has
/// finished.
///
/// # Errors
///
/// This function currently always returns `Ok(())`; accept failures are
/// logged and retried with exponential back-off.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
pub async fn serve_control(
    listener: TcpListener,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let tracker = TaskTracker::new();
    let mut delay = Duration::from_millis(10);
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    debug!("control connection from {peer}");
                    tracker.spawn(handle_connection(
                        stream,
                        Arc::clone(&registry),
                        shutdown.clone(),
                    ));
                    delay = Duration::from_millis(10);
                }
                Err(err) => {
                    warn!("control accept error: {err}");
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(1));
                }
            },
        }
    }
    tracker.close();
    tracker.wait().await;
    Ok(())
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn handle_connection(
    stream: TcpStream,
    registry: Arc<SubscriptionRegistry>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let next = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            next = framed.next() => next,
        };
        let (reply, close) = match next {
            Some(Ok(line)) => (handle_line(&line, &registry), false),
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                let err = ControlError::LineTooLong {
                    max: MAX_LINE_LENGTH,
                };
                (error_reply(&err), true)
            }
            Some(Err(LinesCodecError::Io(err))) => {
                debug!("control connection failed: {err}");
                break;
            }
            None => break,
        };
        if let Err(err) = framed.send(reply).await {
            debug!("control reply failed: {err}");
            break;
        }
        if close {
            break;
        }
    }
}
