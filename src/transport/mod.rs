//! UDP plumbing around the fragmenter and the receive pipeline.
//!
//! [`FrameSender`] fragments frames and writes the datagrams to a
//! [`DatagramSink`]; [`run_receiver`] reads datagrams from a socket and hands
//! completed frames to a channel until it is cancelled.

mod receiver;
mod sender;
mod sink;

pub use receiver::{DEFAULT_SWEEP_INTERVAL, run_receiver};
pub use sender::{FrameSender, SendError};
pub use sink::DatagramSink;
