//! Line-based control protocol for flow subscriptions.
//!
//! Each request is one line of space-separated `key=value` pairs:
//!
//! ```text
//! command=subscribe flow=video1 address=127.0.0.1:5000
//! command=unsubscribe flow=video1
//! command=list
//! ```
//!
//! Keys and command names are matched without regard to ASCII case; flow
//! names and addresses are taken verbatim. Parsing is strict: a single
//! token that is not a well-formed `key=value` pair refuses the whole line.
//!
//! Every request gets one reply line starting with `status=ok` or
//! `status=error`. In error replies `reason` is the last key and its value
//! runs to the end of the line.

mod client;
mod command;
mod server;

pub use client::ControlClient;
pub use command::{ControlCommand, ControlError, ControlReply};
pub use server::{MAX_LINE_LENGTH, serve_control};
