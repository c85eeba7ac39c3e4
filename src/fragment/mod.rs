//! Fragmentation of frames into datagrams and their reassembly.
//!
//! This module collects the outbound [`Fragmenter`], the per-frame
//! [`FrameBuilder`], the [`Reassembler`] that owns the builders, and the
//! [`FrameReceiver`] pipeline that feeds it from raw datagrams. Both sides
//! derive their chunk layout from the same
//! [`ProtocolConfig`](crate::protocol::ProtocolConfig).

pub mod builder;
pub mod error;
pub mod fragmenter;
pub mod reassembler;
pub mod receiver;

pub use builder::FrameBuilder;
pub use error::{FragmentationError, FrameStatus, ReassemblyConflict};
pub use fragmenter::{DatagramBatch, Fragmenter};
pub use reassembler::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_REASSEMBLY_TIMEOUT, Reassembler, ReassemblyLimits};
pub use receiver::{FrameReceiver, IngestReport, SharedFrameReceiver};
