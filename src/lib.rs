#![doc(html_root_url = "https://docs.rs/framecast/latest")]
//! Public API for the `framecast` library.
//!
//! `framecast` moves media frames over UDP. A [`Fragmenter`] splits each
//! [`Frame`] into chunks packed into checksummed datagrams no larger than the
//! MTU; a [`FrameReceiver`] checks incoming datagrams and reassembles the
//! chunks into the original frames. The [`transport`] and [`control`]
//! modules wire both halves to sockets.
//!
//! ```
//! use framecast::{
//!     Fragmenter,
//!     Frame,
//!     FrameReceiver,
//!     ProtocolConfig,
//!     ReassemblyLimits,
//! };
//!
//! let config = ProtocolConfig::reference();
//! let frame = Frame::new("cam01", "video1", vec![7_u8; 4_000]);
//! let batch = Fragmenter::new(config).fragment(&frame).unwrap();
//!
//! let mut receiver = FrameReceiver::new(config, ReassemblyLimits::default());
//! for datagram in batch.datagrams() {
//!     receiver.ingest(datagram);
//! }
//! assert_eq!(receiver.drain_completed(), vec![frame]);
//! ```

pub mod byte_order;
pub mod checksum;
pub mod chunk;
pub mod control;
pub mod datagram;
pub mod fragment;
pub mod frame;
pub mod media;
pub mod metrics;
pub mod protocol;
pub mod subscription;
pub mod transport;

pub use byte_order::Endianness;
pub use datagram::{DatagramGate, GateStatsSnapshot, ProtocolError};
pub use fragment::{
    DatagramBatch,
    FragmentationError,
    Fragmenter,
    FrameReceiver,
    FrameStatus,
    IngestReport,
    Reassembler,
    ReassemblyConflict,
    ReassemblyLimits,
    SharedFrameReceiver,
};
pub use frame::{Frame, FrameId, FrameIdGenerator, Interpretation, ValidationError};
pub use media::{FrameProducer, MediaKind, MediaSample};
pub use protocol::{ConfigError, ProtocolConfig, SlaveOffsets};
pub use subscription::SubscriptionRegistry;
pub use transport::{DatagramSink, FrameSender, SendError, run_receiver};
