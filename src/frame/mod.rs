//! Logical media frames and the metadata carried alongside them.
//!
//! A [`Frame`] is the unit producers hand to the fragmenter and the unit the
//! reassembler yields back. Its labels are encoded into fixed-width wire
//! fields by [`Label`], identifiers come from [`FrameIdGenerator`], and
//! [`validate`] decides whether a frame may be fragmented at all.

pub mod id;
pub mod label;
pub mod validate;

use bytes::Bytes;
pub use id::{Clock, FlowSequencer, FrameId, FrameIdGenerator, SteadyClock};
pub use label::{Label, LabelError};
pub use validate::{LabelField, ValidationError, validate};

/// Scheduling hint applied when a producer does not choose one.
pub const DEFAULT_PRIORITY: u8 = 10;

/// Payload kind tag carried in every chunk header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpretation {
    /// No kind was recorded.
    #[default]
    Unspecified,
    /// Audio samples.
    Audio,
    /// Video pictures.
    Video,
    /// A tag this crate does not know; preserved verbatim.
    Other(u8),
}

impl From<u8> for Interpretation {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::Unspecified,
            1 => Self::Audio,
            2 => Self::Video,
            other => Self::Other(other),
        }
    }
}

impl From<Interpretation> for u8 {
    fn from(interpretation: Interpretation) -> Self {
        match interpretation {
            Interpretation::Unspecified => 0,
            Interpretation::Audio => 1,
            Interpretation::Video => 2,
            Interpretation::Other(tag) => tag,
        }
    }
}

/// One logical unit of media data.
///
/// # Examples
///
/// ```
/// use framecast::frame::{Frame, FrameId, Interpretation};
///
/// let frame = Frame::new("cam01", "video1", vec![0_u8; 16])
///     .with_id(FrameId::new(7))
///     .with_interpretation(Interpretation::Video);
/// assert_eq!(frame.priority, 10);
/// assert_eq!(frame.data.len(), 16);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Identifier disambiguating concurrently in-flight frames.
    pub id: FrameId,
    /// Producer sequence number, monotonic per flow and wrapping.
    pub number: u16,
    /// Payload kind.
    pub interpretation: Interpretation,
    /// Relative processing-time hint.
    pub time: u16,
    /// Scheduling hint.
    pub priority: u8,
    /// Name of the producing task.
    pub task: String,
    /// Name of the logical stream.
    pub flow: String,
    /// Frame payload.
    pub data: Bytes,
}

impl Frame {
    /// Create a frame with default metadata for `task` and `flow`.
    #[must_use]
    pub fn new(task: impl Into<String>, flow: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: FrameId::new(0),
            number: 0,
            interpretation: Interpretation::Unspecified,
            time: 0,
            priority: DEFAULT_PRIORITY,
            task: task.into(),
            flow: flow.into(),
            data: data.into(),
        }
    }

    /// Set the frame identifier.
    #[must_use]
    pub fn with_id(mut self, id: FrameId) -> Self {
        self.id = id;
        self
    }

    /// Set the producer sequence number.
    #[must_use]
    pub fn with_number(mut self, number: u16) -> Self {
        self.number = number;
        self
    }

    /// Set the payload kind.
    #[must_use]
    pub fn with_interpretation(mut self, interpretation: Interpretation) -> Self {
        self.interpretation = interpretation;
        self
    }

    /// Set the processing-time hint.
    #[must_use]
    pub fn with_time(mut self, time: u16) -> Self {
        self.time = time;
        self
    }

    /// Set the scheduling hint.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}
