//! Boundary between media sources and the frame pipeline.
//!
//! Sources describe each sample once with a [`MediaKind`]; the
//! [`FrameProducer`] turns samples into [`Frame`]s carrying the matching
//! [`Interpretation`] tag, a fresh identifier and the next sequence number of
//! its flow.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::frame::{
    Clock,
    FlowSequencer,
    Frame,
    FrameIdGenerator,
    Interpretation,
    LabelField,
    SteadyClock,
    ValidationError,
    validate::encode_label,
    DEFAULT_PRIORITY,
};

/// Codec of a media sample.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Mjpeg,
    Aac,
    /// G.711 mu-law.
    PcmMulaw,
    /// G.711 A-law.
    PcmAlaw,
    /// Any other encoding, by its RTP encoding name.
    Other(String),
}

impl Codec {
    /// Map an RTP encoding name (as found in SDP `rtpmap` lines) to a codec.
    ///
    /// # Examples
    ///
    /// ```
    /// use framecast::media::Codec;
    ///
    /// assert_eq!(Codec::from_encoding_name("h264"), Codec::H264);
    /// assert_eq!(Codec::from_encoding_name("JPEG"), Codec::Mjpeg);
    /// assert_eq!(Codec::from_encoding_name("opus"), Codec::Other("OPUS".into()));
    /// ```
    #[must_use]
    pub fn from_encoding_name(name: &str) -> Self {
        let name = name.to_ascii_uppercase();
        match name.as_str() {
            "H264" => Self::H264,
            "JPEG" | "MJPEG" => Self::Mjpeg,
            "MPEG4-GENERIC" | "AAC" => Self::Aac,
            "PCMU" => Self::PcmMulaw,
            "PCMA" => Self::PcmAlaw,
            _ => Self::Other(name),
        }
    }
}

/// What a media sample carries, decided once by the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Audio { codec: Codec, config: Option<Bytes> },
    Video { codec: Codec, config: Option<Bytes> },
    Unknown,
}

impl MediaKind {
    /// Payload tag written into every chunk of the frame.
    #[must_use]
    pub const fn interpretation(&self) -> Interpretation {
        match self {
            Self::Audio { .. } => Interpretation::Audio,
            Self::Video { .. } => Interpretation::Video,
            Self::Unknown => Interpretation::Unspecified,
        }
    }

    /// Codec of the sample, if known.
    #[must_use]
    pub const fn codec(&self) -> Option<&Codec> {
        match self {
            Self::Audio { codec, .. } | Self::Video { codec, .. } => Some(codec),
            Self::Unknown => None,
        }
    }

    /// Out-of-band codec configuration, such as H.264 parameter sets.
    #[must_use]
    pub const fn config(&self) -> Option<&Bytes> {
        match self {
            Self::Audio { config, .. } | Self::Video { config, .. } => config.as_ref(),
            Self::Unknown => None,
        }
    }
}

/// One timestamped unit produced by a media source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSample {
    pub kind: MediaKind,
    /// Time since the source started.
    pub elapsed: Duration,
    pub payload: Bytes,
}

/// Turns media samples into frames for one task and flow.
#[derive(Debug)]
pub struct FrameProducer<C = SteadyClock> {
    task: String,
    flow: String,
    priority: u8,
    ids: Arc<FrameIdGenerator<C>>,
    sequencer: FlowSequencer,
}

impl<C: Clock> FrameProducer<C> {
    /// Create a producer drawing identifiers from `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when `task` or `flow` cannot be encoded.
    pub fn new(
        task: impl Into<String>,
        flow: impl Into<String>,
        ids: Arc<FrameIdGenerator<C>>,
    ) -> Result<Self, ValidationError> {
        let task = task.into();
        let flow = flow.into();
        encode_label(&task, LabelField::Task)?;
        encode_label(&flow, LabelField::Flow)?;
        Ok(Self {
            task,
            flow,
            priority: DEFAULT_PRIORITY,
            ids,
            sequencer: FlowSequencer::default(),
        })
    }

    /// Scheduling hint applied to every frame.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Flow the producer feeds.
    #[must_use]
    pub fn flow(&self) -> &str { &self.flow }

    /// Wrap `sample` in a frame.
    ///
    /// The time hint is the elapsed time in milliseconds, saturating at
    /// `u16::MAX`.
    #[must_use]
    pub fn produce(&self, sample: MediaSample) -> Frame {
        let time = u16::try_from(sample.elapsed.as_millis()).unwrap_or(u16::MAX);
        Frame {
            id: self.ids.next_id(),
            number: self.sequencer.next_number(),
            interpretation: sample.kind.interpretation(),
            time,
            priority: self.priority,
            task: self.task.clone(),
            flow: self.flow.clone(),
            data: sample.payload,
        }
    }

    /// Map a stream of samples to a stream of frames.
    pub fn frames<S>(self, samples: S) -> impl Stream<Item = Frame>
    where
        S: Stream<Item = MediaSample>,
    {
        samples.map(move |sample| self.produce(sample))
    }
}
