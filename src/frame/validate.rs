//! Outbound frame checks applied before fragmentation.

use std::fmt;

use thiserror::Error;

use super::{Frame, Label, LabelError};
use crate::protocol::ProtocolConfig;

/// Which label a [`ValidationError`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelField {
    Task,
    Flow,
}

impl fmt::Display for LabelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Task => "task",
            Self::Flow => "flow",
        })
    }
}

/// Reasons a frame may not be fragmented.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The frame carries no payload.
    #[error("frame data is empty")]
    EmptyData,
    /// A label is empty.
    #[error("{0} label is empty")]
    EmptyLabel(LabelField),
    /// A label cannot be encoded into its wire field.
    #[error("{field} label is invalid: {source}")]
    Label {
        field: LabelField,
        #[source]
        source: LabelError,
    },
    /// The payload exceeds the configured maximum frame size.
    #[error("frame data is {size} bytes; the limit is {max}")]
    TooLarge { size: usize, max: usize },
}

/// Check `frame` against the constraints of `config`.
///
/// # Errors
///
/// Returns the first rule the frame violates.
///
/// # Examples
///
/// ```
/// use framecast::{
///     frame::{Frame, ValidationError, validate},
///     protocol::ProtocolConfig,
/// };
///
/// let config = ProtocolConfig::reference();
/// assert!(validate(&Frame::new("cam01", "video1", vec![1_u8]), &config).is_ok());
/// assert_eq!(
///     validate(&Frame::new("cam01", "video1", Vec::new()), &config),
///     Err(ValidationError::EmptyData)
/// );
/// ```
pub fn validate(frame: &Frame, config: &ProtocolConfig) -> Result<(), ValidationError> {
    if frame.data.is_empty() {
        return Err(ValidationError::EmptyData);
    }
    encode_label(&frame.task, LabelField::Task)?;
    encode_label(&frame.flow, LabelField::Flow)?;
    if frame.data.len() > config.max_frame_size() {
        return Err(ValidationError::TooLarge {
            size: frame.data.len(),
            max: config.max_frame_size(),
        });
    }
    Ok(())
}

/// Encode a non-empty label, tagging failures with the field name.
pub(crate) fn encode_label(text: &str, field: LabelField) -> Result<Label, ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::EmptyLabel(field));
    }
    Label::encode(text).map_err(|source| ValidationError::Label { field, source })
}
