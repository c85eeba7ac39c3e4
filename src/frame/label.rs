//! Fixed-width task and flow labels.
//!
//! Labels travel as six bytes of UTF-8, right-padded with zeros. Trailing
//! zeros are stripped on the way back in, so a label may not contain a NUL
//! byte of its own.

use thiserror::Error;

use crate::protocol::LABEL_WIDTH;

/// Errors raised while encoding or decoding a label.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    /// The UTF-8 encoding is wider than the wire field.
    #[error("label is {len} bytes; the field holds {LABEL_WIDTH}")]
    TooLong { len: usize },
    /// The label contains a NUL byte that zero padding would swallow.
    #[error("label contains a NUL byte")]
    ContainsNul,
    /// The wire field does not hold valid UTF-8.
    #[error("label is not valid UTF-8")]
    InvalidUtf8,
}

/// A label in its on-wire form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Label {
    bytes: [u8; LABEL_WIDTH],
    len: u8,
}

impl Label {
    /// Encode `text` into a zero-padded field.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::TooLong`] when `text` does not fit and
    /// [`LabelError::ContainsNul`] when it contains a NUL byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use framecast::frame::Label;
    ///
    /// let label = Label::encode("cam").unwrap();
    /// assert_eq!(label.as_bytes(), b"cam\0\0\0");
    /// assert_eq!(label.as_str(), "cam");
    /// ```
    pub fn encode(text: &str) -> Result<Self, LabelError> {
        let raw = text.as_bytes();
        if raw.len() > LABEL_WIDTH {
            return Err(LabelError::TooLong { len: raw.len() });
        }
        if raw.contains(&0) {
            return Err(LabelError::ContainsNul);
        }
        let mut bytes = [0; LABEL_WIDTH];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: field_len(raw.len()),
        })
    }

    /// Decode a wire field, stripping the zero padding.
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::InvalidUtf8`] when the unpadded bytes are not
    /// UTF-8.
    pub fn decode(bytes: [u8; LABEL_WIDTH]) -> Result<Self, LabelError> {
        let len = bytes.iter().rposition(|b| *b != 0).map_or(0, |last| last + 1);
        std::str::from_utf8(&bytes[..len]).map_err(|_| LabelError::InvalidUtf8)?;
        Ok(Self {
            bytes,
            len: field_len(len),
        })
    }

    /// The zero-padded wire field.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; LABEL_WIDTH] { &self.bytes }

    /// The label text without padding.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "callers never pass more than LABEL_WIDTH"
)]
const fn field_len(len: usize) -> u8 { len as u8 }
