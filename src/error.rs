//! Error types returned by palette extraction.

use thiserror::Error;

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// The ways an extraction request can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// The pixel buffer or the options were malformed. Retrying will not help.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// An unexpected internal fault, e.g., arithmetic on a degenerate buffer.
    #[error("extraction failed: {reason}")]
    Failure {
        /// A short, non user-facing description of the fault.
        reason: String,
    },

    /// The request was cancelled (or superseded by a newer request) at a checkpoint.
    #[error("extraction was cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Creates an [`ExtractionError::Failure`] with the given reason.
    pub(crate) fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    /// Whether issuing the same request again could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

/// The specific defect found in an input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidInput {
    /// The width or height of the pixel buffer is zero.
    #[error("pixel buffer has zero width or height ({width}x{height})")]
    EmptyDimensions {
        /// The provided width.
        width: u32,
        /// The provided height.
        height: u32,
    },

    /// The byte length does not equal `width * height * channels`.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    LengthMismatch {
        /// `width * height * channels`.
        expected: usize,
        /// The length of the provided data.
        actual: usize,
    },

    /// `width * height * channels` does not fit in memory.
    #[error("pixel buffer of {width}x{height}x{channels} bytes is too large")]
    TooLarge {
        /// The provided width.
        width: u32,
        /// The provided height.
        height: u32,
        /// The provided channel count.
        channels: u8,
    },

    /// Only RGB (3) and RGBA (4) buffers are supported.
    #[error("unsupported channel count {0}, expected 3 or 4")]
    UnsupportedChannels(u8),

    /// The requested palette size is outside `MIN_COLORS..=MAX_COLORS`.
    #[error("color count {0} is outside {min}..={max}", min = crate::MIN_COLORS, max = crate::MAX_COLORS)]
    ColorCountOutOfRange(u8),

    /// The deduplication threshold is negative or not finite.
    #[error("dedup threshold {0} must be finite and non-negative")]
    DedupThreshold(f64),

    /// A hex color string could not be parsed.
    #[error("malformed hex color {0:?}")]
    MalformedHex(String),
}
