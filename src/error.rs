//! Error handling for the rowzip library
//!
//! All fallible operations in this crate return [`RowzipError`] through the
//! [`Result`] alias. Errors carry enough context to identify the failing
//! component; archive deserialization errors additionally name the stage
//! index and byte offset where decoding stopped.

use thiserror::Error;

/// Main error type for the rowzip library
#[derive(Error, Debug)]
pub enum RowzipError {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Destination buffer is too small for the decoded output
    #[error("short buffer: need {needed} bytes, have {available}")]
    ShortBuffer {
        /// Number of bytes the operation needs
        needed: usize,
        /// Number of bytes the caller provided
        available: usize,
    },

    /// Encode was called on a model that has not been trained
    #[error("model is not trained")]
    UntrainedModel,

    /// Index out of bounds access
    #[error("out of bounds: index {index}, size {size}")]
    OutOfBounds {
        /// The invalid index
        index: usize,
        /// The valid size/length
        size: usize,
    },

    /// Structurally invalid archive data (boundaries, token ranges)
    #[error("corrupted archive: {message}")]
    Corrupted {
        /// Description of the structural violation
        message: String,
    },

    /// Malformed serialized form (magic, version, stage framing, payloads)
    #[error("invalid archive format: {message}")]
    Format {
        /// Description of the format violation
        message: String,
    },

    /// A policy limit was exceeded (payload size, stage count, codebook size)
    #[error("limit exceeded: {message}")]
    Limit {
        /// Description of the exceeded limit
        message: String,
    },
}

impl RowzipError {
    /// Create a short buffer error
    pub fn short_buffer(needed: usize, available: usize) -> Self {
        Self::ShortBuffer { needed, available }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(index: usize, size: usize) -> Self {
        Self::OutOfBounds { index, size }
    }

    /// Create a corrupted archive error
    pub fn corrupted<S: Into<String>>(message: S) -> Self {
        Self::Corrupted { message: message.into() }
    }

    /// Create an archive format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        Self::Format { message: message.into() }
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded<S: Into<String>>(message: S) -> Self {
        Self::Limit { message: message.into() }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::ShortBuffer { .. } => true,
            Self::UntrainedModel => true,
            Self::OutOfBounds { .. } => false,
            Self::Corrupted { .. } => false,
            Self::Format { .. } => false,
            Self::Limit { .. } => false,
        }
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::ShortBuffer { .. } => "buffer",
            Self::UntrainedModel => "model",
            Self::OutOfBounds { .. } => "bounds",
            Self::Corrupted { .. } => "corrupted",
            Self::Format { .. } => "format",
            Self::Limit { .. } => "limit",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RowzipError>;
