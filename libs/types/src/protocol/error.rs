//! Protocol-level errors for header and body processing
//!
//! Every variant describes a malformed or unsupported byte sequence. None of
//! them involve I/O; the network crate wraps them into its decode/encode
//! failure categories.

use thiserror::Error;

/// Header and body format errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before a field could be read
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: &'static str,
    },

    /// SDU code outside the fixed lookup table
    #[error("Unknown SDU type {sdu_type}: valid codes are 0-21")]
    UnknownSduType { sdu_type: u8 },

    #[error("Unsupported protocol version {version}: supported version is {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Encoding id has no registered body encoding
    #[error("Unknown body encoding id {encoding_id}")]
    UnknownEncoding { encoding_id: u8 },

    /// A packed enum field holds a value with no meaning
    #[error("Invalid value {value} for header field {field}")]
    InvalidField { field: &'static str, value: u8 },

    /// Inner length slot disagrees with the bytes actually present
    #[error("Length mismatch: header declares {declared} variable bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Field {field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    /// Value too large for its length prefix
    #[error("Field {field} too large: {size} bytes exceeds limit {limit}")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
    },

    /// Body elements could not be interpreted
    #[error("Invalid body: {reason}")]
    InvalidBody { reason: String },
}

impl ProtocolError {
    pub fn message_too_small(need: usize, got: usize, context: &'static str) -> Self {
        Self::MessageTooSmall { need, got, context }
    }

    pub fn invalid_body(reason: impl Into<String>) -> Self {
        Self::InvalidBody {
            reason: reason.into(),
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
