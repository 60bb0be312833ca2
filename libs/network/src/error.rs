//! Transport Error Types
//!
//! Failure taxonomy for sending, receiving and routing messages. Each
//! variant maps onto a standard error code so failures can be answered
//! at the protocol level as well as returned to local callers.

use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use types::{AddressError, ProtocolError, StandardError};

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// URI missing a required delimiter or port; no socket was touched
    #[error("Malformed address '{uri}': {source}")]
    MalformedAddress { uri: String, source: AddressError },

    /// Host name could not be resolved
    #[error("Unknown host '{host}'")]
    UnknownHost {
        host: String,
        source: Option<std::io::Error>,
    },

    /// Connect syscall refused or failed
    #[error("Failed to connect to '{uri}': {source}")]
    ConnectFailed { uri: String, source: std::io::Error },

    /// Connect did not complete in time
    #[error("Destination '{uri}' unreachable: connect exceeded {timeout_ms}ms")]
    TransientUnreachable { uri: String, timeout_ms: u64 },

    /// Malformed frame read off a socket
    #[error("Failed to decode frame from {peer:?}: {source}")]
    DecodeFailed {
        peer: Option<SocketAddr>,
        source: ProtocolError,
    },

    /// Header or body could not be serialized
    #[error("Failed to encode message: {source}")]
    EncodeFailed { source: ProtocolError },

    /// Write or send-result handoff failed, or nothing could carry the message
    #[error("Delivery to '{uri}' failed: {reason}")]
    DeliveryFailed { uri: String, reason: String },

    #[error("No endpoint '{endpoint}'")]
    NoSuchEndpoint { endpoint: String },

    #[error("Endpoint '{endpoint}' is closed")]
    EndpointClosed { endpoint: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn malformed_address(uri: impl Into<String>, source: AddressError) -> Self {
        Self::MalformedAddress {
            uri: uri.into(),
            source,
        }
    }

    pub fn connect_failed(uri: impl Into<String>, source: std::io::Error) -> Self {
        Self::ConnectFailed {
            uri: uri.into(),
            source,
        }
    }

    pub fn decode(peer: Option<SocketAddr>, source: ProtocolError) -> Self {
        Self::DecodeFailed { peer, source }
    }

    pub fn encode(source: ProtocolError) -> Self {
        Self::EncodeFailed { source }
    }

    pub fn delivery_failed(uri: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Whether the caller may succeed by retrying later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectFailed { .. }
                | TransportError::TransientUnreachable { .. }
                | TransportError::DeliveryFailed { .. }
                | TransportError::Io { .. }
        )
    }

    /// Whether the destination channel must be discarded after this failure.
    ///
    /// Address, encoding and routing failures concern one message only.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::DecodeFailed { .. }
                | TransportError::DeliveryFailed { .. }
                | TransportError::Io { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::MalformedAddress { .. } => "malformed_address",
            TransportError::UnknownHost { .. } => "unknown_host",
            TransportError::ConnectFailed { .. } => "connect_failed",
            TransportError::TransientUnreachable { .. } => "transient_unreachable",
            TransportError::DecodeFailed { .. } => "decode_failed",
            TransportError::EncodeFailed { .. } => "encode_failed",
            TransportError::DeliveryFailed { .. } => "delivery_failed",
            TransportError::NoSuchEndpoint { .. } => "no_such_endpoint",
            TransportError::EndpointClosed { .. } => "endpoint_closed",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Io { .. } => "io",
        }
    }

    /// Standard error code reported to a remote peer for this failure
    pub fn standard_error(&self) -> StandardError {
        match self {
            TransportError::MalformedAddress { .. }
            | TransportError::UnknownHost { .. }
            | TransportError::NoSuchEndpoint { .. } => StandardError::DestinationUnknown,
            TransportError::ConnectFailed { .. } | TransportError::TransientUnreachable { .. } => {
                StandardError::DestinationTransient
            }
            TransportError::DecodeFailed { .. } | TransportError::EncodeFailed { .. } => {
                StandardError::BadEncoding
            }
            TransportError::DeliveryFailed { .. } | TransportError::Io { .. } => {
                StandardError::DeliveryFailed
            }
            TransportError::EndpointClosed { .. } => StandardError::DestinationLost,
            TransportError::Configuration { .. } => StandardError::Internal,
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<transport_config::ConfigError> for TransportError {
    fn from(error: transport_config::ConfigError) -> Self {
        match error {
            transport_config::ConfigError::Invalid { field, reason } => {
                TransportError::configuration(reason, Some(field))
            }
            other => TransportError::configuration(other.to_string(), None),
        }
    }
}

/// Per-message failures of a batch send. Every failing index is reported,
/// in batch order.
#[derive(Debug)]
pub struct BatchSendError {
    pub total: usize,
    pub failures: Vec<(usize, TransportError)>,
}

impl BatchSendError {
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|(index, _)| *index).collect()
    }
}

impl fmt::Display for BatchSendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} messages failed",
            self.failures.len(),
            self.total
        )?;
        for (index, error) in &self.failures {
            write!(f, "; [{index}] {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchSendError {}
