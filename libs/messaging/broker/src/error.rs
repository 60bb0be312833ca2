//! Broker error types

use network::{BatchSendError, TransportError};
use thiserror::Error;
use transport_config::ConfigError;
use types::{SduType, StandardError};

#[derive(Error, Debug)]
pub enum BrokerError {
    /// Body of a broker message could not be parsed
    #[error("Malformed {sdu} body: {reason}")]
    MalformedBody { sdu: SduType, reason: String },

    #[error("{patterns} key patterns but {flags} on-change flags")]
    PatternFlagMismatch { patterns: usize, flags: usize },

    #[error("Message has no sender address")]
    MissingSender,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Notify(#[from] BatchSendError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    pub fn malformed(sdu: SduType, reason: impl Into<String>) -> Self {
        Self::MalformedBody {
            sdu,
            reason: reason.into(),
        }
    }

    /// Code carried by the error reply sent for this failure
    pub fn standard_error(&self) -> StandardError {
        match self {
            BrokerError::MalformedBody { .. } | BrokerError::PatternFlagMismatch { .. } => {
                StandardError::BadEncoding
            }
            BrokerError::MissingSender => StandardError::DestinationUnknown,
            BrokerError::Transport(e) => e.standard_error(),
            BrokerError::Notify(_) => StandardError::DeliveryFailed,
            BrokerError::Config(_) => StandardError::Internal,
        }
    }
}
