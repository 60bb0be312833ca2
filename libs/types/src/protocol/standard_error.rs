//! Standard Error Codes
//!
//! Error replies synthesized by the transport carry one of these codes and
//! a diagnostic string as their two body elements.

use crate::protocol::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum StandardError {
    DeliveryFailed = 65536,
    DeliveryTimedout = 65537,
    DeliveryDelayed = 65538,
    DestinationUnknown = 65539,
    DestinationTransient = 65540,
    DestinationLost = 65541,
    AuthenticationFailed = 65542,
    AuthorisationFailed = 65543,
    EncryptionFailed = 65544,
    UnsupportedArea = 65545,
    UnsupportedAreaVersion = 65546,
    UnsupportedService = 65547,
    UnsupportedOperation = 65548,
    BadEncoding = 65549,
    Internal = 65550,
    Unknown = 65551,
    IncorrectState = 65552,
    TooMany = 65553,
}

impl StandardError {
    pub fn code(self) -> u32 {
        self.into()
    }
}

impl fmt::Display for StandardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Body of an error reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: StandardError,
    pub info: String,
}

impl ErrorBody {
    pub fn new(error: StandardError, info: impl Into<String>) -> Self {
        Self {
            error,
            info: info.into(),
        }
    }

    /// Body elements: u32 BE code, UTF-8 diagnostic
    pub fn to_elements(&self) -> Vec<Bytes> {
        vec![
            Bytes::copy_from_slice(&self.error.code().to_be_bytes()),
            Bytes::from(self.info.clone()),
        ]
    }

    pub fn from_elements(elements: &[Bytes]) -> ProtocolResult<Self> {
        let [code, info] = elements else {
            return Err(ProtocolError::invalid_body(format!(
                "error body needs 2 elements, got {}",
                elements.len()
            )));
        };

        let code: [u8; 4] = code.as_ref().try_into().map_err(|_| {
            ProtocolError::invalid_body(format!("error code needs 4 bytes, got {}", code.len()))
        })?;
        let code = u32::from_be_bytes(code);
        let error = StandardError::try_from(code)
            .map_err(|_| ProtocolError::invalid_body(format!("unknown standard error {code}")))?;
        let info = std::str::from_utf8(info)
            .map_err(|_| ProtocolError::InvalidUtf8 { field: "error info" })?
            .to_string();

        Ok(Self { error, info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_elements() {
        let body = ErrorBody::new(StandardError::DestinationUnknown, "no endpoint 'x'");
        let elements = body.to_elements();
        assert_eq!(elements[0].as_ref(), &65539u32.to_be_bytes());
        assert_eq!(ErrorBody::from_elements(&elements).unwrap(), body);
    }

    #[test]
    fn test_error_body_rejects_bad_shape() {
        assert!(ErrorBody::from_elements(&[]).is_err());
        let bad_code = [Bytes::from_static(&[0, 0, 0, 1]), Bytes::from_static(b"x")];
        assert!(ErrorBody::from_elements(&bad_code).is_err());
    }
}
