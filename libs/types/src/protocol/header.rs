//! Message Header
//!
//! Decoded form of the binary message header. The fixed part (version, SDU
//! type, service identity, QoS/session byte, transaction id, encoding id) is
//! always present; the remaining fields are optional and their presence is
//! recorded in the presence-flags byte on the wire.

use crate::address::Uri;
use crate::protocol::error::ProtocolError;
use crate::protocol::sdu::{InteractionType, SduType};
use bytes::Bytes;

/// Quality of service level (3 bits on the wire)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QosLevel {
    #[default]
    BestEffort = 0,
    Assured = 1,
    Queued = 2,
    Timely = 3,
}

impl TryFrom<u8> for QosLevel {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::BestEffort),
            1 => Ok(QosLevel::Assured),
            2 => Ok(QosLevel::Queued),
            3 => Ok(QosLevel::Timely),
            _ => Err(ProtocolError::InvalidField { field: "qos", value }),
        }
    }
}

/// Session type (4 bits on the wire)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionType {
    #[default]
    Live = 0,
    Simulation = 1,
    Replay = 2,
}

impl TryFrom<u8> for SessionType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SessionType::Live),
            1 => Ok(SessionType::Simulation),
            2 => Ok(SessionType::Replay),
            _ => Err(ProtocolError::InvalidField {
                field: "session",
                value,
            }),
        }
    }
}

/// Message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u8,
    pub sdu_type: SduType,
    pub service_area: u16,
    pub service: u16,
    pub operation: u16,
    pub area_version: u8,
    pub is_error: bool,
    pub qos: QosLevel,
    pub session: SessionType,
    pub transaction_id: u64,
    /// Body encoding id negotiated for this message
    pub encoding_id: u8,

    // Optional fields, gated by the presence-flags byte
    pub from: Option<Uri>,
    pub to: Option<Uri>,
    pub priority: Option<u32>,
    /// Milliseconds since the Unix epoch
    pub timestamp: Option<u64>,
    pub network_zone: Option<String>,
    pub session_name: Option<String>,
    pub domain: Option<Vec<String>>,
    pub authentication_id: Option<Bytes>,
}

impl MessageHeader {
    /// Create a header with only the fixed fields set
    pub fn new(sdu_type: SduType) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            sdu_type,
            service_area: 0,
            service: 0,
            operation: 0,
            area_version: 0,
            is_error: false,
            qos: QosLevel::default(),
            session: SessionType::default(),
            transaction_id: 0,
            encoding_id: 0,
            from: None,
            to: None,
            priority: None,
            timestamp: None,
            network_zone: None,
            session_name: None,
            domain: None,
            authentication_id: None,
        }
    }

    pub fn with_service(mut self, area: u16, service: u16, operation: u16, version: u8) -> Self {
        self.service_area = area;
        self.service = service;
        self.operation = operation;
        self.area_version = version;
        self
    }

    pub fn with_addresses(mut self, from: Uri, to: Uri) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: u64) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_encoding(mut self, encoding_id: u8) -> Self {
        self.encoding_id = encoding_id;
        self
    }

    pub fn with_session(mut self, session: SessionType, name: Option<String>) -> Self {
        self.session = session;
        self.session_name = name;
        self
    }

    pub fn with_domain(mut self, domain: Vec<String>) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_network_zone(mut self, zone: impl Into<String>) -> Self {
        self.network_zone = Some(zone.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    pub fn interaction_type(&self) -> InteractionType {
        self.sdu_type.interaction_type()
    }

    pub fn stage(&self) -> u8 {
        self.sdu_type.stage()
    }

    /// Header for a message answering this one.
    ///
    /// Addresses are swapped; service identity, transaction id, encoding and
    /// session/domain qualifiers are kept so the reply correlates.
    pub fn reply(&self, sdu_type: SduType, is_error: bool) -> Self {
        Self {
            version: self.version,
            sdu_type,
            service_area: self.service_area,
            service: self.service,
            operation: self.operation,
            area_version: self.area_version,
            is_error,
            qos: self.qos,
            session: self.session,
            transaction_id: self.transaction_id,
            encoding_id: self.encoding_id,
            from: self.to.clone(),
            to: self.from.clone(),
            priority: self.priority,
            timestamp: None,
            network_zone: self.network_zone.clone(),
            session_name: self.session_name.clone(),
            domain: self.domain.clone(),
            authentication_id: self.authentication_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_enum_bounds() {
        assert_eq!(QosLevel::try_from(3).unwrap(), QosLevel::Timely);
        assert!(QosLevel::try_from(4).is_err());
        assert_eq!(SessionType::try_from(2).unwrap(), SessionType::Replay);
        assert!(SessionType::try_from(3).is_err());
    }

    #[test]
    fn test_reply_swaps_addresses() {
        let header = MessageHeader::new(SduType::Request)
            .with_service(4, 2, 7, 1)
            .with_transaction_id(99)
            .with_addresses(
                Uri::from("maltcp://a:1/consumer"),
                Uri::from("maltcp://b:2/provider"),
            );

        let reply = header.reply(SduType::RequestResponse, true);
        assert_eq!(reply.from, header.to);
        assert_eq!(reply.to, header.from);
        assert_eq!(reply.transaction_id, 99);
        assert_eq!(reply.operation, 7);
        assert!(reply.is_error);
        assert_eq!(reply.interaction_type(), InteractionType::Request);
        assert_eq!(reply.stage(), 2);
    }
}
