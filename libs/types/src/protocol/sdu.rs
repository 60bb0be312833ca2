//! SDU Type Table
//!
//! The first header byte carries a 5-bit SDU code that jointly encodes the
//! interaction type and the interaction stage. The mapping is fixed by
//! protocol version 1 and is bijective:
//!
//! ```text
//! code   interaction  stage
//! 0      SEND         -
//! 1-2    SUBMIT       SUBMIT, SUBMIT_ACK
//! 3-4    REQUEST      REQUEST, REQUEST_RESPONSE
//! 5-7    INVOKE       INVOKE, INVOKE_ACK, INVOKE_RESPONSE
//! 8-11   PROGRESS     PROGRESS, PROGRESS_ACK, PROGRESS_UPDATE, PROGRESS_RESPONSE
//! 12-21  PUBSUB       REGISTER .. PUBLISH_DEREGISTER_ACK
//! ```

use crate::protocol::error::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Interaction pattern of a message
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InteractionType {
    Send = 1,
    Submit = 2,
    Request = 3,
    Invoke = 4,
    Progress = 5,
    PubSub = 6,
}

/// SDU code as carried on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SduType {
    Send = 0,
    Submit = 1,
    SubmitAck = 2,
    Request = 3,
    RequestResponse = 4,
    Invoke = 5,
    InvokeAck = 6,
    InvokeResponse = 7,
    Progress = 8,
    ProgressAck = 9,
    ProgressUpdate = 10,
    ProgressResponse = 11,
    Register = 12,
    RegisterAck = 13,
    PublishRegister = 14,
    PublishRegisterAck = 15,
    Publish = 16,
    Notify = 17,
    Deregister = 18,
    DeregisterAck = 19,
    PublishDeregister = 20,
    PublishDeregisterAck = 21,
}

/// (interaction type, stage) for every SDU code, indexed by code
const SDU_TABLE: [(InteractionType, u8); 22] = [
    (InteractionType::Send, 0),
    (InteractionType::Submit, 1),
    (InteractionType::Submit, 2),
    (InteractionType::Request, 1),
    (InteractionType::Request, 2),
    (InteractionType::Invoke, 1),
    (InteractionType::Invoke, 2),
    (InteractionType::Invoke, 3),
    (InteractionType::Progress, 1),
    (InteractionType::Progress, 2),
    (InteractionType::Progress, 3),
    (InteractionType::Progress, 4),
    (InteractionType::PubSub, 1),
    (InteractionType::PubSub, 2),
    (InteractionType::PubSub, 3),
    (InteractionType::PubSub, 4),
    (InteractionType::PubSub, 5),
    (InteractionType::PubSub, 6),
    (InteractionType::PubSub, 7),
    (InteractionType::PubSub, 8),
    (InteractionType::PubSub, 9),
    (InteractionType::PubSub, 10),
];

impl SduType {
    /// Highest valid SDU code
    pub const MAX_CODE: u8 = 21;

    /// Every SDU type in code order
    pub const ALL: [SduType; 22] = [
        SduType::Send,
        SduType::Submit,
        SduType::SubmitAck,
        SduType::Request,
        SduType::RequestResponse,
        SduType::Invoke,
        SduType::InvokeAck,
        SduType::InvokeResponse,
        SduType::Progress,
        SduType::ProgressAck,
        SduType::ProgressUpdate,
        SduType::ProgressResponse,
        SduType::Register,
        SduType::RegisterAck,
        SduType::PublishRegister,
        SduType::PublishRegisterAck,
        SduType::Publish,
        SduType::Notify,
        SduType::Deregister,
        SduType::DeregisterAck,
        SduType::PublishDeregister,
        SduType::PublishDeregisterAck,
    ];

    /// Decode an SDU code, rejecting anything outside 0..=21
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::UnknownSduType { sdu_type: code })
    }

    /// Wire code of this SDU type
    pub fn code(self) -> u8 {
        self.into()
    }

    /// Look up the SDU type for an (interaction type, stage) pair
    pub fn from_parts(interaction: InteractionType, stage: u8) -> Option<Self> {
        SDU_TABLE
            .iter()
            .position(|&(it, st)| it == interaction && st == stage)
            .map(|index| Self::ALL[index])
    }

    pub fn interaction_type(self) -> InteractionType {
        SDU_TABLE[self.code() as usize].0
    }

    /// Interaction stage; SEND has no stage and reports 0
    pub fn stage(self) -> u8 {
        SDU_TABLE[self.code() as usize].1
    }

    /// Stage that answers this one when the interaction mandates a reply.
    ///
    /// Only the initial stages of reply-bearing interactions have one:
    /// SUBMIT, REQUEST, INVOKE, PROGRESS and the PUBSUB register/deregister
    /// stages of both consumers and publishers.
    pub fn reply_stage(self) -> Option<SduType> {
        match self {
            SduType::Submit => Some(SduType::SubmitAck),
            SduType::Request => Some(SduType::RequestResponse),
            SduType::Invoke => Some(SduType::InvokeAck),
            SduType::Progress => Some(SduType::ProgressAck),
            SduType::Register => Some(SduType::RegisterAck),
            SduType::PublishRegister => Some(SduType::PublishRegisterAck),
            SduType::Deregister => Some(SduType::DeregisterAck),
            SduType::PublishDeregister => Some(SduType::PublishDeregisterAck),
            _ => None,
        }
    }

    /// Whether a routing failure for this stage must be answered with an error
    pub fn is_always_answered(self) -> bool {
        self.reply_stage().is_some()
    }
}

impl fmt::Display for SduType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_bijective() {
        for sdu in SduType::ALL {
            let rebuilt = SduType::from_parts(sdu.interaction_type(), sdu.stage());
            assert_eq!(rebuilt, Some(sdu), "round trip failed for {}", sdu);
            assert_eq!(SduType::from_code(sdu.code()).unwrap(), sdu);
        }
    }

    #[test]
    fn test_codes_are_dense() {
        for code in 0..=SduType::MAX_CODE {
            assert_eq!(SduType::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        for code in (SduType::MAX_CODE + 1)..=u8::MAX {
            assert_eq!(
                SduType::from_code(code),
                Err(ProtocolError::UnknownSduType { sdu_type: code })
            );
        }
    }

    #[test]
    fn test_known_stages() {
        assert_eq!(SduType::Send.stage(), 0);
        assert_eq!(SduType::InvokeResponse.interaction_type(), InteractionType::Invoke);
        assert_eq!(SduType::InvokeResponse.stage(), 3);
        assert_eq!(SduType::Notify.interaction_type(), InteractionType::PubSub);
        assert_eq!(SduType::Notify.stage(), 6);
        assert_eq!(SduType::from_parts(InteractionType::Send, 1), None);
    }

    #[test]
    fn test_always_answered_stages() {
        let answered: Vec<_> = SduType::ALL
            .iter()
            .copied()
            .filter(|sdu| sdu.is_always_answered())
            .collect();
        assert_eq!(
            answered,
            vec![
                SduType::Submit,
                SduType::Request,
                SduType::Invoke,
                SduType::Progress,
                SduType::Register,
                SduType::PublishRegister,
                SduType::Deregister,
                SduType::PublishDeregister,
            ]
        );
        assert!(!SduType::Send.is_always_answered());
        assert!(!SduType::Publish.is_always_answered());
    }
}
