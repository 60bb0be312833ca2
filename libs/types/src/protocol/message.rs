//! Transport message: header plus already-encoded body elements

use crate::protocol::header::MessageHeader;
use crate::protocol::sdu::SduType;
use bytes::Bytes;

/// A message as seen by the transport.
///
/// The body is a list of opaque elements; their attribute encoding belongs
/// to the application layer. The transport only frames them according to
/// the header's encoding id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Vec<Bytes>,
}

impl Message {
    pub fn new(header: MessageHeader, body: Vec<Bytes>) -> Self {
        Self { header, body }
    }

    /// Message answering this one at the given stage
    pub fn reply(&self, sdu_type: SduType, body: Vec<Bytes>) -> Self {
        Self {
            header: self.header.reply(sdu_type, false),
            body,
        }
    }

    /// Total size of body elements, excluding framing
    pub fn body_len(&self) -> usize {
        self.body.iter().map(Bytes::len).sum()
    }
}
