//! # Frame Construction
//!
//! A frame is one header plus its encoded body. The outer u32 length prefix
//! that delimits frames on a socket is added by the network layer; the
//! functions here deal only with the frame bytes themselves.
//!
//! ```text
//! ┌──────────────── fixed 23 ───────────────┬── optional fields ──┬── body ──┐
//! │ ... │ presence │ encoding │ var length  │ from to ... auth    │ elements │
//! └─────────────────────────────────────────┴─────────────────────┴──────────┘
//!                                   var length = optional fields + body
//! ```

use crate::constants::FIXED_HEADER_SIZE;
use crate::encoding::Encoding;
use crate::header::HeaderCodec;
use bytes::{Bytes, BytesMut};
use tracing::trace;
use types::{Message, ProtocolError, ProtocolResult};

/// Encode a message into a single frame.
///
/// The header goes in first with a zero length slot; once the body has been
/// appended the slot is patched with the final size.
pub fn encode_frame(message: &Message) -> ProtocolResult<Bytes> {
    let encoding = Encoding::from_id(message.header.encoding_id)?;

    let mut buf = BytesMut::with_capacity(FIXED_HEADER_SIZE + 128 + message.body_len());
    let start = HeaderCodec::encode_into(&message.header, &mut buf)?;
    encoding.encode_body(&message.body, &mut buf)?;
    HeaderCodec::patch_variable_length(&mut buf, start)?;

    trace!(
        sdu = %message.header.sdu_type,
        transaction_id = message.header.transaction_id,
        bytes = buf.len(),
        "Encoded frame"
    );
    Ok(buf.freeze())
}

/// Decode one complete frame.
///
/// The variable-length slot must account for exactly the bytes present
/// after the fixed prefix.
pub fn decode_frame(frame: Bytes) -> ProtocolResult<Message> {
    let declared = HeaderCodec::variable_length(&frame)?;
    let actual = frame.len() - FIXED_HEADER_SIZE;
    if declared != actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }

    let (header, consumed) = HeaderCodec::decode(&frame)?;
    let encoding = Encoding::from_id(header.encoding_id)?;
    let body = encoding.decode_body(frame.slice(consumed..))?;

    Ok(Message::new(header, body))
}
