//! Body encodings
//!
//! The header's encoding id selects how the list of body elements is laid
//! out after the header. The set is closed; an id outside it is a decode
//! error rather than a lookup miss.

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use types::{ProtocolError, ProtocolResult};

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum Encoding {
    /// u16 BE element count, then each element as u32 BE length + bytes
    #[default]
    Elements = 0,
    /// A single element passed through unframed
    Opaque = 1,
}

impl Encoding {
    pub fn from_id(encoding_id: u8) -> ProtocolResult<Self> {
        Self::try_from(encoding_id).map_err(|_| ProtocolError::UnknownEncoding { encoding_id })
    }

    pub fn id(self) -> u8 {
        self.into()
    }

    /// Append the body elements to `buf`
    pub fn encode_body(self, elements: &[Bytes], buf: &mut BytesMut) -> ProtocolResult<()> {
        match self {
            Encoding::Elements => {
                let count =
                    u16::try_from(elements.len()).map_err(|_| ProtocolError::FieldTooLarge {
                        field: "element count",
                        size: elements.len(),
                        limit: u16::MAX as usize,
                    })?;
                buf.reserve(2 + elements.iter().map(|e| 4 + e.len()).sum::<usize>());
                buf.put_u16(count);
                for element in elements {
                    let len =
                        u32::try_from(element.len()).map_err(|_| ProtocolError::FieldTooLarge {
                            field: "element",
                            size: element.len(),
                            limit: u32::MAX as usize,
                        })?;
                    buf.put_u32(len);
                    buf.put_slice(element);
                }
                Ok(())
            }
            Encoding::Opaque => match elements {
                [] => Ok(()),
                [single] => {
                    buf.put_slice(single);
                    Ok(())
                }
                _ => Err(ProtocolError::invalid_body(format!(
                    "opaque encoding carries one element, got {}",
                    elements.len()
                ))),
            },
        }
    }

    /// Split a body into elements. Elements share the input buffer.
    ///
    /// An empty opaque body decodes to no elements.
    pub fn decode_body(self, body: Bytes) -> ProtocolResult<Vec<Bytes>> {
        match self {
            Encoding::Elements => {
                if body.len() < 2 {
                    return Err(ProtocolError::message_too_small(
                        2,
                        body.len(),
                        "element count",
                    ));
                }
                let count = u16::from_be_bytes([body[0], body[1]]) as usize;
                let mut elements = Vec::with_capacity(count);
                let mut pos = 2;

                for _ in 0..count {
                    if body.len() < pos + 4 {
                        return Err(ProtocolError::message_too_small(
                            pos + 4,
                            body.len(),
                            "element length",
                        ));
                    }
                    let mut len = [0u8; 4];
                    len.copy_from_slice(&body[pos..pos + 4]);
                    let len = u32::from_be_bytes(len) as usize;
                    pos += 4;

                    let end = pos.saturating_add(len);
                    if body.len() < end {
                        return Err(ProtocolError::message_too_small(
                            end,
                            body.len(),
                            "element data",
                        ));
                    }
                    elements.push(body.slice(pos..end));
                    pos = end;
                }

                if pos != body.len() {
                    return Err(ProtocolError::invalid_body(format!(
                        "{} trailing bytes after {} elements",
                        body.len() - pos,
                        count
                    )));
                }
                Ok(elements)
            }
            Encoding::Opaque if body.is_empty() => Ok(Vec::new()),
            Encoding::Opaque => Ok(vec![body]),
        }
    }
}
