//! # Header Codec
//!
//! ## Purpose
//!
//! Converts [`MessageHeader`] to and from its binary form. The fixed prefix
//! is read with explicit offsets; optional fields follow in descending
//! presence-bit order and are only present when their bit is set.
//!
//! ## Encoding
//!
//! Encoding is two-pass: [`HeaderCodec::encode_into`] writes the header with
//! a zeroed variable-length slot, the caller appends whatever follows (the
//! body, for a full frame), then [`HeaderCodec::patch_variable_length`]
//! overwrites the slot with the number of bytes after the fixed prefix.
//!
//! ## Field Formats
//!
//! - strings: u16 BE length + UTF-8 bytes
//! - blobs: u16 BE length + raw bytes
//! - domain: u16 BE count + strings
//! - priority: u32 BE, timestamp: u64 BE milliseconds

use crate::constants::{
    flags, ERROR_BIT, FIXED_HEADER_SIZE, QOS_MASK, QOS_SHIFT, SDU_MASK, SESSION_MASK,
    VARIABLE_LENGTH_OFFSET, VERSION_SHIFT,
};
use bytes::{BufMut, Bytes, BytesMut};
use types::{MessageHeader, ProtocolError, ProtocolResult, QosLevel, SduType, SessionType, Uri};

/// Stateless header encoder/decoder
pub struct HeaderCodec;

impl HeaderCodec {
    /// Encode a header on its own, with the variable-length slot covering
    /// only the optional fields.
    pub fn encode(header: &MessageHeader) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::with_capacity(FIXED_HEADER_SIZE + 64);
        Self::encode_into(header, &mut buf)?;
        Self::patch_variable_length(&mut buf, 0)?;
        Ok(buf.freeze())
    }

    /// Append the header to `buf` with a zero placeholder in the
    /// variable-length slot. Returns the offset the header starts at.
    pub fn encode_into(header: &MessageHeader, buf: &mut BytesMut) -> ProtocolResult<usize> {
        if header.version > (u8::MAX >> VERSION_SHIFT) {
            return Err(ProtocolError::InvalidField {
                field: "version",
                value: header.version,
            });
        }

        let start = buf.len();
        buf.put_u8((header.version << VERSION_SHIFT) | (u8::from(header.sdu_type) & SDU_MASK));
        buf.put_u16(header.service_area);
        buf.put_u16(header.service);
        buf.put_u16(header.operation);
        buf.put_u8(header.area_version);

        let mut packed = ((header.qos as u8) & QOS_MASK) << QOS_SHIFT;
        packed |= (header.session as u8) & SESSION_MASK;
        if header.is_error {
            packed |= ERROR_BIT;
        }
        buf.put_u8(packed);

        buf.put_u64(header.transaction_id);
        buf.put_u8(presence_flags(header));
        buf.put_u8(header.encoding_id);
        buf.put_u32(0);

        if let Some(from) = &header.from {
            put_string(buf, "from", from.as_str())?;
        }
        if let Some(to) = &header.to {
            put_string(buf, "to", to.as_str())?;
        }
        if let Some(priority) = header.priority {
            buf.put_u32(priority);
        }
        if let Some(timestamp) = header.timestamp {
            buf.put_u64(timestamp);
        }
        if let Some(zone) = &header.network_zone {
            put_string(buf, "network zone", zone)?;
        }
        if let Some(name) = &header.session_name {
            put_string(buf, "session name", name)?;
        }
        if let Some(domain) = &header.domain {
            let count = u16::try_from(domain.len()).map_err(|_| ProtocolError::FieldTooLarge {
                field: "domain",
                size: domain.len(),
                limit: u16::MAX as usize,
            })?;
            buf.put_u16(count);
            for part in domain {
                put_string(buf, "domain", part)?;
            }
        }
        if let Some(auth) = &header.authentication_id {
            put_blob(buf, "authentication id", auth)?;
        }

        Ok(start)
    }

    /// Write the number of bytes following the fixed prefix into the slot
    /// of the header starting at `header_start`.
    pub fn patch_variable_length(buf: &mut BytesMut, header_start: usize) -> ProtocolResult<()> {
        let total = buf.len().saturating_sub(header_start);
        if total < FIXED_HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                FIXED_HEADER_SIZE,
                total,
                "variable length patch",
            ));
        }

        let variable = total - FIXED_HEADER_SIZE;
        let variable = u32::try_from(variable).map_err(|_| ProtocolError::FieldTooLarge {
            field: "frame",
            size: variable,
            limit: u32::MAX as usize,
        })?;

        let slot = header_start + VARIABLE_LENGTH_OFFSET;
        buf[slot..slot + 4].copy_from_slice(&variable.to_be_bytes());
        Ok(())
    }

    /// Value of the variable-length slot
    pub fn variable_length(data: &[u8]) -> ProtocolResult<usize> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(ProtocolError::message_too_small(
                FIXED_HEADER_SIZE,
                data.len(),
                "fixed header",
            ));
        }
        let mut slot = [0u8; 4];
        slot.copy_from_slice(&data[VARIABLE_LENGTH_OFFSET..VARIABLE_LENGTH_OFFSET + 4]);
        Ok(u32::from_be_bytes(slot) as usize)
    }

    /// Decode a header from the start of `data`.
    ///
    /// Returns the header and the number of bytes it occupied. Optional
    /// fields are never read past the region the variable-length slot
    /// declares.
    pub fn decode(data: &[u8]) -> ProtocolResult<(MessageHeader, usize)> {
        let declared = Self::variable_length(data)?;
        let end = FIXED_HEADER_SIZE.saturating_add(declared);
        if end > data.len() {
            return Err(ProtocolError::message_too_small(
                end,
                data.len(),
                "declared variable part",
            ));
        }

        let mut reader = WireReader::new(&data[..end]);

        let first = reader.u8("version/sdu")?;
        let version = first >> VERSION_SHIFT;
        if version != types::PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion {
                version,
                supported: types::PROTOCOL_VERSION,
            });
        }
        let sdu_type = SduType::from_code(first & SDU_MASK)?;

        let service_area = reader.u16("service area")?;
        let service = reader.u16("service")?;
        let operation = reader.u16("operation")?;
        let area_version = reader.u8("area version")?;

        let packed = reader.u8("error/qos/session")?;
        let is_error = packed & ERROR_BIT != 0;
        let qos = QosLevel::try_from((packed >> QOS_SHIFT) & QOS_MASK)?;
        let session = SessionType::try_from(packed & SESSION_MASK)?;

        let transaction_id = reader.u64("transaction id")?;
        let presence = reader.u8("presence flags")?;
        let encoding_id = reader.u8("encoding id")?;
        reader.u32("variable length")?;

        let mut header = MessageHeader::new(sdu_type)
            .with_service(service_area, service, operation, area_version)
            .with_transaction_id(transaction_id)
            .with_encoding(encoding_id);
        header.version = version;
        header.is_error = is_error;
        header.qos = qos;
        header.session = session;

        if presence & flags::FROM != 0 {
            header.from = Some(Uri::from(reader.string("from")?));
        }
        if presence & flags::TO != 0 {
            header.to = Some(Uri::from(reader.string("to")?));
        }
        if presence & flags::PRIORITY != 0 {
            header.priority = Some(reader.u32("priority")?);
        }
        if presence & flags::TIMESTAMP != 0 {
            header.timestamp = Some(reader.u64("timestamp")?);
        }
        if presence & flags::NETWORK_ZONE != 0 {
            header.network_zone = Some(reader.string("network zone")?);
        }
        if presence & flags::SESSION_NAME != 0 {
            header.session_name = Some(reader.string("session name")?);
        }
        if presence & flags::DOMAIN != 0 {
            let count = reader.u16("domain count")?;
            let mut domain = Vec::with_capacity(count as usize);
            for _ in 0..count {
                domain.push(reader.string("domain")?);
            }
            header.domain = Some(domain);
        }
        if presence & flags::AUTHENTICATION_ID != 0 {
            let auth = reader.blob("authentication id")?;
            header.authentication_id = Some(Bytes::copy_from_slice(auth));
        }

        Ok((header, reader.position()))
    }
}

fn presence_flags(header: &MessageHeader) -> u8 {
    let mut presence = 0;
    if header.from.is_some() {
        presence |= flags::FROM;
    }
    if header.to.is_some() {
        presence |= flags::TO;
    }
    if header.priority.is_some() {
        presence |= flags::PRIORITY;
    }
    if header.timestamp.is_some() {
        presence |= flags::TIMESTAMP;
    }
    if header.network_zone.is_some() {
        presence |= flags::NETWORK_ZONE;
    }
    if header.session_name.is_some() {
        presence |= flags::SESSION_NAME;
    }
    if header.domain.is_some() {
        presence |= flags::DOMAIN;
    }
    if header.authentication_id.is_some() {
        presence |= flags::AUTHENTICATION_ID;
    }
    presence
}

fn put_string(buf: &mut BytesMut, field: &'static str, value: &str) -> ProtocolResult<()> {
    put_blob(buf, field, value.as_bytes())
}

fn put_blob(buf: &mut BytesMut, field: &'static str, value: &[u8]) -> ProtocolResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::FieldTooLarge {
        field,
        size: value.len(),
        limit: u16::MAX as usize,
    })?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

/// Bounds-checked big-endian cursor over a byte slice
struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize, context: &'static str) -> ProtocolResult<&'a [u8]> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(ProtocolError::message_too_small(end, self.data.len(), context));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, context: &'static str) -> ProtocolResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, context)?);
        Ok(out)
    }

    fn u8(&mut self, context: &'static str) -> ProtocolResult<u8> {
        Ok(self.take(1, context)?[0])
    }

    fn u16(&mut self, context: &'static str) -> ProtocolResult<u16> {
        self.array(context).map(u16::from_be_bytes)
    }

    fn u32(&mut self, context: &'static str) -> ProtocolResult<u32> {
        self.array(context).map(u32::from_be_bytes)
    }

    fn u64(&mut self, context: &'static str) -> ProtocolResult<u64> {
        self.array(context).map(u64::from_be_bytes)
    }

    fn blob(&mut self, field: &'static str) -> ProtocolResult<&'a [u8]> {
        let len = self.u16(field)? as usize;
        self.take(len, field)
    }

    fn string(&mut self, field: &'static str) -> ProtocolResult<String> {
        let raw = self.blob(field)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8 { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageHeader {
        MessageHeader::new(SduType::Request)
            .with_service(2, 1, 3, 1)
            .with_transaction_id(0x0102_0304_0506_0708)
            .with_addresses(
                Uri::from("maltcp://127.0.0.1:1024/consumer"),
                Uri::from("maltcp://127.0.0.1:2048/provider"),
            )
            .with_timestamp(1_700_000_000_000)
    }

    #[test]
    fn test_fixed_prefix_layout() {
        let header = sample().with_qos(QosLevel::Queued);
        let bytes = HeaderCodec::encode(&header).unwrap();

        assert_eq!(bytes[0], (1 << 5) | 3);
        assert_eq!(&bytes[1..3], &[0, 2]);
        assert_eq!(&bytes[5..7], &[0, 3]);
        assert_eq!(bytes[8], 2 << 4);
        assert_eq!(&bytes[9..17], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(bytes[17], flags::FROM | flags::TO | flags::TIMESTAMP);
        assert_eq!(
            HeaderCodec::variable_length(&bytes).unwrap(),
            bytes.len() - FIXED_HEADER_SIZE
        );
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let header = sample().with_domain(vec!["esa".into(), "mission".into()]);
        let bytes = HeaderCodec::encode(&header).unwrap();

        let (decoded, consumed) = HeaderCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_minimal_header_is_fixed_size() {
        let bytes = HeaderCodec::encode(&MessageHeader::new(SduType::Send)).unwrap();
        assert_eq!(bytes.len(), FIXED_HEADER_SIZE);
        assert_eq!(bytes[17], 0);
    }

    #[test]
    fn test_unknown_sdu_type_rejected() {
        let mut bytes = BytesMut::from(&HeaderCodec::encode(&sample()).unwrap()[..]);
        bytes[0] = (1 << 5) | 22;
        assert_eq!(
            HeaderCodec::decode(&bytes),
            Err(ProtocolError::UnknownSduType { sdu_type: 22 })
        );
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut bytes = BytesMut::from(&HeaderCodec::encode(&sample()).unwrap()[..]);
        bytes[0] = (2 << 5) | 3;
        assert!(matches!(
            HeaderCodec::decode(&bytes),
            Err(ProtocolError::UnsupportedVersion { version: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = HeaderCodec::encode(&sample()).unwrap();
        assert!(matches!(
            HeaderCodec::decode(&bytes[..10]),
            Err(ProtocolError::MessageTooSmall { .. })
        ));
        assert!(matches!(
            HeaderCodec::decode(&bytes[..bytes.len() - 1]),
            Err(ProtocolError::MessageTooSmall { .. })
        ));
    }

    #[test]
    fn test_optional_field_cannot_overrun_declared_region() {
        let mut bytes = BytesMut::from(&HeaderCodec::encode(&sample()).unwrap()[..]);
        // Shrink the slot so the `to` string ends outside the declared region
        bytes[VARIABLE_LENGTH_OFFSET..VARIABLE_LENGTH_OFFSET + 4]
            .copy_from_slice(&10u32.to_be_bytes());
        assert!(matches!(
            HeaderCodec::decode(&bytes),
            Err(ProtocolError::MessageTooSmall { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let header = MessageHeader::new(SduType::Send).with_network_zone("zone");
        let mut bytes = BytesMut::from(&HeaderCodec::encode(&header).unwrap()[..]);
        let last = bytes.len() - 1;
        bytes[last] = 0xFF;
        assert_eq!(
            HeaderCodec::decode(&bytes),
            Err(ProtocolError::InvalidUtf8 {
                field: "network zone"
            })
        );
    }

    #[test]
    fn test_oversized_string_rejected() {
        let header =
            MessageHeader::new(SduType::Send).with_network_zone("z".repeat(u16::MAX as usize + 1));
        assert!(matches!(
            HeaderCodec::encode(&header),
            Err(ProtocolError::FieldTooLarge {
                field: "network zone",
                ..
            })
        ));
    }
}
