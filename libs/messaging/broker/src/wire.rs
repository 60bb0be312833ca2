//! Broker message bodies
//!
//! Broker operations travel as `Elements`-encoded bodies. Each element is
//! one of the records below, all integers big-endian:
//!
//! ```text
//! key       u16 part count, per part: u8 present, [u16 len, UTF-8]
//! pattern   u8 on_change_only, key
//! update    u8 is_change, key, u32 value len, value
//! id list   u16 count, per id: u16 len, UTF-8
//!
//! REGISTER    [subscription id (UTF-8), pattern, pattern, ...]
//! DEREGISTER  [subscription id (UTF-8), ...]        empty: every subscription
//! PUBLISH     [update, update, ...]
//! NOTIFY      [id list, update, update, ...]
//! ```
//!
//! Subscription ids are capped at `u16::MAX` bytes since NOTIFY carries
//! them with a u16 length. Encoding a field past its length prefix fails.

use crate::engine::{SubscriptionId, UpdateEntry};
use crate::error::{BrokerError, BrokerResult};
use crate::pattern::{EntityKey, KeyPattern};
use bytes::{BufMut, Bytes, BytesMut};
use types::SduType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBody {
    pub subscription: SubscriptionId,
    pub patterns: Vec<KeyPattern>,
    /// Parallel to `patterns`
    pub on_change_only: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterBody {
    pub subscriptions: Vec<SubscriptionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishBody {
    pub updates: Vec<UpdateEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyBody {
    pub subscriptions: Vec<SubscriptionId>,
    pub updates: Vec<UpdateEntry>,
}

impl RegisterBody {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            patterns: Vec::new(),
            on_change_only: Vec::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: KeyPattern, on_change_only: bool) -> Self {
        self.patterns.push(pattern);
        self.on_change_only.push(on_change_only);
        self
    }

    pub fn to_elements(&self) -> BrokerResult<Vec<Bytes>> {
        const SDU: SduType = SduType::Register;
        if self.patterns.len() != self.on_change_only.len() {
            return Err(BrokerError::PatternFlagMismatch {
                patterns: self.patterns.len(),
                flags: self.on_change_only.len(),
            });
        }
        check_id(SDU, &self.subscription)?;

        let mut elements = vec![Bytes::from(self.subscription.clone())];
        for (pattern, &change_only) in self.patterns.iter().zip(&self.on_change_only) {
            let mut buf = BytesMut::new();
            buf.put_u8(change_only as u8);
            put_parts(&mut buf, SDU, pattern.parts())?;
            elements.push(buf.freeze());
        }
        Ok(elements)
    }

    pub fn from_elements(elements: &[Bytes]) -> BrokerResult<Self> {
        const SDU: SduType = SduType::Register;
        let (id, patterns) = elements
            .split_first()
            .ok_or_else(|| BrokerError::malformed(SDU, "missing subscription id"))?;

        let id = utf8(SDU, id, "subscription id")?;
        check_id(SDU, &id)?;
        let mut body = Self::new(id);
        for element in patterns {
            let mut reader = ElementReader::new(SDU, element);
            let change_only = reader.flag()?;
            let pattern = KeyPattern::new(reader.parts()?);
            reader.finish()?;
            body = body.with_pattern(pattern, change_only);
        }
        Ok(body)
    }
}

impl DeregisterBody {
    pub fn to_elements(&self) -> Vec<Bytes> {
        self.subscriptions
            .iter()
            .map(|id| Bytes::from(id.clone()))
            .collect()
    }

    pub fn from_elements(elements: &[Bytes]) -> BrokerResult<Self> {
        let subscriptions = elements
            .iter()
            .map(|e| utf8(SduType::Deregister, e, "subscription id"))
            .collect::<BrokerResult<_>>()?;
        Ok(Self { subscriptions })
    }
}

impl PublishBody {
    pub fn to_elements(&self) -> BrokerResult<Vec<Bytes>> {
        self.updates
            .iter()
            .map(|update| encode_update(SduType::Publish, update))
            .collect()
    }

    pub fn from_elements(elements: &[Bytes]) -> BrokerResult<Self> {
        let updates = elements
            .iter()
            .map(|e| decode_update(SduType::Publish, e))
            .collect::<BrokerResult<_>>()?;
        Ok(Self { updates })
    }
}

impl NotifyBody {
    pub fn to_elements(&self) -> BrokerResult<Vec<Bytes>> {
        const SDU: SduType = SduType::Notify;
        let mut ids = BytesMut::new();
        ids.put_u16(len_u16(SDU, "subscription list", self.subscriptions.len())?);
        for id in &self.subscriptions {
            put_str(&mut ids, SDU, "subscription id", id)?;
        }

        let mut elements = Vec::with_capacity(self.updates.len() + 1);
        elements.push(ids.freeze());
        for update in &self.updates {
            elements.push(encode_update(SDU, update)?);
        }
        Ok(elements)
    }

    pub fn from_elements(elements: &[Bytes]) -> BrokerResult<Self> {
        const SDU: SduType = SduType::Notify;
        let (ids, updates) = elements
            .split_first()
            .ok_or_else(|| BrokerError::malformed(SDU, "missing subscription list"))?;

        let mut reader = ElementReader::new(SDU, ids);
        let count = reader.u16()?;
        let subscriptions = (0..count)
            .map(|_| reader.string("subscription id"))
            .collect::<BrokerResult<_>>()?;
        reader.finish()?;

        let updates = updates
            .iter()
            .map(|e| decode_update(SDU, e))
            .collect::<BrokerResult<_>>()?;
        Ok(Self {
            subscriptions,
            updates,
        })
    }
}

fn encode_update(sdu: SduType, update: &UpdateEntry) -> BrokerResult<Bytes> {
    let value_len = u32::try_from(update.value.len()).map_err(|_| {
        BrokerError::malformed(
            sdu,
            format!("update value of {} bytes is too large", update.value.len()),
        )
    })?;

    let mut buf = BytesMut::with_capacity(16 + update.value.len());
    buf.put_u8(update.is_change as u8);
    put_parts(&mut buf, sdu, update.key.parts())?;
    buf.put_u32(value_len);
    buf.put_slice(&update.value);
    Ok(buf.freeze())
}

fn decode_update(sdu: SduType, element: &Bytes) -> BrokerResult<UpdateEntry> {
    let mut reader = ElementReader::new(sdu, element);
    let is_change = reader.flag()?;
    let key = EntityKey::new(reader.parts()?);
    let len = reader.u32()? as usize;
    let value = reader.take(len, "update value")?;
    reader.finish()?;
    Ok(UpdateEntry {
        key,
        is_change,
        value: element.slice_ref(value),
    })
}

fn put_parts(buf: &mut BytesMut, sdu: SduType, parts: &[Option<String>]) -> BrokerResult<()> {
    buf.put_u16(len_u16(sdu, "key", parts.len())?);
    for part in parts {
        match part {
            Some(part) => {
                buf.put_u8(1);
                put_str(buf, sdu, "key part", part)?;
            }
            None => buf.put_u8(0),
        }
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, sdu: SduType, what: &str, value: &str) -> BrokerResult<()> {
    buf.put_u16(len_u16(sdu, what, value.len())?);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn len_u16(sdu: SduType, what: &str, len: usize) -> BrokerResult<u16> {
    u16::try_from(len).map_err(|_| {
        BrokerError::malformed(sdu, format!("{what} length {len} exceeds {}", u16::MAX))
    })
}

fn check_id(sdu: SduType, id: &str) -> BrokerResult<()> {
    len_u16(sdu, "subscription id", id.len()).map(|_| ())
}

fn utf8(sdu: SduType, bytes: &[u8], what: &str) -> BrokerResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| BrokerError::malformed(sdu, format!("{what} is not UTF-8")))
}

/// Bounds-checked cursor over one body element
struct ElementReader<'a> {
    sdu: SduType,
    buf: &'a [u8],
}

impl<'a> ElementReader<'a> {
    fn new(sdu: SduType, buf: &'a [u8]) -> Self {
        Self { sdu, buf }
    }

    fn take(&mut self, len: usize, what: &str) -> BrokerResult<&'a [u8]> {
        if self.buf.len() < len {
            return Err(BrokerError::malformed(
                self.sdu,
                format!("{what} needs {len} bytes, {} left", self.buf.len()),
            ));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> BrokerResult<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    fn flag(&mut self) -> BrokerResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BrokerError::malformed(
                self.sdu,
                format!("flag byte {other} is not 0 or 1"),
            )),
        }
    }

    fn u16(&mut self) -> BrokerResult<u16> {
        let bytes = self.take(2, "u16")?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> BrokerResult<u32> {
        let bytes = self.take(4, "u32")?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, what: &str) -> BrokerResult<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len, what)?;
        utf8(self.sdu, bytes, what)
    }

    fn parts(&mut self) -> BrokerResult<Vec<Option<String>>> {
        let count = self.u16()?;
        (0..count)
            .map(|_| {
                if self.flag()? {
                    self.string("key part").map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect()
    }

    fn finish(self) -> BrokerResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::malformed(
                self.sdu,
                format!("{} trailing bytes", self.buf.len()),
            ))
        }
    }
}
