//! Packet value type and its JSON wire representation.
//!
//! A packet is a header code, an ordered key/value body and a caller-assigned
//! request identifier. On the wire it is a single UTF-8 JSON document:
//!
//! ```text
//! { "h": <u32>, "b": { ... }, "r_id": <u32>, "hash": "<64 lowercase hex>" }
//! ```
//!
//! The `hash` member is the keyed digest from [`crate::digest`]. It is
//! recomputed on every [`Packet::serialize`] and never trusted on input.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::digest::{generate_digest, verify_digest};
use crate::error::PacketError;

/// Wire name of the header member
pub const HEADER_FIELD: &str = "h";
/// Wire name of the body member
pub const BODY_FIELD: &str = "b";
/// Wire name of the request identifier member
pub const REQUEST_ID_FIELD: &str = "r_id";
/// Wire name of the digest member
pub const DIGEST_FIELD: &str = "hash";

/// Application message exchanged over a socket client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    header: u32,
    body: Map<String, Value>,
    request_id: u32,
    digest: Option<String>,
}

impl Packet {
    /// Create an empty packet with the given header
    pub fn new(header: u32) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    /// Set the request identifier
    pub fn with_request_id(mut self, request_id: u32) -> Self {
        self.request_id = request_id;
        self
    }

    /// Header code
    pub fn header(&self) -> u32 {
        self.header
    }

    /// Replace the header code
    pub fn set_header(&mut self, header: u32) -> &mut Self {
        self.header = header;
        self
    }

    /// Request identifier
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    /// Replace the request identifier
    pub fn set_request_id(&mut self, request_id: u32) -> &mut Self {
        self.request_id = request_id;
        self
    }

    /// Digest carried by this value, if any.
    ///
    /// Only the transient copy built inside [`Packet::serialize`] has one.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Insert or replace a body entry.
    ///
    /// A new key is appended; replacing an existing key keeps its position.
    pub fn set_body<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<&mut Self, PacketError> {
        let value = serde_json::to_value(value).map_err(PacketError::Encode)?;
        self.body.insert(key.into(), value);
        Ok(self)
    }

    /// Look up a body entry
    pub fn get_body(&self, key: &str) -> Result<&Value, PacketError> {
        self.body
            .get(key)
            .ok_or_else(|| PacketError::KeyNotFound(key.to_string()))
    }

    /// Look up a body entry and convert it to `T`
    pub fn get_body_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, PacketError> {
        let value = self.get_body(key)?;
        serde_json::from_value(value.clone()).map_err(PacketError::Encode)
    }

    /// The whole body document
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// The whole body rendered as compact JSON
    pub fn body_json(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }

    /// Build the JSON document: `h`, `b`, `r_id` and, when set, `hash`
    pub fn to_value(&self) -> Value {
        let mut doc = Map::with_capacity(4);
        doc.insert(HEADER_FIELD.to_string(), Value::from(self.header));
        doc.insert(BODY_FIELD.to_string(), Value::Object(self.body.clone()));
        doc.insert(REQUEST_ID_FIELD.to_string(), Value::from(self.request_id));
        if let Some(ref digest) = self.digest {
            doc.insert(DIGEST_FIELD.to_string(), Value::String(digest.clone()));
        }
        Value::Object(doc)
    }

    /// Compact JSON text of [`Packet::to_value`]
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Parse a packet document without integrity checking.
    ///
    /// Any `hash` member is ignored and not retained.
    pub fn from_json(json: &str) -> Result<Self, PacketError> {
        let value: Value = serde_json::from_str(json).map_err(PacketError::Json)?;
        Self::from_value(value)
    }

    /// Build a packet from an already parsed document.
    pub fn from_value(value: Value) -> Result<Self, PacketError> {
        let Value::Object(mut doc) = value else {
            return Err(PacketError::Malformed { field: "document" });
        };

        let header = take_u32(&doc, HEADER_FIELD)?;
        let request_id = take_u32(&doc, REQUEST_ID_FIELD)?;
        let body = match doc.shift_remove(BODY_FIELD) {
            Some(Value::Object(body)) => body,
            _ => return Err(PacketError::Malformed { field: BODY_FIELD }),
        };

        Ok(Self {
            header,
            body,
            request_id,
            digest: None,
        })
    }

    /// Encode for transmission: attach a fresh digest computed with `key` and
    /// return the UTF-8 JSON bytes.
    pub fn serialize(&self, key: &str) -> Bytes {
        let mut sealed = self.clone();
        sealed.digest = None;
        let digest = generate_digest(key, &sealed.to_value());
        sealed.digest = Some(digest);
        Bytes::from(sealed.to_json())
    }

    /// Decode received bytes, verifying the embedded digest with `key`.
    ///
    /// Input that names a digest member but no longer parses is reported as
    /// [`PacketError::TamperedPayload`], the same as a digest mismatch.
    pub fn deserialize(data: &[u8], key: &str) -> Result<Self, PacketError> {
        if data.is_empty() {
            return Err(PacketError::EmptyPayload);
        }
        if !contains(data, DIGEST_MARKER) {
            return Err(PacketError::MissingDigest);
        }

        let value: Value = match serde_json::from_slice(data) {
            Ok(value) => value,
            Err(e) => {
                debug!("Undecodable {} byte payload: {}", data.len(), e);
                return Err(PacketError::TamperedPayload);
            }
        };
        let claimed = match value.get(DIGEST_FIELD) {
            None => return Err(PacketError::MissingDigest),
            Some(Value::String(digest)) => digest.clone(),
            Some(_) => return Err(PacketError::Malformed { field: DIGEST_FIELD }),
        };

        if !verify_digest(key, &value, &claimed) {
            debug!("Digest mismatch on {} byte payload", data.len());
            return Err(PacketError::TamperedPayload);
        }

        Self::from_value(value)
    }
}

/// Quoted digest member name as it appears in raw wire text
const DIGEST_MARKER: &[u8] = b"\"hash\"";

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn take_u32(doc: &Map<String, Value>, field: &'static str) -> Result<u32, PacketError> {
    doc.get(field)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(PacketError::Malformed { field })
}
