//! Wire protocol error types.

use thiserror::Error;

/// Packet encoding, decoding and body access errors
#[derive(Error, Debug)]
pub enum PacketError {
    /// Deserialize was handed zero bytes
    #[error("payload is empty")]
    EmptyPayload,

    /// Document carries no digest member
    #[error("digest not found in payload")]
    MissingDigest,

    /// Recomputed digest differs from the embedded one
    #[error("payload has been tampered with")]
    TamperedPayload,

    /// Body lookup for a key that is not present
    #[error("key not found in body: {0}")]
    KeyNotFound(String),

    /// A required member is missing or has the wrong type
    #[error("malformed packet field: {field}")]
    Malformed {
        /// Wire name of the offending member
        field: &'static str,
    },

    /// Input is not valid JSON
    #[error("invalid packet json: {0}")]
    Json(#[source] serde_json::Error),

    /// A body value could not be converted to or from JSON
    #[error("body value encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Framing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Frame length exceeds the configured maximum
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
}
