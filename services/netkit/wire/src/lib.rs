//! Packet format, keyed integrity digest and framing for netkit.
//!
//! This crate provides the message layer used by the netkit socket client:
//! a tagged JSON packet, the keyed SHA-256 digest that makes tampering
//! evident, and an optional length-prefix codec for stream transports.
//!
//! ## Wire Format
//!
//! ```text
//! { "h": <u32 header>, "b": <body document>, "r_id": <u32 request id>, "hash": "<64 hex>" }
//! ```
//!
//! The digest is `SHA256(json_without_hash || key)`. It provides tamper
//! evidence only: the body travels in plaintext.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod digest;
pub mod error;
pub mod framing;
pub mod packet;

// Re-export main types
pub use digest::{generate_digest, verify_digest, DIGEST_HEX_LEN};
pub use error::{FrameError, PacketError};
pub use framing::{LengthPrefixCodec, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
pub use packet::{Packet, BODY_FIELD, DIGEST_FIELD, HEADER_FIELD, REQUEST_ID_FIELD};
