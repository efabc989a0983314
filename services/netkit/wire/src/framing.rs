//! Length-prefix framing for stream transports.
//!
//! A TCP read returns whatever bytes happen to be available, so one read may
//! hold part of a packet or several packets. This codec restores message
//! boundaries:
//!
//! ```text
//! +----------------------+----------------------------+
//! | u32 frame_len (BE)   | length of bytes that follow|
//! +----------------------+----------------------------+
//! | payload              | frame_len bytes            |
//! +----------------------+----------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Maximum frame payload size (16 MiB default)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encoder/decoder for `u32`-length-prefixed frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPrefixCodec {
    max_frame_size: usize,
}

impl LengthPrefixCodec {
    /// Create a codec with the default frame size limit
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame size limit (capped at `u32::MAX`)
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(u32::MAX as usize),
        }
    }

    /// Configured frame size limit
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Prefix `payload` with its length
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes, FrameError> {
        if payload.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge(payload.len()));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Take one complete frame payload off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the frame is
    /// incomplete. Call repeatedly to drain several buffered frames.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let frame_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if frame_len > self.max_frame_size {
            return Err(FrameError::FrameTooLarge(frame_len));
        }

        if buf.len() < LENGTH_PREFIX_SIZE + frame_len {
            // Reserve the remainder so the next read lands in one allocation
            buf.reserve(LENGTH_PREFIX_SIZE + frame_len - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(buf.split_to(frame_len).freeze()))
    }
}

impl Default for LengthPrefixCodec {
    fn default() -> Self {
        Self::new()
    }
}
