//! Immutable description of one socket-level occurrence.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use netkit_wire::{Packet, PacketError};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle identifying one live socket of a client.
///
/// Assigned fresh each time a socket is created; [`ConnectionId::INVALID`]
/// stands for "no socket".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// No socket
    pub const INVALID: ConnectionId = ConnectionId(0);

    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether this refers to a socket
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "conn-{}", self.0)
        } else {
            f.write_str("conn-invalid")
        }
    }
}

/// Outcome classifier carried on every event
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StateCode {
    /// Operation succeeded
    Success = 0,
    /// Operation failed
    Failure = 1,
    /// Operation succeeded with a caveat
    Warning = 2,
    /// Not classified
    #[default]
    Unknown = 3,
}

impl StateCode {
    /// Numeric code
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for StateCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Failure),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Unknown),
            other => Err(other),
        }
    }
}

/// Snapshot of one socket event handed to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct EventArgs {
    connection: ConnectionId,
    message: String,
    state: StateCode,
    cause: i32,
    packet_json: String,
    data: Bytes,
    remote: Option<SocketAddr>,
    timestamp: DateTime<Utc>,
}

impl EventArgs {
    /// Create an event with state [`StateCode::Unknown`] and no cause
    pub fn new(connection: ConnectionId, message: impl Into<String>) -> Self {
        Self {
            connection,
            message: message.into(),
            state: StateCode::default(),
            cause: 0,
            packet_json: String::new(),
            data: Bytes::new(),
            remote: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the outcome classifier
    pub fn with_state(mut self, state: StateCode) -> Self {
        self.state = state;
        self
    }

    /// Set the transport/OS error code
    pub fn with_cause(mut self, cause: i32) -> Self {
        self.cause = cause;
        self
    }

    /// Embed a packet document
    pub fn with_packet_json(mut self, json: impl Into<String>) -> Self {
        self.packet_json = json.into();
        self
    }

    /// Attach raw bytes
    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    /// Record the remote endpoint
    pub fn with_remote(mut self, remote: Option<SocketAddr>) -> Self {
        self.remote = remote;
        self
    }

    /// Socket the event concerns
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Human readable description (for `DataReceived`, the received text)
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Outcome classifier
    pub fn state(&self) -> StateCode {
        self.state
    }

    /// Transport/OS error code, 0 when none
    pub fn cause(&self) -> i32 {
        self.cause
    }

    /// Embedded packet document, empty when none
    pub fn packet_json(&self) -> &str {
        &self.packet_json
    }

    /// Exact received bytes (empty unless this is a `DataReceived` event)
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Remote endpoint, when known
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// When the event was created
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Materialize the embedded packet document without integrity checking
    pub fn packet(&self) -> Result<Option<Packet>, PacketError> {
        if self.packet_json.is_empty() {
            return Ok(None);
        }
        Packet::from_json(&self.packet_json).map(Some)
    }

    /// Verify and decode the received bytes as a packet sealed with `key`
    pub fn open(&self, key: &str) -> Result<Packet, PacketError> {
        Packet::deserialize(&self.data, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = EventArgs::new(ConnectionId::INVALID, "nothing yet");

        assert_eq!(args.state(), StateCode::Unknown);
        assert_eq!(args.state().code(), 3);
        assert_eq!(args.cause(), 0);
        assert_eq!(args.packet_json(), "");
        assert!(args.data().is_empty());
        assert!(args.remote().is_none());
        assert!(args.packet().unwrap().is_none());
    }

    #[test]
    fn test_state_code_conversion() {
        for code in 0..=3u8 {
            assert_eq!(StateCode::try_from(code).unwrap().code(), code);
        }
        assert_eq!(StateCode::try_from(4), Err(4));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();

        assert!(a.is_valid());
        assert_ne!(a, b);
        assert!(!ConnectionId::INVALID.is_valid());
        assert_eq!(ConnectionId::INVALID.to_string(), "conn-invalid");
    }

    #[test]
    fn test_embedded_packet() {
        let mut packet = Packet::new(7).with_request_id(3);
        packet.set_body("cmd", "ping").unwrap();

        let args = EventArgs::new(ConnectionId::next(), "")
            .with_state(StateCode::Success)
            .with_packet_json(packet.to_json());

        assert_eq!(args.packet().unwrap(), Some(packet));
    }

    #[test]
    fn test_open_received_bytes() {
        let mut packet = Packet::new(2).with_request_id(9);
        packet.set_body("ok", true).unwrap();
        let sealed = packet.serialize("key");

        let args = EventArgs::new(ConnectionId::next(), String::from_utf8_lossy(&sealed))
            .with_data(sealed.clone());

        assert_eq!(args.open("key").unwrap(), packet);
        assert!(matches!(args.open("bad"), Err(PacketError::TamperedPayload)));
    }
}
