//! Topic names published by the socket client.

use std::fmt;

/// Socket connected
pub const CONNECTED: &str = "Connected";
/// Socket creation or connect failed
pub const CONNECTION_FAILED: &str = "ConnectionFailed";
/// A packet was written
pub const DATA_SENT: &str = "DataSent";
/// A packet could not be written
pub const DATA_SEND_FAILED: &str = "DataSendFailed";
/// Bytes (or a frame) arrived
pub const DATA_RECEIVED: &str = "DataReceived";
/// Peer closed the connection
pub const CONNECTION_CLOSED: &str = "ConnectionClosed";
/// Receive loop hit a fatal transport error
pub const NETWORK_ERROR: &str = "NetworkError";

/// Typed form of the client topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// See [`CONNECTED`]
    Connected,
    /// See [`CONNECTION_FAILED`]
    ConnectionFailed,
    /// See [`DATA_SENT`]
    DataSent,
    /// See [`DATA_SEND_FAILED`]
    DataSendFailed,
    /// See [`DATA_RECEIVED`]
    DataReceived,
    /// See [`CONNECTION_CLOSED`]
    ConnectionClosed,
    /// See [`NETWORK_ERROR`]
    NetworkError,
}

impl Topic {
    /// Every client topic
    pub const ALL: [Topic; 7] = [
        Topic::Connected,
        Topic::ConnectionFailed,
        Topic::DataSent,
        Topic::DataSendFailed,
        Topic::DataReceived,
        Topic::ConnectionClosed,
        Topic::NetworkError,
    ];

    /// Topic name used on the bus
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Connected => CONNECTED,
            Topic::ConnectionFailed => CONNECTION_FAILED,
            Topic::DataSent => DATA_SENT,
            Topic::DataSendFailed => DATA_SEND_FAILED,
            Topic::DataReceived => DATA_RECEIVED,
            Topic::ConnectionClosed => CONNECTION_CLOSED,
            Topic::NetworkError => NETWORK_ERROR,
        }
    }

    /// Whether the client is finished after this event
    pub fn is_terminal(self) -> bool {
        matches!(self, Topic::ConnectionClosed | Topic::NetworkError)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
