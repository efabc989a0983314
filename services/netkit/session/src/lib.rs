//! Threaded TCP/UDP socket client for netkit.
//!
//! This crate connects to a remote endpoint, writes integrity-sealed packets,
//! and runs a background receive loop that reports everything it observes as
//! events on a [`netkit_events::EventBus`].
//!
//! ## Features
//!
//! - **TCP and UDP**: one client type over a stream or a connected datagram socket
//! - **Receive loop**: dedicated thread per client with bounded transient-error retry
//! - **Framing**: raw reads or 4-byte length-prefixed messages
//! - **Prompt stop**: `stop()` shuts the socket down and joins the receive thread
//!
//! ## Example
//!
//! ```rust,no_run
//! use netkit_events::topics;
//! use netkit_session::{ClientConfig, Endpoint, SocketClient};
//! use netkit_wire::Packet;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SocketClient::with_config("127.0.0.1:9000".parse()?, ClientConfig::default());
//!
//! client.add_event_listener(topics::DATA_RECEIVED, |args| {
//!     println!("{} received {}", args.connection(), args.message());
//! });
//! client.add_event_listener(topics::CONNECTION_FAILED, |args| {
//!     eprintln!("connect failed ({}): {}", args.cause(), args.message());
//! });
//!
//! client.connect();
//!
//! let mut packet = Packet::new(1).with_request_id(7);
//! packet.set_body("cmd", "status")?;
//! client.send(&packet, "shared-secret");
//!
//! client.stop();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod transport;

// Re-export main types
pub use client::{ClientState, ClientStats, SocketClient, CONNECTED_MESSAGE, PEER_CLOSED_MESSAGE};
pub use config::{
    ClientConfig, Endpoint, EndpointParseError, Framing, DEFAULT_DATAGRAM_POLL_INTERVAL,
    DEFAULT_RECV_BUFFER_SIZE,
};
pub use error::ClientError;
pub use retry::{classify, ErrorClass, RetryDecision, RetryPolicy, TransientErrorTracker};
pub use transport::{Transport, TransportKind};
