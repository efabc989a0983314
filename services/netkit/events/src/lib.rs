//! Socket event arguments and the publish/subscribe bus for netkit.
//!
//! The socket client never returns transport failures to its caller. It
//! describes each occurrence as an [`EventArgs`] and publishes it on an
//! [`EventBus`] under one of the names in [`topics`].
//!
//! ## Example
//!
//! ```rust
//! use netkit_events::{topics, ConnectionId, EventArgs, EventBus, StateCode};
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe(topics::CONNECTED, |args| {
//!     println!("{} connected: {}", args.connection(), args.message());
//! });
//!
//! let args = EventArgs::new(ConnectionId::next(), "Connected to server")
//!     .with_state(StateCode::Success);
//! bus.publish(topics::CONNECTED, &args);
//!
//! assert!(bus.unsubscribe(id));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod bus;
pub mod topics;

// Re-export main types
pub use args::{ConnectionId, EventArgs, StateCode};
pub use bus::{EventBus, EventCallback, SubscriptionId};
pub use topics::Topic;
