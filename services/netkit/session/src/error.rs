//! Socket client error types.
//!
//! These never escape the client's public operations; they are rendered into
//! the message and cause of the event published for the failure.

use netkit_wire::FrameError;
use std::io;
use thiserror::Error;

use crate::client::ClientState;

/// Failure inside a client operation
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connect requested on a client that has already been used
    #[error("client is {0}, create a new client to connect again")]
    InvalidState(ClientState),

    /// Send requested without a live socket
    #[error("not connected")]
    NotConnected,

    /// Host name lookup failed
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint being resolved
        endpoint: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Socket creation or connect failed
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being connected
        endpoint: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Socket option or handle duplication failed
    #[error("socket setup failed: {0}")]
    Setup(#[source] io::Error),

    /// Write failed
    #[error("failed to send data: {0}")]
    Send(#[source] io::Error),

    /// Outgoing payload does not fit in a frame
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl ClientError {
    /// OS error code behind this failure, 0 when there is none
    pub fn os_code(&self) -> i32 {
        match self {
            ClientError::Resolve { source, .. }
            | ClientError::Connect { source, .. }
            | ClientError::Setup(source)
            | ClientError::Send(source) => source.raw_os_error().unwrap_or(0),
            ClientError::InvalidState(_) | ClientError::NotConnected | ClientError::Frame(_) => 0,
        }
    }
}
