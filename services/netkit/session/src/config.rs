//! Client endpoint and tuning knobs.

use netkit_wire::{LengthPrefixCodec, DEFAULT_MAX_FRAME_SIZE};
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Receive buffer size used when none is configured
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;

/// How often an idle datagram receive wakes up to check for stop
pub const DEFAULT_DATAGRAM_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Remote host and port, resolved at connect time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint. `host` may be a name or an address literal.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to socket addresses
    pub fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", self),
            ));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Error parsing a `host:port` string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid endpoint '{0}', expected host:port")]
pub struct EndpointParseError(String);

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EndpointParseError(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// Message boundaries on the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// No framing: each read is delivered as one event
    #[default]
    Raw,
    /// 4-byte big-endian length before each message
    LengthPrefixed {
        /// Largest accepted frame payload
        max_frame_size: usize,
    },
}

impl Framing {
    /// Length-prefixed framing with the default frame limit
    pub fn length_prefixed() -> Self {
        Framing::LengthPrefixed {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub(crate) fn codec(&self) -> Option<LengthPrefixCodec> {
        match *self {
            Framing::Raw => None,
            Framing::LengthPrefixed { max_frame_size } => {
                Some(LengthPrefixCodec::with_max_frame_size(max_frame_size))
            }
        }
    }
}

/// Socket client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Size of the per-read buffer
    pub recv_buffer_size: usize,
    /// Transient receive error handling
    pub retry: RetryPolicy,
    /// Bound on each TCP connect attempt (`None` uses the OS default)
    pub connect_timeout: Option<Duration>,
    /// TCP read timeout. Expiry counts as a transient error.
    pub stream_read_timeout: Option<Duration>,
    /// Datagram receive wake-up interval; idle ticks are not errors
    pub datagram_poll_interval: Duration,
    /// Message framing for sends and receives
    pub framing: Framing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            retry: RetryPolicy::default(),
            connect_timeout: None,
            stream_read_timeout: None,
            datagram_poll_interval: DEFAULT_DATAGRAM_POLL_INTERVAL,
            framing: Framing::Raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint() {
        let ep: Endpoint = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 8080);
        assert_eq!(ep.to_string(), "127.0.0.1:8080");

        let ep: Endpoint = "[::1]:9000".parse().unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.to_string(), "[::1]:9000");

        let ep: Endpoint = "localhost:1".parse().unwrap();
        assert_eq!(ep.host(), "localhost");
    }

    #[test]
    fn test_parse_endpoint_errors() {
        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":80".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
        assert!("host:abc".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_resolve_literal() {
        let addrs = Endpoint::new("127.0.0.1", 4000).resolve().unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:4000".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.recv_buffer_size, 8192);
        assert_eq!(config.retry.max_consecutive, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(100));
        assert_eq!(config.framing, Framing::Raw);
        assert!(config.framing.codec().is_none());
        assert_eq!(
            Framing::length_prefixed().codec().map(|c| c.max_frame_size()),
            Some(DEFAULT_MAX_FRAME_SIZE)
        );
    }
}
