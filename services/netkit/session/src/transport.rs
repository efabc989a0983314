//! TCP and connected-UDP transport for the socket client.
//!
//! Both socket kinds are exposed through one [`Transport`] type so the client
//! can send and receive without caring which one it holds. A UDP socket is
//! `connect`ed to its peer, which fixes the remote address for `send`/`recv`
//! and filters datagrams from anyone else.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Which socket kind a transport wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Stream socket
    Tcp,
    /// Connected datagram socket
    Udp,
}

/// Unified socket type that can be either a TCP stream or a connected UDP socket
#[derive(Debug)]
pub enum Transport {
    /// TCP stream
    Tcp(TcpStream),
    /// Connected UDP socket
    Udp(UdpSocket),
}

impl Transport {
    /// Connect a TCP stream, trying each address in turn
    pub fn connect_tcp(addrs: &[SocketAddr], timeout: Option<Duration>) -> io::Result<Self> {
        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!("TCP connected to {}", addr);
                    return Ok(Transport::Tcp(stream));
                }
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(no_addresses))
    }

    /// Bind an ephemeral UDP socket and connect it to the first usable address
    pub fn connect_udp(addrs: &[SocketAddr]) -> io::Result<Self> {
        let mut last_err = None;
        for addr in addrs {
            let local: SocketAddr = if addr.is_ipv4() {
                (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
            } else {
                (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
            };
            let attempt = UdpSocket::bind(local).and_then(|socket| {
                socket.connect(addr)?;
                Ok(socket)
            });
            match attempt {
                Ok(socket) => {
                    debug!("UDP socket connected to {}", addr);
                    return Ok(Transport::Udp(socket));
                }
                Err(e) => {
                    debug!("UDP connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(no_addresses))
    }

    /// Socket kind
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Tcp(_) => TransportKind::Tcp,
            Transport::Udp(_) => TransportKind::Udp,
        }
    }

    /// Duplicate the handle; both refer to the same socket
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Transport::Tcp(stream) => stream.try_clone().map(Transport::Tcp),
            Transport::Udp(socket) => socket.try_clone().map(Transport::Udp),
        }
    }

    /// Write all of `buf`. A datagram that cannot be sent whole is an error.
    pub fn send_all(&self, buf: &[u8]) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => {
                let mut stream = stream;
                stream.write_all(buf)?;
                stream.flush()
            }
            Transport::Udp(socket) => {
                let sent = socket.send(buf)?;
                if sent != buf.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("datagram truncated: sent {} of {} bytes", sent, buf.len()),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Read whatever is available into `buf`.
    ///
    /// `Ok(0)` means orderly close for TCP and an empty datagram for UDP.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(stream) => {
                let mut stream = stream;
                stream.read(buf)
            }
            Transport::Udp(socket) => socket.recv(buf),
        }
    }

    /// Set the blocking read timeout (`None` blocks indefinitely)
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => stream.set_read_timeout(timeout),
            Transport::Udp(socket) => socket.set_read_timeout(timeout),
        }
    }

    /// Shut the socket down in both directions, waking a blocked TCP read.
    ///
    /// Datagram sockets have nothing to shut down; this is a no-op for them.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            Transport::Udp(_) => Ok(()),
        }
    }

    /// Remote address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Tcp(stream) => stream.peer_addr(),
            Transport::Udp(socket) => socket.peer_addr(),
        }
    }

    /// Local address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Transport::Tcp(stream) => stream.local_addr(),
            Transport::Udp(socket) => socket.local_addr(),
        }
    }
}

fn no_addresses() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to")
}
