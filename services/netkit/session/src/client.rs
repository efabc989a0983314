//! Threaded TCP/UDP socket client.
//!
//! A [`SocketClient`] owns at most one socket for its whole life. Connecting
//! starts a dedicated receive thread that delivers inbound bytes (or frames)
//! as `DataReceived` events until the peer closes, a fatal error occurs, or
//! [`SocketClient::stop`] is called. Operations never return transport
//! failures; every outcome is published on the client's [`EventBus`].
//!
//! ```text
//! Idle -> Connecting -> Connected -> Receiving -> Stopped
//!           |                                       ^
//!           +------ (connect failed) -> Idle        |
//!  any state ------------------- stop() ------------+
//! ```
//!
//! `Stopped` is terminal. Reconnecting means constructing a new client.

use bytes::{Bytes, BytesMut};
use netkit_events::{
    topics, ConnectionId, EventArgs, EventBus, StateCode, SubscriptionId,
};
use netkit_wire::{FrameError, LengthPrefixCodec, Packet};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::error::ClientError;
use crate::retry::{classify, ErrorClass, RetryDecision, TransientErrorTracker};
use crate::transport::{Transport, TransportKind};

/// Message carried by the `Connected` event
pub const CONNECTED_MESSAGE: &str = "Connected to server";

/// Message carried by the `ConnectionClosed` event
pub const PEER_CLOSED_MESSAGE: &str = "Connection closed by peer";

/// Client lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Constructed, no socket yet
    Idle,
    /// Resolving and connecting
    Connecting,
    /// Socket open, receive loop not yet started
    Connected,
    /// Receive loop running
    Receiving,
    /// Socket released; terminal
    Stopped,
}

impl ClientState {
    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            ClientState::Idle => "idle",
            ClientState::Connecting => "connecting",
            ClientState::Connected => "connected",
            ClientState::Receiving => "receiving",
            ClientState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traffic counters for one client
#[derive(Debug, Clone, Default)]
pub struct ClientStats {
    /// Total bytes read off the socket
    pub bytes_in: u64,
    /// Total bytes written, framing included
    pub bytes_out: u64,
    /// Packets written successfully
    pub packets_sent: u64,
    /// `DataReceived` events published
    pub chunks_received: u64,
    /// Time of the last successful read
    pub last_received: Option<Instant>,
    /// Time of the last successful write
    pub last_sent: Option<Instant>,
}

/// Identity of the live socket
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    id: ConnectionId,
    kind: Option<TransportKind>,
    peer: Option<SocketAddr>,
    local: Option<SocketAddr>,
}

/// Handles produced by a successful connect
struct Opened {
    writer: Transport,
    reader: Transport,
    control: Transport,
    link: Link,
}

/// Receive buffer for length-prefixed framing
struct Deframer {
    codec: LengthPrefixCodec,
    pending: BytesMut,
}

enum LoopExit {
    Stopped,
    PeerClosed,
    Failed { message: String, cause: i32 },
}

struct ClientInner {
    endpoint: Endpoint,
    config: ClientConfig,
    bus: EventBus,
    state: Mutex<ClientState>,
    running: AtomicBool,
    /// Set once by `stop`; a connect still in flight must not start receiving
    stop_requested: AtomicBool,
    link: Mutex<Link>,
    writer: Mutex<Option<Transport>>,
    /// Extra handle used only to shut the socket down from `stop`
    control: Mutex<Option<Transport>>,
    stats: Mutex<ClientStats>,
}

/// Event-driven TCP/UDP client
pub struct SocketClient {
    inner: Arc<ClientInner>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl SocketClient {
    /// Create an idle client with default configuration
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, ClientConfig::default())
    }

    /// Create an idle client with its own event bus
    pub fn with_config(endpoint: Endpoint, config: ClientConfig) -> Self {
        Self::with_bus(endpoint, config, EventBus::new())
    }

    /// Create an idle client that publishes on an existing bus
    pub fn with_bus(endpoint: Endpoint, config: ClientConfig, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                endpoint,
                config,
                bus,
                state: Mutex::new(ClientState::Idle),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                link: Mutex::new(Link::default()),
                writer: Mutex::new(None),
                control: Mutex::new(None),
                stats: Mutex::new(ClientStats::default()),
            }),
            receiver: Mutex::new(None),
        }
    }

    /// Open a TCP connection and start the receive loop.
    ///
    /// Publishes `Connected` on success and `ConnectionFailed` otherwise.
    pub fn connect(&self) {
        self.start(TransportKind::Tcp);
    }

    /// Open a connected UDP socket and start the receive loop.
    ///
    /// Publishes `Connected` on success and `ConnectionFailed` otherwise.
    pub fn connect_udp(&self) {
        self.start(TransportKind::Udp);
    }

    /// Seal `packet` with `key` and write it.
    ///
    /// Publishes `DataSent` with the packet document on success and
    /// `DataSendFailed` otherwise.
    pub fn send(&self, packet: &Packet, key: &str) {
        let link = *self.inner.link.lock();

        match self.inner.write_packet(packet, key) {
            Ok(written) => {
                debug!("Sent {} bytes on {}", written, link.id);
                self.inner.publish(
                    topics::DATA_SENT,
                    &EventArgs::new(link.id, "")
                        .with_state(StateCode::Success)
                        .with_packet_json(packet.to_json())
                        .with_remote(link.peer),
                );
            }
            Err(err) => {
                warn!("Send on {} failed: {}", link.id, err);
                self.inner.publish(
                    topics::DATA_SEND_FAILED,
                    &EventArgs::new(link.id, err.to_string())
                        .with_state(StateCode::Failure)
                        .with_cause(err.os_code())
                        .with_packet_json(packet.to_json())
                        .with_remote(link.peer),
                );
            }
        }
    }

    /// Stop the receive loop and release the socket.
    ///
    /// Blocks until the receive thread has exited, unless called from that
    /// thread (from inside an event callback), in which case the loop exits
    /// once the callback returns. Idempotent; no events are published.
    pub fn stop(&self) {
        // Serialized with the Receiving transition in `start`: either the
        // handle is already stored here, or `start` sees the request and
        // never spawns the receive thread.
        let handle = {
            let mut receiver = self.receiver.lock();
            self.inner.stop_requested.store(true, Ordering::Release);
            self.inner.running.store(false, Ordering::Release);

            if let Some(control) = self.inner.control.lock().as_ref() {
                if let Err(e) = control.shutdown() {
                    debug!("Socket shutdown during stop: {}", e);
                }
            }
            receiver.take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("Stop requested from the receive thread");
            } else if handle.join().is_err() {
                error!("Receive thread for {} panicked", self.inner.endpoint);
            }
        }

        if self.inner.teardown() != ClientState::Stopped {
            info!("Client for {} stopped", self.inner.endpoint);
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Whether the receive loop is running
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Id of the live socket, [`ConnectionId::INVALID`] when there is none
    pub fn connection_id(&self) -> ConnectionId {
        self.inner.link.lock().id
    }

    /// Kind of the live socket
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.inner.link.lock().kind
    }

    /// Remote address of the live socket
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.link.lock().peer
    }

    /// Local address of the live socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.link.lock().local
    }

    /// Configured endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Configuration in force
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Bus the client publishes on
    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Subscribe to one of the client's topics
    pub fn add_event_listener<F>(&self, topic: impl AsRef<str>, callback: F) -> SubscriptionId
    where
        F: Fn(&EventArgs) + Send + Sync + 'static,
    {
        self.inner.bus.subscribe(topic, callback)
    }

    /// Remove a subscription made with [`SocketClient::add_event_listener`]
    pub fn remove_event_listener(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id)
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> ClientStats {
        self.inner.stats.lock().clone()
    }

    fn start(&self, kind: TransportKind) {
        {
            let mut state = self.inner.state.lock();
            if *state != ClientState::Idle {
                let err = ClientError::InvalidState(*state);
                drop(state);
                warn!("Connect to {} rejected: {}", self.inner.endpoint, err);
                self.inner
                    .publish_failure(topics::CONNECTION_FAILED, self.connection_id(), &err);
                return;
            }
            *state = ClientState::Connecting;
        }

        info!("Connecting to {} over {:?}", self.inner.endpoint, kind);
        let Opened {
            writer,
            reader,
            control,
            link,
        } = match self.inner.open(kind) {
            Ok(opened) => opened,
            Err(err) => {
                {
                    let mut state = self.inner.state.lock();
                    if *state == ClientState::Connecting {
                        *state = ClientState::Idle;
                    }
                }
                warn!("{}", err);
                self.inner
                    .publish_failure(topics::CONNECTION_FAILED, ConnectionId::INVALID, &err);
                return;
            }
        };

        {
            let mut state = self.inner.state.lock();
            if *state != ClientState::Connecting {
                debug!(
                    "Client for {} stopped while connecting, discarding socket",
                    self.inner.endpoint
                );
                return;
            }
            *self.inner.link.lock() = link;
            *self.inner.writer.lock() = Some(writer);
            *self.inner.control.lock() = Some(control);
            *state = ClientState::Connected;
        }

        info!(
            "Connected to {} ({}, local {:?})",
            self.inner.endpoint, link.id, link.local
        );
        self.inner.publish(
            topics::CONNECTED,
            &EventArgs::new(link.id, CONNECTED_MESSAGE)
                .with_state(StateCode::Success)
                .with_remote(link.peer),
        );

        let mut receiver = self.receiver.lock();
        {
            let mut state = self.inner.state.lock();
            if *state != ClientState::Connected
                || self.inner.stop_requested.load(Ordering::Acquire)
            {
                debug!("Client for {} stopped before receiving", self.inner.endpoint);
                return;
            }
            *state = ClientState::Receiving;
            self.inner.running.store(true, Ordering::Release);
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("netkit-recv-{}", link.id.get()))
            .spawn(move || receive_loop(inner, reader, link));

        match spawned {
            Ok(handle) => *receiver = Some(handle),
            Err(e) => {
                drop(receiver);
                error!("Failed to start receive thread for {}: {}", link.id, e);
                self.inner.teardown();
                self.inner.publish(
                    topics::NETWORK_ERROR,
                    &EventArgs::new(link.id, format!("Network error: {}", e))
                        .with_state(StateCode::Failure)
                        .with_cause(e.raw_os_error().unwrap_or(0))
                        .with_remote(link.peer),
                );
            }
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = *self.inner.link.lock();
        f.debug_struct("SocketClient")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("connection", &link.id)
            .field("transport", &link.kind)
            .finish()
    }
}

impl ClientInner {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn publish(&self, topic: &str, args: &EventArgs) {
        self.bus.publish(topic, args);
    }

    fn publish_failure(&self, topic: &str, connection: ConnectionId, err: &ClientError) {
        self.publish(
            topic,
            &EventArgs::new(connection, err.to_string())
                .with_state(StateCode::Failure)
                .with_cause(err.os_code()),
        );
    }

    fn open(&self, kind: TransportKind) -> Result<Opened, ClientError> {
        let addrs = self.endpoint.resolve().map_err(|source| ClientError::Resolve {
            endpoint: self.endpoint.to_string(),
            source,
        })?;

        let transport = match kind {
            TransportKind::Tcp => Transport::connect_tcp(&addrs, self.config.connect_timeout),
            TransportKind::Udp => Transport::connect_udp(&addrs),
        }
        .map_err(|source| ClientError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        })?;

        let reader = transport.try_clone().map_err(ClientError::Setup)?;
        let control = transport.try_clone().map_err(ClientError::Setup)?;

        let read_timeout = match kind {
            TransportKind::Tcp => self.config.stream_read_timeout,
            TransportKind::Udp => Some(self.config.datagram_poll_interval),
        };
        reader
            .set_read_timeout(read_timeout)
            .map_err(ClientError::Setup)?;

        let link = Link {
            id: ConnectionId::next(),
            kind: Some(kind),
            peer: transport.peer_addr().ok(),
            local: transport.local_addr().ok(),
        };

        Ok(Opened {
            writer: transport,
            reader,
            control,
            link,
        })
    }

    fn write_packet(&self, packet: &Packet, key: &str) -> Result<usize, ClientError> {
        let payload = packet.serialize(key);
        let bytes = match self.config.framing.codec() {
            Some(codec) => codec.encode(&payload)?,
            None => payload,
        };

        let writer = self.writer.lock();
        let transport = writer.as_ref().ok_or(ClientError::NotConnected)?;
        transport.send_all(&bytes).map_err(ClientError::Send)?;
        drop(writer);

        let mut stats = self.stats.lock();
        stats.bytes_out += bytes.len() as u64;
        stats.packets_sent += 1;
        stats.last_sent = Some(Instant::now());
        Ok(bytes.len())
    }

    /// Release the socket and mark the client stopped. Returns the prior state.
    fn teardown(&self) -> ClientState {
        self.running.store(false, Ordering::Release);
        let previous = std::mem::replace(&mut *self.state.lock(), ClientState::Stopped);

        if let Some(control) = self.control.lock().take() {
            // Wakes any writer blocked on a full send buffer
            let _ = control.shutdown();
        }
        self.writer.lock().take();
        *self.link.lock() = Link::default();
        previous
    }

    fn deliver(
        &self,
        link: &Link,
        chunk: &[u8],
        deframer: Option<&mut Deframer>,
    ) -> Result<(), FrameError> {
        match deframer {
            None => self.publish_received(link, Bytes::copy_from_slice(chunk)),
            Some(deframer) => {
                deframer.pending.extend_from_slice(chunk);
                while let Some(frame) = deframer.codec.decode(&mut deframer.pending)? {
                    self.publish_received(link, frame);
                    if !self.is_running() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn publish_received(&self, link: &Link, data: Bytes) {
        let text = String::from_utf8_lossy(&data).into_owned();
        self.stats.lock().chunks_received += 1;
        self.publish(
            topics::DATA_RECEIVED,
            &EventArgs::new(link.id, text.clone())
                .with_state(StateCode::Success)
                .with_packet_json(text)
                .with_data(data)
                .with_remote(link.peer),
        );
    }
}

fn failed(err: &std::io::Error) -> LoopExit {
    LoopExit::Failed {
        message: format!("Network error: {}", err),
        cause: err.raw_os_error().unwrap_or(0),
    }
}

fn receive_loop(inner: Arc<ClientInner>, reader: Transport, link: Link) {
    let kind = reader.kind();
    let mut buf = vec![0u8; inner.config.recv_buffer_size.max(1)];
    let mut retries = TransientErrorTracker::new(inner.config.retry);
    let mut deframer = inner.config.framing.codec().map(|codec| Deframer {
        codec,
        pending: BytesMut::new(),
    });
    debug!("Receive loop started for {} ({:?})", link.id, kind);

    let exit = loop {
        if !inner.is_running() {
            break LoopExit::Stopped;
        }

        match reader.recv(&mut buf) {
            Ok(0) if kind == TransportKind::Udp => {
                retries.record_success();
                trace!("Ignoring empty datagram on {}", link.id);
            }
            Ok(0) => {
                break if inner.is_running() {
                    LoopExit::PeerClosed
                } else {
                    LoopExit::Stopped
                };
            }
            Ok(n) => {
                retries.record_success();
                if !inner.is_running() {
                    break LoopExit::Stopped;
                }
                {
                    let mut stats = inner.stats.lock();
                    stats.bytes_in += n as u64;
                    stats.last_received = Some(Instant::now());
                }
                if let Err(e) = inner.deliver(&link, &buf[..n], deframer.as_mut()) {
                    break LoopExit::Failed {
                        message: format!("Network error: {}", e),
                        cause: 0,
                    };
                }
            }
            Err(e) => {
                if !inner.is_running() {
                    break LoopExit::Stopped;
                }
                match classify(&e, kind) {
                    ErrorClass::Idle | ErrorClass::Interrupted => {}
                    ErrorClass::Transient => match retries.record_failure() {
                        RetryDecision::Retry(backoff) => thread::sleep(backoff),
                        RetryDecision::GiveUp { .. } => break failed(&e),
                    },
                    ErrorClass::Fatal => break failed(&e),
                }
            }
        }
    };

    inner.teardown();

    match exit {
        LoopExit::Stopped => debug!("Receive loop for {} stopped", link.id),
        LoopExit::PeerClosed => {
            info!("Connection {} closed by peer", link.id);
            inner.publish(
                topics::CONNECTION_CLOSED,
                &EventArgs::new(link.id, PEER_CLOSED_MESSAGE)
                    .with_state(StateCode::Success)
                    .with_remote(link.peer),
            );
        }
        LoopExit::Failed { message, cause } => {
            error!("Receive loop for {} failed: {}", link.id, message);
            inner.publish(
                topics::NETWORK_ERROR,
                &EventArgs::new(link.id, message)
                    .with_state(StateCode::Failure)
                    .with_cause(cause)
                    .with_remote(link.peer),
            );
        }
    }
}
