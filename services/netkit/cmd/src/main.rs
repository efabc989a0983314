//! Netkit client binary.
//!
//! Connects to a TCP or UDP endpoint, sends integrity-sealed packets and logs
//! every socket event until interrupted, the connection ends, or the optional
//! run duration elapses.

use anyhow::{bail, Context};
use clap::Parser;
use netkit_events::{EventArgs, Topic};
use netkit_session::{ClientState, Endpoint, SocketClient};
use netkit_wire::Packet;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{FramingMode, NetkitConfig, TransportMode};
use logging::NetkitLogFormatter;

/// Event-driven TCP/UDP packet client
#[derive(Parser, Debug)]
#[command(name = "netkit", version, about = "Send sealed JSON packets over TCP or UDP")]
struct Args {
    /// Remote endpoint, e.g. 127.0.0.1:9000 (overrides the config file)
    #[arg(long)]
    connect: Option<String>,

    /// Use a connected UDP socket instead of TCP
    #[arg(long)]
    udp: bool,

    /// Shared secret used to seal and verify packets
    #[arg(long)]
    key: Option<String>,

    /// Framing: raw or length-prefixed
    #[arg(long)]
    framing: Option<FramingMode>,

    /// Packet header (message type)
    #[arg(long, default_value_t = 1)]
    header: u32,

    /// Request id of the first packet; later packets count up from it
    #[arg(long, default_value_t = 0)]
    request_id: u32,

    /// Body entry as key=value; the value is parsed as JSON when possible (repeatable)
    #[arg(long = "body", value_name = "KEY=VALUE")]
    body: Vec<String>,

    /// Number of packets to send
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Pause between packets, e.g. 500ms
    #[arg(long, default_value = "1s")]
    interval: humantime::Duration,

    /// Stop after this long instead of waiting for the connection to end
    #[arg(long)]
    duration: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("redb_netkit={}", args.log_level).parse()?)
        .add_directive(format!("netkit_session={}", args.log_level).parse()?)
        .add_directive(format!("netkit_events={}", args.log_level).parse()?)
        .add_directive(format!("netkit_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(NetkitLogFormatter::new("netkit"))
        .init();

    info!("Starting reDB Netkit client v{}", env!("CARGO_PKG_VERSION"));

    let mut config = NetkitConfig::load_from_file(&args.config)?;
    if let Some(endpoint) = &args.connect {
        config.endpoint = endpoint.clone();
    }
    if args.udp {
        config.transport = TransportMode::Udp;
    }
    if let Some(key) = &args.key {
        config.key = key.clone();
    }
    if let Some(framing) = args.framing {
        config.framing = framing;
    }
    if config.key.is_empty() {
        warn!("No digest key configured; packets are sealed with an empty key");
    }

    let endpoint: Endpoint = config
        .endpoint
        .parse()
        .with_context(|| format!("invalid endpoint in configuration: {}", config.endpoint))?;
    let packet = build_packet(args.header, args.request_id, &args.body)?;

    let client = Arc::new(SocketClient::with_config(
        endpoint.clone(),
        config.client_config(),
    ));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<(Topic, EventArgs)>();
    for topic in Topic::ALL {
        let tx = event_tx.clone();
        client.add_event_listener(topic, move |event| {
            let _ = tx.send((topic, event.clone()));
        });
    }
    drop(event_tx);

    let connecting = Arc::clone(&client);
    let transport = config.transport;
    tokio::task::spawn_blocking(move || match transport {
        TransportMode::Tcp => connecting.connect(),
        TransportMode::Udp => connecting.connect_udp(),
    })
    .await?;

    if client.state() != ClientState::Receiving {
        while let Ok((topic, event)) = event_rx.try_recv() {
            report(topic, &event, &config.key);
        }
        bail!("failed to connect to {}", endpoint);
    }

    let sender = tokio::spawn(send_packets(
        Arc::clone(&client),
        packet,
        config.key.clone(),
        args.count,
        args.interval.into(),
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match args.duration {
            Some(duration) => tokio::time::sleep(duration.into()).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received interrupt, stopping client");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed, stopping client");
                break;
            }
            event = event_rx.recv() => match event {
                Some((topic, event)) => {
                    report(topic, &event, &config.key);
                    if topic.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    sender.abort();
    let stopping = Arc::clone(&client);
    tokio::task::spawn_blocking(move || stopping.stop()).await?;

    let stats = client.stats();
    info!(
        "Client finished: sent {} packet(s) / {} bytes, received {} message(s) / {} bytes",
        stats.packets_sent, stats.bytes_out, stats.chunks_received, stats.bytes_in
    );
    Ok(())
}

/// Send `count` copies of `packet` with consecutive request ids
async fn send_packets(
    client: Arc<SocketClient>,
    packet: Packet,
    key: String,
    count: u32,
    interval: Duration,
) -> anyhow::Result<()> {
    let key = Arc::new(key);
    for n in 0..count {
        let mut next = packet.clone();
        next.set_request_id(packet.request_id().wrapping_add(n));

        let client = Arc::clone(&client);
        let key = Arc::clone(&key);
        tokio::task::spawn_blocking(move || client.send(&next, &key)).await?;

        if n + 1 < count {
            tokio::time::sleep(interval).await;
        }
    }
    component_debug!("client", "Finished sending {} packet(s)", count);
    Ok(())
}

/// Build the outgoing packet from `key=value` body entries
fn build_packet(header: u32, request_id: u32, body: &[String]) -> anyhow::Result<Packet> {
    let mut packet = Packet::new(header).with_request_id(request_id);
    for entry in body {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("body entry '{}' is not key=value", entry))?;
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        packet.set_body(key, value)?;
    }
    Ok(packet)
}

/// Log one client event
fn report(topic: Topic, event: &EventArgs, key: &str) {
    let conn = event.connection();
    match topic {
        Topic::Connected => {
            component_info!("client", "{} {} ({:?})", conn, event.message(), event.remote())
        }
        Topic::ConnectionFailed => {
            component_error!("client", "Connection failed: {} (cause {})", event.message(), event.cause())
        }
        Topic::DataSent => component_debug!("client", "{} sent {}", conn, event.packet_json()),
        Topic::DataSendFailed => {
            component_warn!("client", "{} send failed: {} (cause {})", conn, event.message(), event.cause())
        }
        Topic::DataReceived => match event.open(key) {
            Ok(packet) => component_info!(
                "client",
                "{} received packet h={} r_id={} body={}",
                conn,
                packet.header(),
                packet.request_id(),
                packet.body_json()
            ),
            Err(e) => component_info!(
                "client",
                "{} received {} byte(s) ({}): {}",
                conn,
                event.data().len(),
                e,
                event.message()
            ),
        },
        Topic::ConnectionClosed => component_info!("client", "{} {}", conn, event.message()),
        Topic::NetworkError => {
            component_error!("client", "{} {} (cause {})", conn, event.message(), event.cause())
        }
    }
}
