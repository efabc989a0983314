//! Configuration handling for the netkit client.
//!
//! This module reads the shared YAML config file and environment variables,
//! providing one configuration value that the command line can override.

use anyhow::{anyhow, Result};
use netkit_session::{ClientConfig, Framing, RetryPolicy};
use netkit_wire::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Socket kind to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// TCP stream
    Tcp,
    /// Connected UDP socket
    Udp,
}

impl FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportMode::Tcp),
            "udp" => Ok(TransportMode::Udp),
            other => Err(anyhow!("unknown transport '{}', expected tcp or udp", other)),
        }
    }
}

/// Message framing on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// One event per read
    Raw,
    /// 4-byte length prefix per message
    LengthPrefixed,
}

impl FromStr for FramingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(FramingMode::Raw),
            "length-prefixed" | "length_prefixed" | "lp" => Ok(FramingMode::LengthPrefixed),
            other => Err(anyhow!(
                "unknown framing '{}', expected raw or length-prefixed",
                other
            )),
        }
    }
}

/// Netkit client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetkitConfig {
    /// Remote endpoint as host:port
    pub endpoint: String,
    /// Shared secret for packet digests
    pub key: String,
    /// Socket kind
    pub transport: TransportMode,
    /// Message framing
    pub framing: FramingMode,
    /// Largest frame accepted with length-prefixed framing
    pub max_frame_size: usize,
    /// Receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// TCP connect timeout (milliseconds, 0 for the OS default)
    pub connect_timeout_ms: u64,
    /// TCP read timeout (milliseconds, 0 to block indefinitely)
    pub read_timeout_ms: u64,
    /// Consecutive transient receive errors before giving up
    pub retry_max: u32,
    /// Pause between receive retries (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for NetkitConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            endpoint: "127.0.0.1:9000".to_string(),
            key: String::new(),
            transport: TransportMode::Tcp,
            framing: FramingMode::Raw,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            recv_buffer_size: client.recv_buffer_size,
            connect_timeout_ms: 0,
            read_timeout_ms: 0,
            retry_max: client.retry.max_consecutive,
            retry_backoff_ms: client.retry.backoff.as_millis() as u64,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    netkit: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    args: Option<Vec<String>>,
    config: Option<HashMap<String, String>>,
}

impl NetkitConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            ),
        }

        config.apply_overrides(|name| std::env::var(name).ok());

        info!(
            "Final netkit configuration: endpoint={}, transport={:?}, framing={:?}",
            config.endpoint, config.transport, config.framing
        );
        Ok(config)
    }

    /// Build the socket client configuration
    pub fn client_config(&self) -> ClientConfig {
        let framing = match self.framing {
            FramingMode::Raw => Framing::Raw,
            FramingMode::LengthPrefixed => Framing::LengthPrefixed {
                max_frame_size: self.max_frame_size,
            },
        };

        ClientConfig {
            recv_buffer_size: self.recv_buffer_size,
            retry: RetryPolicy {
                max_consecutive: self.retry_max,
                backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            connect_timeout: millis(self.connect_timeout_ms),
            stream_read_timeout: millis(self.read_timeout_ms),
            framing,
            ..ClientConfig::default()
        }
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        if let Some(service) = root_config.services.and_then(|s| s.netkit) {
            self.apply_service_config(service);
        }
    }

    fn apply_service_config(&mut self, service_config: ServiceConfig) {
        for arg in service_config.args.unwrap_or_default() {
            if let Some(endpoint) = arg.strip_prefix("--connect=") {
                self.endpoint = endpoint.to_string();
            } else if let Some(transport) = arg.strip_prefix("--transport=") {
                self.set_transport(transport);
            }
        }

        for (key, value) in service_config.config.unwrap_or_default() {
            match key.as_str() {
                "services.netkit.endpoint" => self.endpoint = value,
                "services.netkit.key" => self.key = value,
                "services.netkit.transport" => self.set_transport(&value),
                "services.netkit.framing" => self.set_framing(&value),
                "services.netkit.max_frame_size" => set_parsed(&mut self.max_frame_size, &key, &value),
                "services.netkit.recv_buffer_size" => {
                    set_parsed(&mut self.recv_buffer_size, &key, &value)
                }
                "services.netkit.connect_timeout_ms" => {
                    set_parsed(&mut self.connect_timeout_ms, &key, &value)
                }
                "services.netkit.read_timeout_ms" => set_parsed(&mut self.read_timeout_ms, &key, &value),
                "services.netkit.retry_max" => set_parsed(&mut self.retry_max, &key, &value),
                "services.netkit.retry_backoff_ms" => {
                    set_parsed(&mut self.retry_backoff_ms, &key, &value)
                }
                _ => {}
            }
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("NETKIT_ENDPOINT") {
            info!("Endpoint overridden by environment: {}", endpoint);
            self.endpoint = endpoint;
        }

        if let Some(key) = lookup("NETKIT_KEY") {
            info!("Digest key overridden by environment");
            self.key = key;
        }

        if let Some(transport) = lookup("NETKIT_TRANSPORT") {
            self.set_transport(&transport);
        }

        if let Some(framing) = lookup("NETKIT_FRAMING") {
            self.set_framing(&framing);
        }
    }

    fn set_transport(&mut self, value: &str) {
        match value.parse() {
            Ok(transport) => self.transport = transport,
            Err(e) => warn!("Ignoring transport setting: {}", e),
        }
    }

    fn set_framing(&mut self, value: &str) {
        match value.parse() {
            Ok(framing) => self.framing = framing,
            Err(e) => warn!("Ignoring framing setting: {}", e),
        }
    }
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!("Ignoring invalid value '{}' for {}", value, key),
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = NetkitConfig::default();
        assert_eq!(config.endpoint, "127.0.0.1:9000");
        assert_eq!(config.transport, TransportMode::Tcp);
        assert_eq!(config.framing, FramingMode::Raw);
        assert_eq!(config.recv_buffer_size, 8192);
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.retry_backoff_ms, 100);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  netkit:
    enabled: true
    executable: ./redb-netkit
    args:
      - --connect=10.0.0.5:7000
      - --transport=udp
    config:
      services.netkit.key: "s3cret"
      services.netkit.framing: "length-prefixed"
      services.netkit.max_frame_size: "4096"
      services.netkit.read_timeout_ms: "250"
      services.netkit.retry_max: "5"
      services.netkit.recv_buffer_size: "not-a-number"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let mut config = NetkitConfig::default();
        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        config.apply_root_config(serde_yaml::from_str(&content).unwrap());

        assert_eq!(config.endpoint, "10.0.0.5:7000");
        assert_eq!(config.transport, TransportMode::Udp);
        assert_eq!(config.key, "s3cret");
        assert_eq!(config.framing, FramingMode::LengthPrefixed);
        assert_eq!(config.max_frame_size, 4096);
        assert_eq!(config.retry_max, 5);
        assert_eq!(config.recv_buffer_size, 8192);

        let client = config.client_config();
        assert_eq!(client.framing, Framing::LengthPrefixed { max_frame_size: 4096 });
        assert_eq!(client.stream_read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(client.connect_timeout, None);
        assert_eq!(client.retry.max_consecutive, 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NetkitConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.recv_buffer_size, 8192);
    }

    #[test]
    fn test_unparsable_file_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"services: [unclosed").unwrap();

        let config = NetkitConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.retry_backoff_ms, 100);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("NETKIT_ENDPOINT", "example.org:443"),
            ("NETKIT_KEY", "from-env"),
            ("NETKIT_TRANSPORT", "UDP"),
            ("NETKIT_FRAMING", "bogus"),
        ]
        .into_iter()
        .collect();

        let mut config = NetkitConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.endpoint, "example.org:443");
        assert_eq!(config.key, "from-env");
        assert_eq!(config.transport, TransportMode::Udp);
        assert_eq!(config.framing, FramingMode::Raw);
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("tcp".parse::<TransportMode>().unwrap(), TransportMode::Tcp);
        assert!("sctp".parse::<TransportMode>().is_err());
        assert_eq!(
            "lp".parse::<FramingMode>().unwrap(),
            FramingMode::LengthPrefixed
        );
    }
}
