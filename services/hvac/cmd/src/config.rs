//! Configuration handling for the bridge.
//!
//! Values come from the shared YAML config file (`services.hvac.config`),
//! then from `HVAC_*` environment variables. Command-line flags are applied
//! last by `main`.

use anyhow::{Context, Result};
use hvac_session::{EngineConfig, ProtocolVariant, DEFAULT_DISCOVERY_HOST, DISCOVERY_PORT};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Discovery host, usually the LAN broadcast address
    pub host: String,
    /// Controller port
    pub port: u16,
    /// Local address the UDP socket binds to
    pub listen: SocketAddr,
    /// Status polling interval
    pub poll_interval: Duration,
    /// Register sub-devices only
    pub controller_only: bool,
    /// Protocol variant of the devices
    pub protocol: ProtocolVariant,
    /// Delay between socket bind attempts
    pub bind_retry: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DISCOVERY_HOST.to_string(),
            port: DISCOVERY_PORT,
            listen: SocketAddr::from(([0, 0, 0, 0], 0)),
            poll_interval: Duration::from_millis(3000),
            controller_only: false,
            protocol: ProtocolVariant::Json,
            bind_retry: Duration::from_secs(60),
        }
    }
}

/// Root of the shared config file; only the hvac service section is read
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    hvac: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

impl BridgeConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?} ({}), using defaults",
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
            "Final hvac configuration: discovery={}:{}, listen={}, poll_interval={:?}, protocol={}, controller_only={}",
            config.host,
            config.port,
            config.listen,
            config.poll_interval,
            config.protocol,
            config.controller_only
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let entries = root
            .services
            .and_then(|s| s.hvac)
            .and_then(|s| s.config)
            .unwrap_or_default();

        for (key, value) in entries {
            match key.as_str() {
                "services.hvac.host" => self.host = value,
                "services.hvac.port" => match value.parse() {
                    Ok(port) => self.port = port,
                    Err(_) => warn!("Ignoring invalid port {:?}", value),
                },
                "services.hvac.listen" => match value.parse() {
                    Ok(listen) => self.listen = listen,
                    Err(_) => warn!("Ignoring invalid listen address {:?}", value),
                },
                "services.hvac.poll_interval" => match humantime::parse_duration(&value) {
                    Ok(interval) => self.poll_interval = interval,
                    Err(_) => warn!("Ignoring invalid poll interval {:?}", value),
                },
                "services.hvac.bind_retry" => match humantime::parse_duration(&value) {
                    Ok(delay) => self.bind_retry = delay,
                    Err(_) => warn!("Ignoring invalid bind retry delay {:?}", value),
                },
                "services.hvac.controller_only" => {
                    if let Some(flag) = parse_flag(&value) {
                        self.controller_only = flag;
                    }
                }
                "services.hvac.protocol" => match value.parse() {
                    Ok(protocol) => self.protocol = protocol,
                    Err(e) => warn!("{}", e),
                },
                _ => {}
            }
        }
    }

    /// Apply `HVAC_*` overrides looked up through `var`
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("HVAC_HOST") {
            info!("Host overridden by environment: {}", host);
            self.host = host;
        }

        if let Some(port) = var("HVAC_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
            info!("Port overridden by environment: {}", port);
        }

        if let Some(ms) = var("HVAC_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval = Duration::from_millis(ms);
            info!("Poll interval overridden by environment: {}ms", ms);
        }

        if let Some(flag) = var("HVAC_CONTROLLER_ONLY").and_then(|v| parse_flag(&v)) {
            self.controller_only = flag;
            info!("Controller-only overridden by environment: {}", flag);
        }

        if let Some(protocol) = var("HVAC_PROTOCOL").and_then(|v| v.parse().ok()) {
            self.protocol = protocol;
            info!("Protocol overridden by environment: {}", protocol);
        }
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }
        if self.bind_retry.is_zero() {
            anyhow::bail!("Bind retry delay must be greater than zero");
        }
        Ok(())
    }

    /// Resolve the discovery target and build the engine settings
    pub async fn engine_config(&self) -> Result<EngineConfig> {
        let discovery = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to resolve {}:{}", self.host, self.port))?
            .find(SocketAddr::is_ipv4)
            .with_context(|| format!("No IPv4 address for {}", self.host))?;

        Ok(EngineConfig {
            discovery,
            controller_only: self.controller_only,
            protocol: self.protocol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.host, "192.168.1.255");
        assert_eq!(config.port, 7000);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.bind_retry, Duration::from_secs(60));
        assert!(!config.controller_only);
        assert_eq!(config.protocol, ProtocolVariant::Json);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
services:
  gateway:
    config:
      services.gateway.port: "8080"
  hvac:
    enabled: true
    executable: ./hvac-bridge
    config:
      services.hvac.host: "10.0.0.255"
      services.hvac.poll_interval: "5s"
      services.hvac.controller_only: "true"
      services.hvac.protocol: "binary"
      services.hvac.port: "not-a-port"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.host, "10.0.0.255");
        assert_eq!(config.port, 7000);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert!(config.controller_only);
        assert_eq!(config.protocol, ProtocolVariant::Binary);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 0)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut config = BridgeConfig::default();
        let env: HashMap<&str, &str> = [
            ("HVAC_HOST", "192.168.0.255"),
            ("HVAC_POLL_INTERVAL_MS", "1500"),
            ("HVAC_CONTROLLER_ONLY", "yes"),
            ("HVAC_PROTOCOL", "xml"),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.host, "192.168.0.255");
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert!(config.controller_only);
        assert_eq!(config.protocol, ProtocolVariant::Json);
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        assert!(BridgeConfig::default().validate().is_ok());

        let mut config = BridgeConfig::default();
        config.apply_overrides(|name| (name == "HVAC_POLL_INTERVAL_MS").then(|| "0".to_string()));
        assert_eq!(config.poll_interval, Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Poll interval"));

        let yaml_content = r#"
services:
  hvac:
    config:
      services.hvac.bind_retry: "0s"
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();
        let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_engine_config_resolves_literal_address() {
        let config = BridgeConfig {
            host: "127.0.0.1".to_string(),
            port: 7001,
            ..BridgeConfig::default()
        };
        let engine = config.engine_config().await.unwrap();
        assert_eq!(engine.discovery, "127.0.0.1:7001".parse().unwrap());
        assert_eq!(engine.protocol, ProtocolVariant::Json);
    }
}
