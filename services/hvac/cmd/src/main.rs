//! HVAC bridge binary.
//!
//! Discovers UDP air-conditioner controllers on the local network, binds to
//! them, polls their devices and reports every state change as a structured
//! log line.

use clap::Parser;
use hvac_session::{
    bind_with_retry, Controller, ControllerEventHandler, ControllerInfo, DeviceInfo, Poller,
    PropertyChanges, ProtocolVariant,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::BridgeConfig;
use logging::BridgeLogFormatter;

// Component logging macros are defined in logging.rs and available via #[macro_export]

/// UDP air-conditioner bridge
#[derive(Parser, Debug)]
#[command(name = "hvac-bridge", version, about = "Bridge for UDP air-conditioner controllers")]
struct Args {
    /// Discovery host, usually the LAN broadcast address
    #[arg(long)]
    host: Option<String>,

    /// Controller port
    #[arg(long)]
    port: Option<u16>,

    /// Local bind address, e.g. 0.0.0.0:0
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Status polling interval, e.g. 3s
    #[arg(long)]
    poll_interval: Option<humantime::Duration>,

    /// Register sub-devices only, not the controller itself
    #[arg(long)]
    controller_only: bool,

    /// Device protocol variant (json, binary)
    #[arg(long)]
    protocol: Option<ProtocolVariant>,

    /// Delay between socket bind attempts, e.g. 60s
    #[arg(long)]
    bind_retry: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = Duration::from(interval);
        }
        if self.controller_only {
            config.controller_only = true;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(delay) = self.bind_retry {
            config.bind_retry = Duration::from(delay);
        }
    }
}

/// Collaborator that logs every controller event
#[derive(Debug, Default)]
struct LoggingEventHandler;

fn describe_changes(changes: &PropertyChanges) -> String {
    changes
        .iter()
        .map(|(property, change)| match change.symbolic {
            Some(symbol) => format!("{}={}", property.name(), symbol),
            None => format!("{}={}", property.name(), change.raw),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl ControllerEventHandler for LoggingEventHandler {
    fn on_status_changed(&self, device: &DeviceInfo, changes: &PropertyChanges) {
        component_info!(
            "events",
            mac = %device.mac,
            "Status of {} changed: {}",
            device.name,
            describe_changes(changes)
        );
    }

    fn on_command_acknowledged(&self, device: &DeviceInfo, changes: &PropertyChanges) {
        component_info!(
            "events",
            mac = %device.mac,
            "{} acknowledged: {}",
            device.name,
            describe_changes(changes)
        );
    }

    fn on_device_ready(&self, device: &DeviceInfo) {
        component_info!(
            "events",
            mac = %device.mac,
            controller = %device.controller_mac,
            "Device {} is ready{}",
            device.name,
            if device.is_sub_device { " (sub-device)" } else { "" }
        );
    }

    fn on_controller_connected(&self, controller: &ControllerInfo) {
        component_info!(
            "events",
            mac = %controller.mac,
            "Connected to controller {} at {} with {} sub-devices",
            controller.name,
            controller.address,
            controller.sub_device_count
        );
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("hvac_bridge={}", args.log_level).parse()?)
        .add_directive(format!("hvac_session={}", args.log_level).parse()?)
        .add_directive(format!("hvac_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(BridgeLogFormatter::new("hvac-bridge"))
        .init();

    info!("Starting hvac bridge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = BridgeConfig::load_from_file(&args.config)?;
    args.apply(&mut config);
    config.validate()?;
    let engine_config = config.engine_config().await?;

    let socket = bind_with_retry(config.listen, config.bind_retry).await;
    let (controller, handle) = Controller::new(
        socket,
        engine_config,
        Poller::new(config.poll_interval),
        Arc::new(LoggingEventHandler),
    );
    let mut controller_task = tokio::spawn(controller.run());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        result = &mut controller_task => {
            match result {
                Ok(Ok(())) => info!("Controller loop finished"),
                Ok(Err(e)) => component_warn!("controller", "Controller loop stopped: {}", e),
                Err(e) => anyhow::bail!("Controller task failed: {}", e),
            }
        }
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    match handle.devices().await {
        Ok(devices) => info!("Shutting down with {} registered devices", devices.len()),
        Err(e) => component_debug!("shutdown", "Device summary unavailable: {}", e),
    }
    drop(handle);
    controller_task.abort();

    info!("hvac bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_session::PropertyChange;
    use hvac_wire::Property;

    #[test]
    fn test_describe_changes() {
        let changes: PropertyChanges = [
            (Property::Power, PropertyChange::new(Property::Power, 1)),
            (Property::Temperature, PropertyChange::new(Property::Temperature, 24)),
        ]
        .into_iter()
        .collect();
        assert_eq!(describe_changes(&changes), "power=on temperature=24");
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "hvac-bridge",
            "--host",
            "10.1.1.255",
            "--poll-interval",
            "10s",
            "--protocol",
            "binary",
            "--controller-only",
        ]);
        let mut config = BridgeConfig::default();
        args.apply(&mut config);
        assert_eq!(config.host, "10.1.1.255");
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.protocol, ProtocolVariant::Binary);
        assert!(config.controller_only);
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_zero_poll_interval_flag_fails_validation() {
        let args = Args::parse_from(["hvac-bridge", "--poll-interval", "0s"]);
        let mut config = BridgeConfig::default();
        args.apply(&mut config);
        assert!(config.validate().is_err());
    }
}
