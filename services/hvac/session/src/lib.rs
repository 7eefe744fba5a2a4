//! Discovery, binding, device registry, polling and command dispatch for hvac.
//!
//! This crate drives UDP air-conditioner controllers on top of `hvac-wire`:
//! it discovers controllers by broadcast, binds to obtain session keys,
//! enumerates sub-devices, polls status and turns commands into datagrams.
//!
//! ## Features
//!
//! - **Engine**: sans-IO handshake and dispatch, one session per controller
//! - **Registry**: devices keyed by MAC, duplicate announcements rejected
//! - **Differ**: only changed properties reach the status callback
//! - **Command builder**: JSON columns or edited binary frames
//! - **Controller loop**: socket, poll ticks and handle requests in one task
//!
//! ## Example
//!
//! ```rust,no_run
//! use hvac_session::{
//!     bind_udp, Controller, ControllerEventHandler, ControllerInfo, DeviceInfo, EngineConfig,
//!     Poller, PropertyChanges,
//! };
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! impl ControllerEventHandler for Printer {
//!     fn on_status_changed(&self, device: &DeviceInfo, changes: &PropertyChanges) {
//!         println!("{} changed: {:?}", device.mac, changes);
//!     }
//!     fn on_command_acknowledged(&self, device: &DeviceInfo, changes: &PropertyChanges) {
//!         println!("{} acknowledged: {:?}", device.mac, changes);
//!     }
//!     fn on_device_ready(&self, device: &DeviceInfo) {
//!         println!("{} ready", device.mac);
//!     }
//!     fn on_controller_connected(&self, controller: &ControllerInfo) {
//!         println!("bound to {}", controller.name);
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let socket = bind_udp("0.0.0.0:7000".parse()?).await?;
//! let (controller, handle) = Controller::new(
//!     socket,
//!     EngineConfig::default(),
//!     Poller::default(),
//!     Arc::new(Printer),
//! );
//! tokio::spawn(controller.run());
//!
//! handle.set_power("f4911e0000aa", true).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod controller;
pub mod differ;
pub mod error;
pub mod events;
pub mod poller;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export main types
pub use command::{build, Command, ProtocolVariant, TimerKind};
pub use controller::{Controller, ControllerHandle, ControllerStatus, DeviceSnapshot};
pub use differ::{diff, report};
pub use error::SessionError;
pub use events::{ControllerEventHandler, ControllerInfo, DeviceInfo, PropertyChange, PropertyChanges};
pub use poller::{PollAction, Poller, DEFAULT_POLL_INTERVAL};
pub use registry::{DeviceHandle, DeviceRegistry};
pub use session::{
    ControllerSession, Datagram, Engine, EngineConfig, SessionState, DEFAULT_DISCOVERY_HOST,
    DISCOVERY_PORT,
};
pub use transport::{bind_udp, bind_with_retry, DatagramSocket, MemorySocket, MAX_DATAGRAM};
