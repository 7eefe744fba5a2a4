//! Collaborator callback interface.
//!
//! The engine reports everything it learns through [`ControllerEventHandler`].
//! Callbacks run on the controller loop and must not block.

use hvac_wire::Property;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Public identity of a registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Hardware address, the registry key
    pub mac: String,
    /// Friendly name
    pub name: String,
    /// Whether the device sits behind a multi-unit controller
    pub is_sub_device: bool,
    /// MAC of the owning controller
    pub controller_mac: String,
}

/// Public identity of a bound controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    /// Client id used as `tcid`
    pub cid: String,
    /// Hardware address
    pub mac: String,
    /// Friendly name
    pub name: String,
    /// Network address
    pub address: SocketAddr,
    /// Sub-devices reported by the controller
    pub sub_device_count: u32,
}

/// One reported property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    /// Raw wire value
    pub raw: i64,
    /// Symbolic name for enumerated properties
    pub symbolic: Option<&'static str>,
}

impl PropertyChange {
    /// Resolve the symbolic name of `raw` for `property`
    pub fn new(property: Property, raw: i64) -> Self {
        Self {
            raw,
            symbolic: property.symbol_for(raw),
        }
    }
}

/// Reported values keyed by property
pub type PropertyChanges = BTreeMap<Property, PropertyChange>;

/// Trait for receiving controller events
pub trait ControllerEventHandler: Send + Sync + std::fmt::Debug {
    /// Properties of a device changed since its last status report
    fn on_status_changed(&self, device: &DeviceInfo, changes: &PropertyChanges);
    /// A device acknowledged a command; every acknowledged property is listed
    fn on_command_acknowledged(&self, device: &DeviceInfo, changes: &PropertyChanges);
    /// First non-empty status of a device arrived
    fn on_device_ready(&self, device: &DeviceInfo);
    /// A controller completed binding
    fn on_controller_connected(&self, controller: &ControllerInfo);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Captured callback, in call order
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Event {
        Status(String, PropertyChanges),
        Ack(String, PropertyChanges),
        Ready(String),
        Connected(String),
    }

    #[derive(Debug, Default)]
    pub(crate) struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingHandler {
        pub(crate) fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ControllerEventHandler for RecordingHandler {
        fn on_status_changed(&self, device: &DeviceInfo, changes: &PropertyChanges) {
            self.push(Event::Status(device.mac.clone(), changes.clone()));
        }

        fn on_command_acknowledged(&self, device: &DeviceInfo, changes: &PropertyChanges) {
            self.push(Event::Ack(device.mac.clone(), changes.clone()));
        }

        fn on_device_ready(&self, device: &DeviceInfo) {
            self.push(Event::Ready(device.mac.clone()));
        }

        fn on_controller_connected(&self, controller: &ControllerInfo) {
            self.push(Event::Connected(controller.mac.clone()));
        }
    }
}
