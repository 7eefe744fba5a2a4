//! Device registry keyed by hardware address.

use crate::error::SessionError;
use crate::events::{DeviceInfo, PropertyChange, PropertyChanges};
use hvac_wire::{Property, StatusFrame};
use std::collections::BTreeMap;
use tracing::info;

/// Registry entry for one appliance
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    info: DeviceInfo,
    last_known: BTreeMap<String, i64>,
    last_frame: Option<StatusFrame>,
    ready_notified: bool,
}

impl DeviceHandle {
    fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            last_known: BTreeMap::new(),
            last_frame: None,
            ready_notified: false,
        }
    }

    /// Public identity
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Hardware address
    pub fn mac(&self) -> &str {
        &self.info.mac
    }

    /// Last raw value per wire code
    pub fn last_known(&self) -> &BTreeMap<String, i64> {
        &self.last_known
    }

    /// Last raw value of one property
    pub fn raw(&self, property: Property) -> Option<i64> {
        self.last_known.get(property.code()).copied()
    }

    /// Last known values of every described property
    pub fn snapshot(&self) -> PropertyChanges {
        self.last_known
            .iter()
            .filter_map(|(code, raw)| {
                Property::from_code(code).map(|p| (p, PropertyChange::new(p, *raw)))
            })
            .collect()
    }

    /// Last binary frame, if the device speaks the binary variant
    pub fn last_frame(&self) -> Option<&StatusFrame> {
        self.last_frame.as_ref()
    }

    pub(crate) fn merge<'a>(&mut self, columns: impl IntoIterator<Item = &'a (String, i64)>) {
        for (code, raw) in columns {
            self.last_known.insert(code.clone(), *raw);
        }
    }

    pub(crate) fn store_frame(&mut self, frame: StatusFrame) {
        self.last_frame = Some(frame);
    }

    /// Flip the ready flag once the first values are known; true exactly once
    pub(crate) fn take_ready(&mut self) -> bool {
        if self.ready_notified || self.last_known.is_empty() {
            return false;
        }
        self.ready_notified = true;
        true
    }
}

/// All devices known to one engine, across every controller
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceHandle>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; an already-known MAC is rejected
    pub fn register(&mut self, info: DeviceInfo) -> Result<&mut DeviceHandle, SessionError> {
        if self.devices.contains_key(&info.mac) {
            return Err(SessionError::DuplicateDeviceRegistration(info.mac));
        }
        info!(
            "New device registered: {} {} (controller {}{})",
            info.name,
            info.mac,
            info.controller_mac,
            if info.is_sub_device { ", sub-device" } else { "" }
        );
        let mac = info.mac.clone();
        Ok(self.devices.entry(mac).or_insert(DeviceHandle::new(info)))
    }

    /// Look up a device
    pub fn get(&self, mac: &str) -> Option<&DeviceHandle> {
        self.devices.get(mac)
    }

    /// Look up a device for update
    pub fn get_mut(&mut self, mac: &str) -> Option<&mut DeviceHandle> {
        self.devices.get_mut(mac)
    }

    /// Whether a MAC is registered
    pub fn contains(&self, mac: &str) -> bool {
        self.devices.contains_key(mac)
    }

    /// Devices owned by a controller
    pub fn devices_of<'a>(
        &'a self,
        controller_mac: &'a str,
    ) -> impl Iterator<Item = &'a DeviceHandle> + 'a {
        self.devices
            .values()
            .filter(move |d| d.info.controller_mac == controller_mac)
    }

    /// Number of sub-devices registered for a controller
    pub fn sub_device_count(&self, controller_mac: &str) -> usize {
        self.devices_of(controller_mac)
            .filter(|d| d.info.is_sub_device)
            .count()
    }

    /// Every registered device
    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.values()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is registered
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(mac: &str, sub: bool) -> DeviceInfo {
        DeviceInfo {
            mac: mac.to_string(),
            name: format!("unit-{mac}"),
            is_sub_device: sub,
            controller_mac: "c0".to_string(),
        }
    }

    #[test]
    fn test_duplicate_mac_is_rejected() {
        let mut registry = DeviceRegistry::new();
        registry.register(info("a1", false)).unwrap();
        assert_eq!(
            registry.register(info("a1", true)).unwrap_err(),
            SessionError::DuplicateDeviceRegistration("a1".to_string())
        );
        assert_eq!(registry.len(), 1);
        assert!(!registry.get("a1").unwrap().info().is_sub_device);
    }

    #[test]
    fn test_sub_device_count() {
        let mut registry = DeviceRegistry::new();
        registry.register(info("c0", false)).unwrap();
        registry.register(info("s1", true)).unwrap();
        registry.register(info("s2", true)).unwrap();
        assert_eq!(registry.sub_device_count("c0"), 2);
        assert_eq!(registry.devices_of("c0").count(), 3);
        assert_eq!(registry.sub_device_count("other"), 0);
    }

    #[test]
    fn test_ready_fires_once_after_values() {
        let mut registry = DeviceRegistry::new();
        let device = registry.register(info("a1", false)).unwrap();
        assert!(!device.take_ready());
        device.merge(&[("Pow".to_string(), 1), ("TemSen".to_string(), 61)]);
        assert!(device.take_ready());
        assert!(!device.take_ready());

        let snapshot = device.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&Property::Power].symbolic, Some("on"));
        assert_eq!(device.raw(Property::Power), Some(1));
    }
}
