//! Controller sessions and the protocol engine.
//!
//! [`Engine`] owns every controller session and the device registry of one
//! socket. It is sans-IO: inbound datagrams, poll ticks and commands go in,
//! [`Datagram`]s to send come out, and collaborator callbacks fire along the
//! way. The async loop in [`crate::controller`] feeds it from a socket.
//!
//! Per controller the handshake runs `Unbound -> AwaitingHandshakeAck -> Bound`:
//! a `dev` answer to the discovery probe creates the session and triggers a
//! `bind`, and `bindok` hands over the session key used from then on.

use crate::command::{self, Command, ProtocolVariant};
use crate::differ;
use crate::error::SessionError;
use crate::events::{ControllerEventHandler, ControllerInfo, DeviceInfo};
use crate::poller::{PollAction, Poller};
use crate::registry::DeviceRegistry;
use hvac_wire::{
    Announcement, BinaryStatus, CipherKey, Envelope, Pack, Property, Request, StatusPayload,
    SubDeviceEntry, WireError, DEFAULT_KEY, SCAN_REQUEST,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Port controllers listen on
pub const DISCOVERY_PORT: u16 = 7000;

/// Default discovery target: the usual home-LAN broadcast address
pub const DEFAULT_DISCOVERY_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 255);

/// Handshake state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Discovered, bind not sent yet
    Unbound,
    /// Bind sent, waiting for `bindok`
    AwaitingHandshakeAck,
    /// Session key received
    Bound,
}

/// One datagram to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Destination
    pub target: SocketAddr,
    /// Serialized envelope or probe
    pub payload: Vec<u8>,
}

/// State kept for one discovered controller
#[derive(Debug, Clone)]
pub struct ControllerSession {
    cid: String,
    uid: u64,
    mac: String,
    name: String,
    address: SocketAddr,
    state: SessionState,
    key: Option<CipherKey>,
    sub_device_count: u32,
    pending_page: Option<u32>,
    request_counter: u64,
}

impl ControllerSession {
    fn discovered(envelope: &Envelope, announcement: &Announcement, address: SocketAddr) -> Self {
        Self {
            cid: envelope.cid.clone(),
            uid: envelope.uid,
            mac: announcement.mac.clone(),
            name: announcement.name.clone(),
            address,
            state: SessionState::Unbound,
            key: None,
            sub_device_count: announcement.sub_count,
            pending_page: None,
            request_counter: 0,
        }
    }

    /// Client id, sent back as `tcid`
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// Controller MAC
    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// Friendly name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the controller answered from
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Handshake state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the bind completed
    pub fn is_bound(&self) -> bool {
        self.state == SessionState::Bound
    }

    /// Key packs to this controller are sealed with
    pub fn key(&self) -> CipherKey {
        self.key.unwrap_or(DEFAULT_KEY)
    }

    /// Sub-devices the controller announced
    pub fn sub_device_count(&self) -> u32 {
        self.sub_device_count
    }

    /// Sub-device page requested but not answered yet
    pub fn pending_page(&self) -> Option<u32> {
        self.pending_page
    }

    /// Requests sealed for this controller so far
    pub fn request_counter(&self) -> u64 {
        self.request_counter
    }

    /// Public identity
    pub fn info(&self) -> ControllerInfo {
        ControllerInfo {
            cid: self.cid.clone(),
            mac: self.mac.clone(),
            name: self.name.clone(),
            address: self.address,
            sub_device_count: self.sub_device_count,
        }
    }

    fn seal(&mut self, request: &Request) -> Result<Datagram, SessionError> {
        let envelope = Envelope::seal(request, &self.key(), &self.cid, self.uid);
        self.request_counter += 1;
        debug!(
            "Sending {} #{} to {} ({})",
            request.kind(),
            self.request_counter,
            self.name,
            self.address
        );
        Ok(Datagram {
            target: self.address,
            payload: envelope.to_bytes()?,
        })
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Where the discovery probe goes, usually a broadcast address
    pub discovery: SocketAddr,
    /// Register sub-devices only, not the controller itself
    pub controller_only: bool,
    /// Protocol variant of the devices
    pub protocol: ProtocolVariant,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery: SocketAddr::V4(SocketAddrV4::new(DEFAULT_DISCOVERY_HOST, DISCOVERY_PORT)),
            controller_only: false,
            protocol: ProtocolVariant::Json,
        }
    }
}

/// Protocol engine for every controller reachable through one socket
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    sessions: BTreeMap<String, ControllerSession>,
    registry: DeviceRegistry,
    handler: Arc<dyn ControllerEventHandler>,
}

impl Engine {
    /// Create an engine reporting to `handler`
    pub fn new(config: EngineConfig, handler: Arc<dyn ControllerEventHandler>) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            registry: DeviceRegistry::new(),
            handler,
        }
    }

    /// Settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sessions by controller MAC
    pub fn sessions(&self) -> &BTreeMap<String, ControllerSession> {
        &self.sessions
    }

    /// Session of one controller
    pub fn session(&self, mac: &str) -> Option<&ControllerSession> {
        self.sessions.get(mac)
    }

    /// Registered devices
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The plaintext discovery probe
    pub fn scan(&self) -> Datagram {
        info!("Scanning for controllers at {}", self.config.discovery);
        Datagram {
            target: self.config.discovery,
            payload: SCAN_REQUEST.to_vec(),
        }
    }

    /// Process one received datagram; failures are logged and the datagram dropped
    pub fn handle_datagram(&mut self, from: SocketAddr, bytes: &[u8]) -> Vec<Datagram> {
        match self.process(from, bytes) {
            Ok(replies) => replies,
            Err(SessionError::Wire(WireError::UnknownMessageType(kind))) => {
                info!("Unknown message of type {} from {}, ignored", kind, from);
                Vec::new()
            }
            Err(SessionError::DuplicateDeviceRegistration(mac)) => {
                info!("Found a duplicate device {}, skipped", mac);
                Vec::new()
            }
            Err(e) => {
                warn!("Dropping datagram from {}: {}", from, e);
                Vec::new()
            }
        }
    }

    /// Work for one poll tick
    pub fn tick(&mut self, poller: &Poller) -> Vec<Datagram> {
        let actions = poller.plan(self.sessions.values(), &self.registry);
        actions
            .into_iter()
            .filter_map(|action| match self.poll(action) {
                Ok(datagram) => Some(datagram),
                Err(e) => {
                    warn!("Skipping poll request: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Build the datagram carrying `command` for device `mac`
    pub fn command(&mut self, mac: &str, command: &Command) -> Result<Datagram, SessionError> {
        let device = self
            .registry
            .get(mac)
            .ok_or_else(|| SessionError::UnknownDevice(mac.to_string()))?;
        let session = self
            .sessions
            .get_mut(&device.info().controller_mac)
            .ok_or_else(|| SessionError::UnknownDevice(mac.to_string()))?;
        if !session.is_bound() {
            return Err(SessionError::UnboundController(session.mac.clone()));
        }

        let request = command::build(device, command, self.config.protocol)?;
        info!("Command for {} {}: {:?}", device.info().name, mac, command);
        session.seal(&request)
    }

    fn process(&mut self, from: SocketAddr, bytes: &[u8]) -> Result<Vec<Datagram>, SessionError> {
        let envelope = Envelope::parse(bytes)?;
        let key = self
            .session_at(from)
            .map(|s| s.key())
            .unwrap_or(DEFAULT_KEY);

        let pack = match envelope.open(&key) {
            Ok(pack) => pack,
            Err(WireError::DecryptionFailure(reason)) if !key.is_default() => {
                debug!(
                    "Session key failed for {} ({}), retrying with default key",
                    from, reason
                );
                envelope.open(&DEFAULT_KEY)?
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Received {} from {}", pack.kind(), from);

        match pack {
            Pack::Dev(announcement) => self.on_dev(&envelope, announcement, from),
            Pack::BindOk { key, .. } => self.on_bind_ok(from, &key),
            Pack::SubList { page, devices } => self.on_sub_list(from, page, devices),
            Pack::Dat { mac, payload } => self.on_status(from, &mac, payload, false),
            Pack::Res { mac, payload } => self.on_status(from, &mac, payload, true),
        }
    }

    fn session_at(&self, from: SocketAddr) -> Option<&ControllerSession> {
        self.sessions.values().find(|s| s.address == from)
    }

    fn on_dev(
        &mut self,
        envelope: &Envelope,
        announcement: Announcement,
        from: SocketAddr,
    ) -> Result<Vec<Datagram>, SessionError> {
        if self.sessions.contains_key(&announcement.mac) {
            return Err(SessionError::DuplicateDeviceRegistration(announcement.mac));
        }

        let mut session = ControllerSession::discovered(envelope, &announcement, from);
        info!(
            "New controller registered: {} {} at {} ({} sub-devices)",
            session.name, session.mac, from, session.sub_device_count
        );

        if !self.config.controller_only {
            let info = DeviceInfo {
                mac: announcement.mac.clone(),
                name: announcement.name.clone(),
                is_sub_device: false,
                controller_mac: announcement.mac.clone(),
            };
            if let Err(e) = self.registry.register(info) {
                warn!("Controller device not registered: {}", e);
            }
        }

        let bind = session.seal(&Request::Bind {
            mac: session.mac.clone(),
        })?;
        session.state = SessionState::AwaitingHandshakeAck;
        self.sessions.insert(announcement.mac, session);
        Ok(vec![bind])
    }

    fn on_bind_ok(&mut self, from: SocketAddr, key: &str) -> Result<Vec<Datagram>, SessionError> {
        let session = self
            .sessions
            .values_mut()
            .find(|s| s.address == from)
            .ok_or(SessionError::UnknownController(from))?;

        let key = CipherKey::parse(key)?;
        let first = !session.is_bound();
        session.key = Some(key);
        session.state = SessionState::Bound;
        if !first {
            debug!("Controller {} re-confirmed its binding", session.name);
            return Ok(Vec::new());
        }

        info!("Controller {} is bound", session.name);
        self.handler.on_controller_connected(&session.info());

        if session.sub_device_count == 0 {
            return Ok(Vec::new());
        }
        session.pending_page = Some(0);
        let request = Request::SubDevices {
            mac: session.mac.clone(),
            page: 0,
        };
        Ok(vec![session.seal(&request)?])
    }

    fn on_sub_list(
        &mut self,
        from: SocketAddr,
        page: u32,
        devices: Vec<SubDeviceEntry>,
    ) -> Result<Vec<Datagram>, SessionError> {
        let session = self
            .sessions
            .values_mut()
            .find(|s| s.address == from)
            .ok_or(SessionError::UnknownController(from))?;
        if !session.is_bound() {
            return Err(SessionError::UnboundController(session.mac.clone()));
        }

        if devices.is_empty() {
            warn!(
                "Controller {} returned empty sub-device page {}, stopping enumeration at {} of {}",
                session.name,
                page,
                self.registry.sub_device_count(&session.mac),
                session.sub_device_count
            );
            session.pending_page = None;
            return Ok(Vec::new());
        }

        for entry in devices {
            let info = DeviceInfo {
                mac: entry.mac,
                name: entry.name,
                is_sub_device: true,
                controller_mac: session.mac.clone(),
            };
            if let Err(e) = self.registry.register(info) {
                info!("{}, skipped", e);
            }
        }

        let known = self.registry.sub_device_count(&session.mac);
        if known < session.sub_device_count as usize {
            let next = page + 1;
            session.pending_page = Some(next);
            let request = Request::SubDevices {
                mac: session.mac.clone(),
                page: next,
            };
            return Ok(vec![session.seal(&request)?]);
        }

        info!(
            "Controller {} sub-device enumeration complete ({} devices)",
            session.name, known
        );
        session.pending_page = None;
        Ok(Vec::new())
    }

    fn on_status(
        &mut self,
        from: SocketAddr,
        mac: &str,
        payload: StatusPayload,
        acknowledged: bool,
    ) -> Result<Vec<Datagram>, SessionError> {
        let session = self
            .session_at(from)
            .ok_or(SessionError::UnknownController(from))?;
        if !session.is_bound() {
            return Err(SessionError::UnboundController(session.mac.clone()));
        }
        let controller_mac = session.mac.clone();
        let device = match self.registry.get_mut(mac) {
            Some(device) if device.info().controller_mac == controller_mac => device,
            _ => return Err(SessionError::UnknownDevice(mac.to_string())),
        };

        let columns: Vec<(String, i64)> = match payload {
            StatusPayload::Columns(columns) => columns,
            StatusPayload::Binary(frame) => {
                let columns = BinaryStatus::decode(&frame)
                    .columns()
                    .into_iter()
                    .map(|(code, raw)| (code.to_string(), raw))
                    .collect();
                device.store_frame(frame);
                columns
            }
        };

        if acknowledged {
            let changes = differ::report(&columns);
            device.merge(&columns);
            self.handler.on_command_acknowledged(device.info(), &changes);
        } else {
            let changes = differ::diff(device.last_known(), &columns);
            device.merge(&columns);
            if !changes.is_empty() {
                self.handler.on_status_changed(device.info(), &changes);
            }
        }

        if device.take_ready() {
            info!("Device {} {} is ready", device.info().name, mac);
            self.handler.on_device_ready(device.info());
        }
        Ok(Vec::new())
    }

    fn poll(&mut self, action: PollAction) -> Result<Datagram, SessionError> {
        let (controller, request) = match action {
            PollAction::Scan => return Ok(self.scan()),
            PollAction::Bind { controller } => {
                debug!("Bind to {} unanswered, retrying", controller);
                let request = Request::Bind {
                    mac: controller.clone(),
                };
                (controller, request)
            }
            PollAction::SubDevices { controller, page } => {
                let request = Request::SubDevices {
                    mac: controller.clone(),
                    page,
                };
                (controller, request)
            }
            PollAction::Status { controller, device } => {
                let request = match self.config.protocol {
                    ProtocolVariant::Json => Request::Status {
                        mac: device,
                        cols: Property::ALL.iter().map(|p| p.code()).collect(),
                    },
                    ProtocolVariant::Binary => Request::BinaryStatus { mac: device },
                };
                (controller, request)
            }
        };

        let session = self
            .sessions
            .get_mut(&controller)
            .ok_or(SessionError::UnknownDevice(controller))?;
        session.seal(&request)
    }
}
