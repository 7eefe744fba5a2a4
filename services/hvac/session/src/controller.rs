//! Async controller loop and its handle.
//!
//! [`Controller`] owns the socket and the [`Engine`] and multiplexes three
//! sources in one task: requests from [`ControllerHandle`]s, inbound
//! datagrams and poll ticks. All engine state lives in that task, so handles
//! only ever talk to it through channels.

use crate::command::{Command, TimerKind};
use crate::error::SessionError;
use crate::events::{ControllerEventHandler, ControllerInfo, DeviceInfo, PropertyChanges};
use crate::poller::Poller;
use crate::session::{Datagram, Engine, EngineConfig, SessionState};
use crate::transport::{DatagramSocket, MAX_DATAGRAM};
use hvac_wire::{
    AirValve, FanMode, FanSpeed, Mode, ModeChange, Property, PropertyValue, QuietMode, Switch,
    SwingHorizontal, SwingVertical, Temperature, TemperatureUnit, WireError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const REQUEST_CHANNEL_SIZE: usize = 64;

/// Pause after a failed receive so a broken socket cannot spin the loop
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Registered device with its last known values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// Identity
    pub info: DeviceInfo,
    /// Last known property values
    pub values: PropertyChanges,
}

/// Discovered controller with its handshake state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    /// Identity
    pub info: ControllerInfo,
    /// Handshake state
    pub state: SessionState,
}

#[derive(Debug)]
enum ControlRequest {
    Command {
        mac: String,
        command: Command,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Devices {
        reply: oneshot::Sender<Vec<DeviceSnapshot>>,
    },
    Device {
        mac: String,
        reply: oneshot::Sender<Result<DeviceSnapshot, SessionError>>,
    },
    Controllers {
        reply: oneshot::Sender<Vec<ControllerStatus>>,
    },
    Scan,
}

/// Cloneable handle to a running [`Controller`]
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControllerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Send a command to device `mac`; resolves once the datagram is sent
    pub async fn send(&self, mac: &str, command: Command) -> Result<(), SessionError> {
        let mac = mac.to_string();
        self.request(|reply| ControlRequest::Command {
            mac,
            command,
            reply,
        })
        .await?
    }

    async fn set(&self, mac: &str, value: PropertyValue) -> Result<(), SessionError> {
        self.send(mac, Command::Set(value)).await
    }

    /// Switch power
    pub async fn set_power(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Power(Switch::from(on))).await
    }

    /// Set the operating mode
    pub async fn set_mode(&self, mac: &str, mode: Mode) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Mode(mode)).await
    }

    /// Set the target temperature; the value is range-checked for its unit
    pub async fn set_temperature(
        &self,
        mac: &str,
        value: i64,
        unit: TemperatureUnit,
    ) -> Result<(), SessionError> {
        let temperature = Temperature::new(value, unit)?;
        self.set(mac, PropertyValue::Temperature(temperature)).await
    }

    /// Set the fan speed
    pub async fn set_fan_speed(&self, mac: &str, speed: FanSpeed) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::FanSpeed(speed)).await
    }

    /// Set the fresh-air valve
    pub async fn set_air(&self, mac: &str, air: AirValve) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Air(air)).await
    }

    /// Switch blow (X-fan)
    pub async fn set_blow(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Blow(Switch::from(on))).await
    }

    /// Switch health mode
    pub async fn set_health(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Health(Switch::from(on))).await
    }

    /// Switch sleep mode
    pub async fn set_sleep(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Sleep(Switch::from(on))).await
    }

    /// Switch the display lights
    pub async fn set_lights(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Lights(Switch::from(on))).await
    }

    /// Set horizontal swing
    pub async fn set_swing_horizontal(
        &self,
        mac: &str,
        swing: SwingHorizontal,
    ) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::SwingHor(swing)).await
    }

    /// Set vertical swing
    pub async fn set_swing_vertical(
        &self,
        mac: &str,
        swing: SwingVertical,
    ) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::SwingVert(swing)).await
    }

    /// Set quiet mode
    pub async fn set_quiet(&self, mac: &str, quiet: QuietMode) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Quiet(quiet)).await
    }

    /// Switch turbo
    pub async fn set_turbo(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::Turbo(Switch::from(on))).await
    }

    /// Switch power save
    pub async fn set_power_save(&self, mac: &str, on: bool) -> Result<(), SessionError> {
        self.set(mac, PropertyValue::PowerSave(Switch::from(on))).await
    }

    /// Set a property by name from its textual value, e.g. `("mode", "cool")`
    pub async fn set_property(&self, mac: &str, name: &str, value: &str) -> Result<(), SessionError> {
        let property = Property::from_name(name).ok_or_else(|| WireError::InvalidCommandValue {
            property: "property",
            value: name.to_string(),
        })?;
        let value = PropertyValue::parse(property, value)?;
        self.set(mac, value).await
    }

    /// Change mode together with its dependent settings
    pub async fn change_mode(&self, mac: &str, change: ModeChange) -> Result<(), SessionError> {
        self.send(mac, Command::ChangeMode(change)).await
    }

    /// Set the fan, including stepless and quiet settings
    pub async fn set_fan_mode(&self, mac: &str, fan: FanMode) -> Result<(), SessionError> {
        self.send(mac, Command::SetFan(fan)).await
    }

    /// Arm or disarm a timer
    pub async fn set_timer(
        &self,
        mac: &str,
        kind: TimerKind,
        armed: bool,
        minutes: Option<u16>,
    ) -> Result<(), SessionError> {
        self.send(
            mac,
            Command::SetTimer {
                kind,
                armed,
                minutes,
            },
        )
        .await
    }

    /// Every registered device
    pub async fn devices(&self) -> Result<Vec<DeviceSnapshot>, SessionError> {
        self.request(|reply| ControlRequest::Devices { reply }).await
    }

    /// One device's last known state
    pub async fn state(&self, mac: &str) -> Result<DeviceSnapshot, SessionError> {
        let mac = mac.to_string();
        self.request(|reply| ControlRequest::Device { mac, reply })
            .await?
    }

    /// Every discovered controller
    pub async fn controllers(&self) -> Result<Vec<ControllerStatus>, SessionError> {
        self.request(|reply| ControlRequest::Controllers { reply })
            .await
    }

    /// Send the discovery probe now
    pub async fn scan(&self) -> Result<(), SessionError> {
        self.tx
            .send(ControlRequest::Scan)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Controller loop over one socket
pub struct Controller<S> {
    socket: S,
    engine: Engine,
    poller: Poller,
    requests: mpsc::Receiver<ControlRequest>,
}

impl<S: DatagramSocket> Controller<S> {
    /// Create the loop and a handle to it
    pub fn new(
        socket: S,
        config: EngineConfig,
        poller: Poller,
        handler: Arc<dyn ControllerEventHandler>,
    ) -> (Self, ControllerHandle) {
        let (tx, requests) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let controller = Self {
            socket,
            engine: Engine::new(config, handler),
            poller,
            requests,
        };
        (controller, ControllerHandle { tx })
    }

    /// Run until every handle is dropped.
    ///
    /// Transport failures are logged and never end the loop; the poller keeps
    /// scanning until a controller answers.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!(
            "Starting controller loop (protocol {}, poll every {:?})",
            self.engine.config().protocol,
            self.poller.period()
        );

        let probe = self.engine.scan();
        if let Err(e) = self.transmit(&probe).await {
            warn!("Initial scan failed: {}", e);
        }

        let mut ticker = self.poller.interval();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                biased;

                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.serve(request).await,
                        None => {
                            info!("All controller handles dropped, stopping");
                            return Ok(());
                        }
                    }
                }

                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((n, from)) => {
                            let replies = self.engine.handle_datagram(from, &buf[..n]);
                            self.transmit_all(replies).await;
                        }
                        Err(e) => {
                            warn!("Failed to receive datagram: {}", e);
                            tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                        }
                    }
                }

                _ = ticker.tick() => {
                    let datagrams = self.engine.tick(&self.poller);
                    debug!("Poll tick: {} requests", datagrams.len());
                    self.transmit_all(datagrams).await;
                }
            }
        }
    }

    async fn serve(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Command {
                mac,
                command,
                reply,
            } => {
                let result = match self.engine.command(&mac, &command) {
                    Ok(datagram) => self.transmit(&datagram).await,
                    Err(e) => {
                        warn!("Command for {} rejected: {}", mac, e);
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            ControlRequest::Devices { reply } => {
                let devices = self
                    .engine
                    .registry()
                    .iter()
                    .map(|d| DeviceSnapshot {
                        info: d.info().clone(),
                        values: d.snapshot(),
                    })
                    .collect();
                let _ = reply.send(devices);
            }
            ControlRequest::Device { mac, reply } => {
                let device = self
                    .engine
                    .registry()
                    .get(&mac)
                    .map(|d| DeviceSnapshot {
                        info: d.info().clone(),
                        values: d.snapshot(),
                    })
                    .ok_or(SessionError::UnknownDevice(mac));
                let _ = reply.send(device);
            }
            ControlRequest::Controllers { reply } => {
                let controllers = self
                    .engine
                    .sessions()
                    .values()
                    .map(|s| ControllerStatus {
                        info: s.info(),
                        state: s.state(),
                    })
                    .collect();
                let _ = reply.send(controllers);
            }
            ControlRequest::Scan => {
                let probe = self.engine.scan();
                if let Err(e) = self.transmit(&probe).await {
                    warn!("{}", e);
                }
            }
        }
    }

    async fn transmit(&self, datagram: &Datagram) -> Result<(), SessionError> {
        self.socket
            .send_to(&datagram.payload, datagram.target)
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Transport(format!("send to {}: {}", datagram.target, e)))
    }

    async fn transmit_all(&self, datagrams: Vec<Datagram>) {
        for datagram in &datagrams {
            if let Err(e) = self.transmit(datagram).await {
                warn!("{}", e);
            }
        }
    }
}
