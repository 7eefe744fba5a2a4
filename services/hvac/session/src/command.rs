//! Command builder.
//!
//! Turns a validated [`Command`] into exactly one outbound [`Request`] for a
//! device. JSON-variant devices get `opt`/`p` columns; binary-variant devices
//! get an edited copy of their last status frame with every side effect of the
//! change folded into the same frame. Nothing here touches the network.

use crate::error::SessionError;
use crate::registry::DeviceHandle;
use hvac_wire::{
    FanMode, FanSpeed, FrameEditor, ModeChange, Property, PropertyValue, QuietMode, Request,
    Switch, Temperature, TemperatureUnit,
};
use serde::Deserialize;
use std::fmt;

/// Protocol variant spoken by the devices of one engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// `cols`/`dat` and `opt`/`p` columns
    #[default]
    Json,
    /// Bit-packed status frames in the `bin` field
    Binary,
}

impl std::str::FromStr for ProtocolVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ProtocolVariant::Json),
            "binary" => Ok(ProtocolVariant::Binary),
            other => Err(format!("unknown protocol variant {other:?}")),
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVariant::Json => f.write_str("json"),
            ProtocolVariant::Binary => f.write_str("binary"),
        }
    }
}

/// Which scheduled timer a command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Switch on at the scheduled time
    On,
    /// Switch off at the scheduled time
    Off,
}

/// One outbound change for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set one property
    Set(PropertyValue),
    /// Change mode, optionally with temperature, fan and swing in the same frame
    ChangeMode(ModeChange),
    /// Set the fan, including stepless and quiet settings
    SetFan(FanMode),
    /// Arm or disarm a scheduled timer (binary variant only)
    SetTimer {
        /// Timer addressed
        kind: TimerKind,
        /// Armed after the command
        armed: bool,
        /// New time in minutes since midnight, keeping the stored one if absent
        minutes: Option<u16>,
    },
}

impl From<PropertyValue> for Command {
    fn from(value: PropertyValue) -> Self {
        Command::Set(value)
    }
}

/// Build the request that applies `command` to `device`
pub fn build(
    device: &DeviceHandle,
    command: &Command,
    protocol: ProtocolVariant,
) -> Result<Request, SessionError> {
    match protocol {
        ProtocolVariant::Json => build_columns(device, command),
        ProtocolVariant::Binary => build_frame(device, command),
    }
}

fn unsupported(device: &DeviceHandle, property: &'static str) -> SessionError {
    SessionError::UnsupportedProperty {
        mac: device.mac().to_string(),
        property,
    }
}

fn fan_pairs(
    device: &DeviceHandle,
    fan: FanMode,
) -> Result<Vec<(&'static str, i64)>, SessionError> {
    let value = match fan {
        FanMode::Level(level) => PropertyValue::FanSpeed(FanSpeed::from_code(i64::from(level))?),
        FanMode::Quiet => PropertyValue::Quiet(QuietMode::Mode1),
        FanMode::Turbo => PropertyValue::Turbo(Switch::On),
        FanMode::Stepless(_) => return Err(unsupported(device, "steplessFan")),
    };
    Ok(value.wire_pairs())
}

fn build_columns(device: &DeviceHandle, command: &Command) -> Result<Request, SessionError> {
    let pairs = match *command {
        Command::Set(value) => value.wire_pairs(),
        Command::SetFan(fan) => fan_pairs(device, fan)?,
        Command::ChangeMode(change) => {
            let mut pairs = PropertyValue::Mode(change.mode).wire_pairs();
            if let Some(t) = change.temperature {
                let unit = device
                    .raw(Property::TemperatureUnit)
                    .and_then(|raw| TemperatureUnit::from_code(raw).ok())
                    .unwrap_or(TemperatureUnit::Celsius);
                let value = PropertyValue::Temperature(Temperature::new(i64::from(t), unit)?);
                pairs.extend(value.wire_pairs());
            }
            if let Some(fan) = change.fan {
                pairs.extend(fan_pairs(device, fan)?);
            }
            if let Some(swing) = change.swing_horizontal {
                pairs.extend(PropertyValue::SwingHor(swing).wire_pairs());
            }
            if let Some(swing) = change.swing_vertical {
                pairs.extend(PropertyValue::SwingVert(swing).wire_pairs());
            }
            pairs
        }
        Command::SetTimer { .. } => return Err(unsupported(device, "timer")),
    };

    let (opt, p) = pairs.into_iter().unzip();
    let info = device.info();
    Ok(Request::Command {
        opt,
        p,
        sub: info.is_sub_device.then(|| info.mac.clone()),
    })
}

fn build_frame(device: &DeviceHandle, command: &Command) -> Result<Request, SessionError> {
    let last = device
        .last_frame()
        .ok_or_else(|| SessionError::NoStatusFrame(device.mac().to_string()))?;

    let mut editor = FrameEditor::new(last);
    match *command {
        Command::Set(PropertyValue::Air(_)) => return Err(unsupported(device, "air")),
        Command::Set(value) => {
            editor.apply(value)?;
        }
        Command::ChangeMode(change) => {
            editor.mode(change)?;
        }
        Command::SetFan(fan) => {
            editor.fan(fan)?;
        }
        Command::SetTimer {
            kind: TimerKind::On,
            armed,
            minutes,
        } => {
            editor.on_timer(armed, minutes);
        }
        Command::SetTimer {
            kind: TimerKind::Off,
            armed,
            minutes,
        } => {
            editor.off_timer(armed, minutes);
        }
    }

    Ok(Request::BinaryCommand {
        mac: device.mac().to_string(),
        frame: editor.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DeviceInfo;
    use crate::registry::DeviceRegistry;
    use hvac_wire::{
        checksum, AirValve, BinaryStatus, Field, Mode, StatusFrame, FRAME_TYPE_COMMAND,
    };

    fn registry_with(mac: &str, sub: bool) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry
            .register(DeviceInfo {
                mac: mac.to_string(),
                name: "unit".to_string(),
                is_sub_device: sub,
                controller_mac: "c0".to_string(),
            })
            .unwrap();
        registry
    }

    fn columns(request: Request) -> (Vec<&'static str>, Vec<i64>, Option<String>) {
        match request {
            Request::Command { opt, p, sub } => (opt, p, sub),
            other => panic!("expected column command, got {other:?}"),
        }
    }

    #[test]
    fn test_temperature_is_paired_with_unit() {
        let registry = registry_with("a1", false);
        let device = registry.get("a1").unwrap();
        let value = PropertyValue::parse(Property::Temperature, "72F").unwrap();

        let (opt, p, sub) = columns(build(device, &value.into(), ProtocolVariant::Json).unwrap());
        assert_eq!(opt, vec!["SetTem", "TemUn"]);
        assert_eq!(p, vec![72, 1]);
        assert_eq!(sub, None);
    }

    #[test]
    fn test_sub_device_commands_name_the_target() {
        let registry = registry_with("s1", true);
        let device = registry.get("s1").unwrap();
        let command = Command::Set(PropertyValue::Lights(Switch::Off));

        let (opt, p, sub) = columns(build(device, &command, ProtocolVariant::Json).unwrap());
        assert_eq!(opt, vec!["Lig"]);
        assert_eq!(p, vec![0]);
        assert_eq!(sub.as_deref(), Some("s1"));
    }

    #[test]
    fn test_mode_change_as_columns() {
        let mut registry = registry_with("a1", false);
        let device = registry.get_mut("a1").unwrap();
        device.merge(&[("TemUn".to_string(), 1)]);
        let command = Command::ChangeMode(ModeChange {
            temperature: Some(75),
            fan: Some(FanMode::Turbo),
            ..ModeChange::new(Mode::Cool)
        });

        let (opt, p, _) = columns(build(device, &command, ProtocolVariant::Json).unwrap());
        assert_eq!(opt, vec!["Mod", "SetTem", "TemUn", "Tur"]);
        assert_eq!(p, vec![1, 75, 1, 1]);

        let command = Command::SetTimer {
            kind: TimerKind::Off,
            armed: true,
            minutes: Some(60),
        };
        assert!(matches!(
            build(device, &command, ProtocolVariant::Json),
            Err(SessionError::UnsupportedProperty { property: "timer", .. })
        ));
    }

    #[test]
    fn test_binary_needs_a_reported_frame() {
        let registry = registry_with("a1", false);
        let device = registry.get("a1").unwrap();
        let command = Command::Set(PropertyValue::Power(Switch::On));
        assert_eq!(
            build(device, &command, ProtocolVariant::Binary).unwrap_err(),
            SessionError::NoStatusFrame("a1".to_string())
        );
    }

    #[test]
    fn test_binary_turbo_clears_quiet() {
        let mut registry = registry_with("a1", false);
        let device = registry.get_mut("a1").unwrap();
        let mut frame = StatusFrame::query();
        frame.set_flag(Field::Quiet, true);
        frame.set(Field::FanLevel, 2);
        frame.seal();
        device.store_frame(frame);

        let command = Command::Set(PropertyValue::FanSpeed(FanSpeed::Turbo));
        let Request::BinaryCommand { mac, frame } =
            build(device, &command, ProtocolVariant::Binary).unwrap()
        else {
            panic!("expected binary command");
        };
        assert_eq!(mac, "a1");
        assert_eq!(frame.frame_type(), FRAME_TYPE_COMMAND);

        let bytes = frame.as_bytes();
        assert_eq!(bytes[bytes.len() - 1], checksum(&bytes[..bytes.len() - 1]));

        let status = BinaryStatus::decode(&frame);
        let quiet = status.columns().into_iter().find(|(c, _)| *c == "Quiet");
        assert_eq!(quiet, Some(("Quiet", 0)));
        assert_eq!(status.fan, FanMode::Turbo);
    }

    #[test]
    fn test_binary_rejects_air() {
        let mut registry = registry_with("a1", false);
        let device = registry.get_mut("a1").unwrap();
        device.store_frame(StatusFrame::query());
        let command = Command::Set(PropertyValue::Air(AirValve::Outside));
        assert!(matches!(
            build(device, &command, ProtocolVariant::Binary),
            Err(SessionError::UnsupportedProperty { property: "air", .. })
        ));
    }

    #[test]
    fn test_protocol_variant_parsing() {
        assert_eq!("Binary".parse::<ProtocolVariant>(), Ok(ProtocolVariant::Binary));
        assert!("xml".parse::<ProtocolVariant>().is_err());
        assert_eq!(ProtocolVariant::default().to_string(), "json");
    }
}
