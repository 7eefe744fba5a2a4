//! Decoding and editing of binary status frames.
//!
//! [`BinaryStatus`] is the typed view of a received [`StatusFrame`].
//! [`FrameEditor`] turns a device's last reported frame into a command frame:
//! every setter applies the side effects the unit expects alongside the field
//! itself, so callers can never produce e.g. turbo and quiet at once.

use crate::error::WireError;
use crate::frame::{Field, StatusFrame, FRAME_TYPE_COMMAND};
use crate::property::{
    Mode, Property, PropertyValue, QuietMode, SwingHorizontal, SwingVertical, TemperatureUnit,
};

/// Fahrenheit target by 5-bit code
const FAHRENHEIT_BY_CODE: [u8; 32] = [
    61, 62, 64, 66, 68, 69, 71, 73, 75, 77, 78, 80, 82, 84, 86, 87, //
    61, 63, 65, 67, 68, 70, 72, 74, 76, 77, 79, 81, 83, 85, 86, 88,
];

/// 5-bit code by Fahrenheit target, starting at 61
const CODE_BY_FAHRENHEIT: [u8; 28] = [
    0, 1, 17, 2, 18, 3, 19, 4, 5, 21, 6, 22, 7, 23, 8, 24, 9, 10, 26, 11, 27, 12, 28, 13, 29, 14,
    15, 31,
];

const FAHRENHEIT_MIN: u8 = 61;
const FAHRENHEIT_MAX: u8 = 88;
const CELSIUS_MIN: u8 = 16;
const CELSIUS_MAX: u8 = 31;

/// Highest plain fan level; 6 selects the stepless value
pub const MAX_FAN_LEVEL: u8 = 6;

/// Encode a target temperature into the 5-bit field
pub fn encode_target(value: u8, unit: TemperatureUnit) -> Result<u8, WireError> {
    match unit {
        TemperatureUnit::Celsius if (CELSIUS_MIN..=CELSIUS_MAX).contains(&value) => {
            Ok((value - CELSIUS_MIN) & 0x0F)
        }
        TemperatureUnit::Fahrenheit if (FAHRENHEIT_MIN..=FAHRENHEIT_MAX).contains(&value) => {
            Ok(CODE_BY_FAHRENHEIT[usize::from(value - FAHRENHEIT_MIN)])
        }
        _ => Err(WireError::invalid("temperature", format!("{value} {unit}"))),
    }
}

/// Decode the 5-bit target temperature field
pub fn decode_target(code: u8, unit: TemperatureUnit) -> u8 {
    match unit {
        TemperatureUnit::Celsius => (code & 0x0F) + CELSIUS_MIN,
        TemperatureUnit::Fahrenheit => FAHRENHEIT_BY_CODE[usize::from(code & 0x1F)],
    }
}

/// Effective fan setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    /// Fixed level 0..=5, 0 = auto
    Level(u8),
    /// Stepless with the given value
    Stepless(u8),
    /// Quiet
    Quiet,
    /// Turbo
    Turbo,
}

impl FanMode {
    /// Combined fan code: levels as-is, stepless 6, quiet 7, turbo 8
    pub fn code(self) -> u8 {
        match self {
            FanMode::Level(level) => level,
            FanMode::Stepless(_) => MAX_FAN_LEVEL,
            FanMode::Quiet => 7,
            FanMode::Turbo => 8,
        }
    }
}

/// Typed view of a binary status frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryStatus {
    /// Power
    pub power: bool,
    /// Run mode code
    pub mode: u8,
    /// Fan setting
    pub fan: FanMode,
    /// Target temperature in [`BinaryStatus::unit`]
    pub target_temperature: u8,
    /// Display unit
    pub unit: TemperatureUnit,
    /// Indoor temperature in [`BinaryStatus::unit`]
    pub indoor_temperature: f64,
    /// Horizontal swing code
    pub swing_horizontal: u8,
    /// Vertical swing code
    pub swing_vertical: u8,
    /// Display lights
    pub lights: bool,
    /// Health
    pub health: bool,
    /// Coil drying
    pub drying: bool,
    /// Sleep
    pub sleep: bool,
    /// Power save
    pub eco: bool,
    /// Timer mode flag
    pub timer_mode: bool,
    /// Stepless mode selector
    pub stepless_mode: u8,
    /// On timer `(armed, minutes)`
    pub on_timer: (bool, u16),
    /// Off timer `(armed, minutes)`
    pub off_timer: (bool, u16),
}

impl BinaryStatus {
    /// Decode every field of a frame
    pub fn decode(frame: &StatusFrame) -> Self {
        let unit = if frame.flag(Field::Fahrenheit) {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        };

        let fan = if frame.flag(Field::Turbo) {
            FanMode::Turbo
        } else if frame.flag(Field::Quiet) {
            FanMode::Quiet
        } else {
            match frame.get(Field::FanLevel) {
                MAX_FAN_LEVEL => FanMode::Stepless(frame.get(Field::SteplessFan)),
                level => FanMode::Level(level),
            }
        };

        let whole = f64::from(frame.get(Field::IndoorWhole));
        let indoor_temperature = match unit {
            TemperatureUnit::Celsius => whole + f64::from(frame.get(Field::IndoorTenths)) / 10.0,
            TemperatureUnit::Fahrenheit => whole * 1.8 + 32.0,
        };

        Self {
            power: frame.flag(Field::Power),
            mode: frame.get(Field::RunMode),
            fan,
            target_temperature: decode_target(frame.get(Field::TargetTemperature), unit),
            unit,
            indoor_temperature,
            swing_horizontal: frame.get(Field::SwingHorizontal),
            swing_vertical: frame.get(Field::SwingVertical),
            lights: frame.flag(Field::Lights),
            health: frame.flag(Field::Health),
            drying: frame.flag(Field::Drying),
            sleep: frame.flag(Field::Sleep),
            eco: frame.flag(Field::Eco),
            timer_mode: frame.flag(Field::TimerMode),
            stepless_mode: frame.get(Field::SteplessMode),
            on_timer: (frame.flag(Field::OnTimerEnabled), frame.on_timer_minutes()),
            off_timer: (frame.flag(Field::OffTimerEnabled), frame.off_timer_minutes()),
        }
    }

    /// Property columns in the same `code -> raw` shape a JSON `dat` pack yields.
    ///
    /// Turbo is reported both through `Tur` and as fan speed 6; stepless fan
    /// reads as the highest fixed speed. The fresh-air valve has no field and
    /// is never reported.
    pub fn columns(&self) -> Vec<(&'static str, i64)> {
        let on = |flag: bool| i64::from(flag);
        let fan_speed = match self.fan {
            FanMode::Level(level) => i64::from(level),
            FanMode::Stepless(_) => 5,
            FanMode::Quiet => 0,
            FanMode::Turbo => 6,
        };
        vec![
            (Property::Power.code(), on(self.power)),
            (Property::Mode.code(), i64::from(self.mode)),
            (Property::TemperatureUnit.code(), self.unit.code()),
            (Property::Temperature.code(), i64::from(self.target_temperature)),
            (Property::FanSpeed.code(), fan_speed),
            (Property::Blow.code(), on(self.drying)),
            (Property::Health.code(), on(self.health)),
            (Property::Sleep.code(), on(self.sleep)),
            (Property::Lights.code(), on(self.lights)),
            (Property::SwingHor.code(), i64::from(self.swing_horizontal)),
            (Property::SwingVert.code(), i64::from(self.swing_vertical)),
            (Property::Quiet.code(), on(self.fan == FanMode::Quiet)),
            (Property::Turbo.code(), on(self.fan == FanMode::Turbo)),
            (Property::PowerSave.code(), on(self.eco)),
        ]
    }
}

/// Arguments of a mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    /// New mode
    pub mode: Mode,
    /// Explicit target in the frame's current unit; a default is derived otherwise
    pub temperature: Option<u8>,
    /// Fan setting, ignored in dry mode
    pub fan: Option<FanMode>,
    /// Horizontal swing
    pub swing_horizontal: Option<SwingHorizontal>,
    /// Vertical swing
    pub swing_vertical: Option<SwingVertical>,
}

impl ModeChange {
    /// Change only the mode
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            temperature: None,
            fan: None,
            swing_horizontal: None,
            swing_vertical: None,
        }
    }
}

/// Read-modify-write editor producing a command frame
#[derive(Debug, Clone)]
pub struct FrameEditor {
    frame: StatusFrame,
}

impl FrameEditor {
    /// Start from a copy of the last reported frame
    pub fn new(last: &StatusFrame) -> Self {
        Self {
            frame: last.clone(),
        }
    }

    /// Power; always disarms both timers but keeps their times
    pub fn power(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Power, on);
        if on {
            self.frame.set_flag(Field::Drying, false);
        } else {
            self.frame.set_flag(Field::Sleep, false);
        }
        self.frame.set_flag(Field::OnTimerEnabled, false);
        self.frame.set_flag(Field::OffTimerEnabled, false);
        self
    }

    /// Turbo; either way quiet is cleared and the fan level reset
    pub fn turbo(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Turbo, on);
        self.frame.set_flag(Field::Quiet, false);
        self.frame.set(Field::FanLevel, 0);
        self
    }

    /// Quiet; either way turbo is cleared and the fan level reset
    pub fn quiet(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Quiet, on);
        self.frame.set_flag(Field::Turbo, false);
        self.frame.set(Field::FanLevel, 0);
        self
    }

    /// Fixed fan level, clearing quiet and turbo
    pub fn fan_level(&mut self, level: u8) -> Result<&mut Self, WireError> {
        if level > MAX_FAN_LEVEL {
            return Err(WireError::invalid("fanSpeed", level));
        }
        self.frame.set(Field::FanLevel, level);
        self.frame.set_flag(Field::Quiet, false);
        self.frame.set_flag(Field::Turbo, false);
        Ok(self)
    }

    /// Any fan setting
    pub fn fan(&mut self, fan: FanMode) -> Result<&mut Self, WireError> {
        match fan {
            FanMode::Level(level) => {
                self.fan_level(level)?;
            }
            FanMode::Stepless(value) => {
                self.fan_level(MAX_FAN_LEVEL)?;
                self.frame.set(Field::SteplessFan, value);
            }
            FanMode::Quiet => {
                self.quiet(true);
            }
            FanMode::Turbo => {
                self.turbo(true);
            }
        }
        Ok(self)
    }

    /// Target temperature, switching the display unit along with it
    pub fn target_temperature(
        &mut self,
        value: u8,
        unit: TemperatureUnit,
    ) -> Result<&mut Self, WireError> {
        let code = encode_target(value, unit)?;
        self.frame
            .set_flag(Field::Fahrenheit, unit == TemperatureUnit::Fahrenheit);
        self.frame.set(Field::TargetTemperature, code);
        Ok(self)
    }

    /// Mode change with derived defaults.
    ///
    /// An explicit temperature is only honoured when plausible for the frame's
    /// unit; an implausible one leaves the current target alone. Without one,
    /// auto gets 25 °C / 77 °F, heat 28 °C / 82 °F and every other mode
    /// 27 °C / 81 °F. Sleep and eco are always cleared.
    pub fn mode(&mut self, change: ModeChange) -> Result<&mut Self, WireError> {
        let unit = if self.frame.flag(Field::Fahrenheit) {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        };
        let target = match (change.temperature, change.mode, unit) {
            (Some(t), _, TemperatureUnit::Fahrenheit) if t >= FAHRENHEIT_MIN => Some(t),
            (Some(t), _, TemperatureUnit::Celsius) if t <= CELSIUS_MAX => Some(t),
            (Some(_), _, _) => None,
            (None, Mode::Auto, TemperatureUnit::Celsius) => Some(25),
            (None, Mode::Auto, TemperatureUnit::Fahrenheit) => Some(77),
            (None, Mode::Heat, TemperatureUnit::Celsius) => Some(28),
            (None, Mode::Heat, TemperatureUnit::Fahrenheit) => Some(82),
            (None, _, TemperatureUnit::Celsius) => Some(27),
            (None, _, TemperatureUnit::Fahrenheit) => Some(81),
        };
        let code = target.map(|t| encode_target(t, unit)).transpose()?;

        let previous = self.frame.get(Field::RunMode);
        self.frame.set(Field::RunMode, change.mode.code() as u8);
        if let Some(code) = code {
            self.frame.set(Field::TargetTemperature, code);
        }

        if change.mode == Mode::Heat && i64::from(previous) != Mode::Heat.code() {
            self.frame.set_flag(Field::Drying, true);
        }

        if change.mode == Mode::Dry {
            self.frame.set(Field::FanLevel, 1);
            self.frame.set_flag(Field::Quiet, false);
            self.frame.set_flag(Field::Turbo, false);
        } else if let Some(fan) = change.fan {
            self.fan(fan)?;
        }

        if let Some(swing) = change.swing_horizontal {
            self.swing_horizontal(swing);
        }
        if let Some(swing) = change.swing_vertical {
            self.swing_vertical(swing);
        }

        self.frame.set_flag(Field::Sleep, false);
        self.frame.set_flag(Field::Eco, false);
        Ok(self)
    }

    /// Sleep; turning it on clears eco
    pub fn sleep(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Sleep, on);
        if on {
            self.frame.set_flag(Field::Eco, false);
        }
        self
    }

    /// Power save; turning it on clears sleep and resets the fan level
    pub fn eco(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Eco, on);
        if on {
            self.frame.set_flag(Field::Sleep, false);
            self.frame.set(Field::FanLevel, 0);
        }
        self
    }

    /// Display lights
    pub fn lights(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Lights, on);
        self
    }

    /// Health
    pub fn health(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Health, on);
        self
    }

    /// Coil drying
    pub fn drying(&mut self, on: bool) -> &mut Self {
        self.frame.set_flag(Field::Drying, on);
        self
    }

    /// Horizontal swing
    pub fn swing_horizontal(&mut self, swing: SwingHorizontal) -> &mut Self {
        self.frame.set(Field::SwingHorizontal, swing.code() as u8);
        self
    }

    /// Vertical swing
    pub fn swing_vertical(&mut self, swing: SwingVertical) -> &mut Self {
        self.frame.set(Field::SwingVertical, swing.code() as u8);
        self
    }

    /// Arm or disarm the on-timer; `minutes` replaces the stored time when given
    pub fn on_timer(&mut self, armed: bool, minutes: Option<u16>) -> &mut Self {
        if let Some(minutes) = minutes {
            self.frame.set_on_timer_minutes(minutes);
        }
        self.frame.set_flag(Field::OnTimerEnabled, armed);
        self
    }

    /// Arm or disarm the off-timer; `minutes` replaces the stored time when given
    pub fn off_timer(&mut self, armed: bool, minutes: Option<u16>) -> &mut Self {
        if let Some(minutes) = minutes {
            self.frame.set_off_timer_minutes(minutes);
        }
        self.frame.set_flag(Field::OffTimerEnabled, armed);
        self
    }

    /// Apply one property value with its side effects.
    ///
    /// The fresh-air valve has no field in the binary layout and is rejected,
    /// as are quiet modes other than off and `mode1`.
    pub fn apply(&mut self, value: PropertyValue) -> Result<&mut Self, WireError> {
        match value {
            PropertyValue::Power(v) => {
                self.power(v.is_on());
            }
            PropertyValue::Mode(mode) => {
                self.mode(ModeChange::new(mode))?;
            }
            PropertyValue::Temperature(t) => {
                self.target_temperature(t.value(), t.unit())?;
            }
            PropertyValue::FanSpeed(speed) if speed.code() >= i64::from(MAX_FAN_LEVEL) => {
                self.turbo(true);
            }
            PropertyValue::FanSpeed(speed) => {
                self.fan_level(speed.code() as u8)?;
            }
            PropertyValue::Quiet(QuietMode::Off) => {
                self.quiet(false);
            }
            PropertyValue::Quiet(QuietMode::Mode1) => {
                self.quiet(true);
            }
            PropertyValue::Quiet(quiet) => {
                return Err(WireError::invalid(
                    "quiet",
                    format!("{quiet} (binary frames carry on/off only)"),
                ));
            }
            PropertyValue::Turbo(v) => {
                self.turbo(v.is_on());
            }
            PropertyValue::Sleep(v) => {
                self.sleep(v.is_on());
            }
            PropertyValue::PowerSave(v) => {
                self.eco(v.is_on());
            }
            PropertyValue::Lights(v) => {
                self.lights(v.is_on());
            }
            PropertyValue::Health(v) => {
                self.health(v.is_on());
            }
            PropertyValue::Blow(v) => {
                self.drying(v.is_on());
            }
            PropertyValue::SwingHor(swing) => {
                self.swing_horizontal(swing);
            }
            PropertyValue::SwingVert(swing) => {
                self.swing_vertical(swing);
            }
            PropertyValue::Air(air) => {
                return Err(WireError::invalid("air", format!("{air} (no binary field)")));
            }
        }
        Ok(self)
    }

    /// Current state of the edited frame
    pub fn peek(&self) -> &StatusFrame {
        &self.frame
    }

    /// Mark the frame as a command and recompute its checksum
    pub fn finish(mut self) -> StatusFrame {
        self.frame.set_frame_type(FRAME_TYPE_COMMAND);
        self.frame.seal();
        self.frame
    }
}
