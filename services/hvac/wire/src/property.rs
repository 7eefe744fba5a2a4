//! Property descriptors for controllable appliance settings.
//!
//! Every setting the controller understands is a [`Property`] variant with a
//! fixed wire code. Enumerated settings carry their own value type that maps
//! symbolic names to integer codes in both directions; [`PropertyValue`] is the
//! tagged union of one validated value ready to be put on the wire.

use crate::error::WireError;
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;

/// Legal target temperatures in degrees Celsius
pub const CELSIUS_RANGE: RangeInclusive<u8> = 16..=30;
/// Legal target temperatures in degrees Fahrenheit
pub const FAHRENHEIT_RANGE: RangeInclusive<u8> = 61..=88;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($property:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $symbol:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = concat!("`", $symbol, "`, wire code ", stringify!($code))]
                $(#[$vmeta])*
                $variant
            ),+
        }

        impl $name {
            /// Every legal value in wire-code order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            const SYMBOLS: &'static [(&'static str, i64)] = &[$(($symbol, $code)),+];

            /// Integer code sent on the wire
            pub fn code(self) -> i64 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Symbolic name
            pub fn symbol(self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),+
                }
            }

            /// Look up a value by wire code
            pub fn from_code(code: i64) -> Result<Self, WireError> {
                match code {
                    $($code => Ok($name::$variant),)+
                    _ => Err(WireError::invalid($property, code)),
                }
            }

            /// Look up a value by symbolic name
            pub fn from_symbol(symbol: &str) -> Result<Self, WireError> {
                match symbol {
                    $($symbol => Ok($name::$variant),)+
                    _ => Err(WireError::invalid($property, symbol)),
                }
            }

            /// Look up a value by wire code or, failing that, by symbolic name
            pub fn parse(input: &str) -> Result<Self, WireError> {
                match input.trim().parse::<i64>() {
                    Ok(code) => Self::from_code(code),
                    Err(_) => Self::from_symbol(input.trim()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.symbol())
            }
        }
    };
}

wire_enum! {
    /// Two-state toggle shared by the on/off properties
    Switch("switch") {
        Off = 0 => "off",
        On = 1 => "on",
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

impl Switch {
    /// Whether the switch is on
    pub fn is_on(self) -> bool {
        self == Switch::On
    }
}

wire_enum! {
    /// Operating mode
    Mode("mode") {
        Auto = 0 => "auto",
        Cool = 1 => "cool",
        Dry = 2 => "dry",
        FanOnly = 3 => "fan_only",
        Heat = 4 => "heat",
    }
}

wire_enum! {
    /// Unit of the target temperature
    TemperatureUnit("temperatureUnit") {
        Celsius = 0 => "celsius",
        Fahrenheit = 1 => "fahrenheit",
    }
}

wire_enum! {
    /// Fan speed; medium-low and medium-high are missing on 3-speed units
    FanSpeed("fanSpeed") {
        Auto = 0 => "auto",
        Low = 1 => "low",
        MediumLow = 2 => "mediumLow",
        Medium = 3 => "medium",
        MediumHigh = 4 => "mediumHigh",
        High = 5 => "high",
        /// Newer firmware reports turbo here instead of through `Tur`
        Turbo = 6 => "turbo",
    }
}

wire_enum! {
    /// Fresh-air valve position
    AirValve("air") {
        Off = 0 => "off",
        Inside = 1 => "inside",
        Outside = 2 => "outside",
        Mode3 = 3 => "mode3",
    }
}

wire_enum! {
    /// Horizontal louvre position
    SwingHorizontal("swingHor") {
        Default = 0 => "default",
        Full = 1 => "full",
        FixedLeft = 2 => "fixedLeft",
        FixedMidLeft = 3 => "fixedMidLeft",
        FixedMid = 4 => "fixedMid",
        FixedMidRight = 5 => "fixedMidRight",
        FixedRight = 6 => "fixedRight",
        FullAlt = 7 => "fullAlt",
    }
}

wire_enum! {
    /// Vertical louvre position
    SwingVertical("swingVert") {
        Default = 0 => "default",
        Full = 1 => "full",
        FixedTop = 2 => "fixedTop",
        FixedMidTop = 3 => "fixedMidTop",
        FixedMid = 4 => "fixedMid",
        FixedMidBottom = 5 => "fixedMidBottom",
        FixedBottom = 6 => "fixedBottom",
        SwingBottom = 7 => "swingBottom",
        SwingMidBottom = 8 => "swingMidBottom",
        SwingMid = 9 => "swingMid",
        SwingMidTop = 10 => "swingMidTop",
        SwingTop = 11 => "swingTop",
    }
}

wire_enum! {
    /// Quiet fan mode, unavailable in dry and fan modes
    QuietMode("quiet") {
        Off = 0 => "off",
        Mode1 = 1 => "mode1",
        Mode2 = 2 => "mode2",
        Mode3 = 3 => "mode3",
    }
}

/// Controllable property of an appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Property {
    /// Power state
    Power,
    /// Operating mode
    Mode,
    /// Target temperature unit; only ever sent together with [`Property::Temperature`]
    TemperatureUnit,
    /// Target temperature
    Temperature,
    /// Fan speed
    FanSpeed,
    /// Fresh-air valve
    Air,
    /// Fan keeps running after shutdown to dry the coil (X-fan)
    Blow,
    /// Cold plasma / anion generator
    Health,
    /// Sleep curve
    Sleep,
    /// Display and indicators
    Lights,
    /// Horizontal swing
    SwingHor,
    /// Vertical swing
    SwingVert,
    /// Quiet mode
    Quiet,
    /// Turbo mode
    Turbo,
    /// Power saving
    PowerSave,
}

impl Property {
    /// All properties, in the column order used for status requests
    pub const ALL: [Property; 15] = [
        Property::Power,
        Property::Mode,
        Property::TemperatureUnit,
        Property::Temperature,
        Property::FanSpeed,
        Property::Air,
        Property::Blow,
        Property::Health,
        Property::Sleep,
        Property::Lights,
        Property::SwingHor,
        Property::SwingVert,
        Property::Quiet,
        Property::Turbo,
        Property::PowerSave,
    ];

    /// Wire code used in `cols`, `opt` and status columns
    pub fn code(self) -> &'static str {
        match self {
            Property::Power => "Pow",
            Property::Mode => "Mod",
            Property::TemperatureUnit => "TemUn",
            Property::Temperature => "SetTem",
            Property::FanSpeed => "WdSpd",
            Property::Air => "Air",
            Property::Blow => "Blo",
            Property::Health => "Health",
            Property::Sleep => "SwhSlp",
            Property::Lights => "Lig",
            Property::SwingHor => "SwingLfRig",
            Property::SwingVert => "SwUpDn",
            Property::Quiet => "Quiet",
            Property::Turbo => "Tur",
            Property::PowerSave => "SvSt",
        }
    }

    /// Human-readable property name
    pub fn name(self) -> &'static str {
        match self {
            Property::Power => "power",
            Property::Mode => "mode",
            Property::TemperatureUnit => "temperatureUnit",
            Property::Temperature => "temperature",
            Property::FanSpeed => "fanSpeed",
            Property::Air => "air",
            Property::Blow => "blow",
            Property::Health => "health",
            Property::Sleep => "sleep",
            Property::Lights => "lights",
            Property::SwingHor => "swingHor",
            Property::SwingVert => "swingVert",
            Property::Quiet => "quiet",
            Property::Turbo => "turbo",
            Property::PowerSave => "powerSave",
        }
    }

    /// Resolve a wire code
    pub fn from_code(code: &str) -> Option<Property> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    /// Resolve a property name
    pub fn from_name(name: &str) -> Option<Property> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Symbol table for enumerated properties, `None` for plain integers
    pub fn symbols(self) -> Option<&'static [(&'static str, i64)]> {
        match self {
            Property::Power
            | Property::Blow
            | Property::Health
            | Property::Sleep
            | Property::Lights
            | Property::Turbo
            | Property::PowerSave => Some(Switch::SYMBOLS),
            Property::Mode => Some(Mode::SYMBOLS),
            Property::TemperatureUnit => Some(TemperatureUnit::SYMBOLS),
            Property::Temperature => None,
            Property::FanSpeed => Some(FanSpeed::SYMBOLS),
            Property::Air => Some(AirValve::SYMBOLS),
            Property::SwingHor => Some(SwingHorizontal::SYMBOLS),
            Property::SwingVert => Some(SwingVertical::SYMBOLS),
            Property::Quiet => Some(QuietMode::SYMBOLS),
        }
    }

    /// Symbolic name of a raw value, if the property is enumerated and the value legal
    pub fn symbol_for(self, raw: i64) -> Option<&'static str> {
        self.symbols()?
            .iter()
            .find(|(_, code)| *code == raw)
            .map(|(symbol, _)| *symbol)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target temperature with its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temperature {
    value: u8,
    unit: TemperatureUnit,
}

impl Temperature {
    /// Validate a target temperature against the legal range of its unit
    pub fn new(value: i64, unit: TemperatureUnit) -> Result<Self, WireError> {
        let range = match unit {
            TemperatureUnit::Celsius => CELSIUS_RANGE,
            TemperatureUnit::Fahrenheit => FAHRENHEIT_RANGE,
        };
        u8::try_from(value)
            .ok()
            .filter(|v| range.contains(v))
            .map(|value| Self { value, unit })
            .ok_or_else(|| WireError::invalid("temperature", format!("{value} {unit}")))
    }

    /// Degrees in [`Temperature::unit`]
    pub fn value(self) -> u8 {
        self.value
    }

    /// Unit of the value
    pub fn unit(self) -> TemperatureUnit {
        self.unit
    }
}

/// One validated property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    /// Power
    Power(Switch),
    /// Mode
    Mode(Mode),
    /// Temperature with unit
    Temperature(Temperature),
    /// Fan speed
    FanSpeed(FanSpeed),
    /// Fresh-air valve
    Air(AirValve),
    /// X-fan
    Blow(Switch),
    /// Health
    Health(Switch),
    /// Sleep
    Sleep(Switch),
    /// Lights
    Lights(Switch),
    /// Horizontal swing
    SwingHor(SwingHorizontal),
    /// Vertical swing
    SwingVert(SwingVertical),
    /// Quiet
    Quiet(QuietMode),
    /// Turbo
    Turbo(Switch),
    /// Power save
    PowerSave(Switch),
}

impl PropertyValue {
    /// Property this value sets
    pub fn property(&self) -> Property {
        match self {
            PropertyValue::Power(_) => Property::Power,
            PropertyValue::Mode(_) => Property::Mode,
            PropertyValue::Temperature(_) => Property::Temperature,
            PropertyValue::FanSpeed(_) => Property::FanSpeed,
            PropertyValue::Air(_) => Property::Air,
            PropertyValue::Blow(_) => Property::Blow,
            PropertyValue::Health(_) => Property::Health,
            PropertyValue::Sleep(_) => Property::Sleep,
            PropertyValue::Lights(_) => Property::Lights,
            PropertyValue::SwingHor(_) => Property::SwingHor,
            PropertyValue::SwingVert(_) => Property::SwingVert,
            PropertyValue::Quiet(_) => Property::Quiet,
            PropertyValue::Turbo(_) => Property::Turbo,
            PropertyValue::PowerSave(_) => Property::PowerSave,
        }
    }

    /// `(code, value)` pairs in the order they must appear in a command.
    ///
    /// Temperature always expands to `SetTem` followed by `TemUn`; the
    /// reverse order is acknowledged by some units without taking effect.
    pub fn wire_pairs(&self) -> Vec<(&'static str, i64)> {
        let single = |property: Property, code: i64| vec![(property.code(), code)];
        match *self {
            PropertyValue::Temperature(t) => vec![
                (Property::Temperature.code(), i64::from(t.value)),
                (Property::TemperatureUnit.code(), t.unit.code()),
            ],
            PropertyValue::Power(v)
            | PropertyValue::Blow(v)
            | PropertyValue::Health(v)
            | PropertyValue::Sleep(v)
            | PropertyValue::Lights(v)
            | PropertyValue::Turbo(v)
            | PropertyValue::PowerSave(v) => single(self.property(), v.code()),
            PropertyValue::Mode(v) => single(Property::Mode, v.code()),
            PropertyValue::FanSpeed(v) => single(Property::FanSpeed, v.code()),
            PropertyValue::Air(v) => single(Property::Air, v.code()),
            PropertyValue::SwingHor(v) => single(Property::SwingHor, v.code()),
            PropertyValue::SwingVert(v) => single(Property::SwingVert, v.code()),
            PropertyValue::Quiet(v) => single(Property::Quiet, v.code()),
        }
    }

    /// Parse a textual value (symbolic name or integer code) for `property`.
    ///
    /// Temperatures accept an optional `C`/`F` suffix and default to Celsius.
    pub fn parse(property: Property, input: &str) -> Result<Self, WireError> {
        let switch = || -> Result<Switch, WireError> {
            match input.trim() {
                "true" => Ok(Switch::On),
                "false" => Ok(Switch::Off),
                other => Switch::parse(other)
                    .map_err(|_| WireError::invalid(property.name(), other)),
            }
        };
        Ok(match property {
            Property::Power => PropertyValue::Power(switch()?),
            Property::Blow => PropertyValue::Blow(switch()?),
            Property::Health => PropertyValue::Health(switch()?),
            Property::Sleep => PropertyValue::Sleep(switch()?),
            Property::Lights => PropertyValue::Lights(switch()?),
            Property::Turbo => PropertyValue::Turbo(switch()?),
            Property::PowerSave => PropertyValue::PowerSave(switch()?),
            Property::Mode => PropertyValue::Mode(Mode::parse(input)?),
            Property::FanSpeed => PropertyValue::FanSpeed(FanSpeed::parse(input)?),
            Property::Air => PropertyValue::Air(AirValve::parse(input)?),
            Property::SwingHor => PropertyValue::SwingHor(SwingHorizontal::parse(input)?),
            Property::SwingVert => PropertyValue::SwingVert(SwingVertical::parse(input)?),
            Property::Quiet => PropertyValue::Quiet(QuietMode::parse(input)?),
            Property::Temperature => {
                let text = input.trim();
                let (digits, unit) = match text.char_indices().last() {
                    Some((i, 'F' | 'f')) => (&text[..i], TemperatureUnit::Fahrenheit),
                    Some((i, 'C' | 'c')) => (&text[..i], TemperatureUnit::Celsius),
                    _ => (text, TemperatureUnit::Celsius),
                };
                let value = digits
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| WireError::invalid("temperature", text))?;
                PropertyValue::Temperature(Temperature::new(value, unit)?)
            }
            Property::TemperatureUnit => {
                return Err(WireError::invalid(
                    "temperatureUnit",
                    format!("{input} (unit is only sent together with temperature)"),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in Property::ALL.iter().enumerate() {
            for b in &Property::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn test_symbol_lookup() {
        assert_eq!(Property::from_code("WdSpd"), Some(Property::FanSpeed));
        assert_eq!(Property::FanSpeed.symbol_for(6), Some("turbo"));
        assert_eq!(Property::SwingVert.symbol_for(11), Some("swingTop"));
        assert_eq!(Property::Temperature.symbol_for(24), None);
        assert_eq!(Property::Mode.symbol_for(9), None);
        assert_eq!(Property::from_code("TemSen"), None);
    }

    #[test]
    fn test_every_symbol_maps_back_to_its_code() {
        for property in Property::ALL {
            if let Some(symbols) = property.symbols() {
                for (symbol, code) in symbols {
                    assert_eq!(property.symbol_for(*code), Some(*symbol));
                }
            }
        }
    }

    #[test]
    fn test_parse_symbolic_and_numeric() {
        assert_eq!(
            PropertyValue::parse(Property::FanSpeed, "mediumHigh").unwrap(),
            PropertyValue::FanSpeed(FanSpeed::MediumHigh)
        );
        assert_eq!(
            PropertyValue::parse(Property::Mode, "4").unwrap(),
            PropertyValue::Mode(Mode::Heat)
        );
        assert_eq!(
            PropertyValue::parse(Property::Power, "true").unwrap(),
            PropertyValue::Power(Switch::On)
        );
        assert_eq!(TemperatureUnit::parse(" 1 ").unwrap(), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::parse("celsius").unwrap(), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert!(matches!(
            PropertyValue::parse(Property::Mode, "turbo"),
            Err(WireError::InvalidCommandValue { property: "mode", .. })
        ));
        assert!(PropertyValue::parse(Property::SwingVert, "12").is_err());
        assert!(PropertyValue::parse(Property::Power, "2").is_err());
        assert!(PropertyValue::parse(Property::TemperatureUnit, "celsius").is_err());
    }

    #[test]
    fn test_temperature_range_per_unit() {
        assert!(Temperature::new(16, TemperatureUnit::Celsius).is_ok());
        assert!(Temperature::new(30, TemperatureUnit::Celsius).is_ok());
        assert!(Temperature::new(31, TemperatureUnit::Celsius).is_err());
        assert!(Temperature::new(15, TemperatureUnit::Celsius).is_err());
        assert!(Temperature::new(61, TemperatureUnit::Fahrenheit).is_ok());
        assert!(Temperature::new(88, TemperatureUnit::Fahrenheit).is_ok());
        assert!(Temperature::new(89, TemperatureUnit::Fahrenheit).is_err());
        assert!(Temperature::new(30, TemperatureUnit::Fahrenheit).is_err());
        assert!(Temperature::new(-3, TemperatureUnit::Celsius).is_err());

        let parsed = PropertyValue::parse(Property::Temperature, "75F").unwrap();
        assert_eq!(
            parsed,
            PropertyValue::Temperature(Temperature::new(75, TemperatureUnit::Fahrenheit).unwrap())
        );
    }

    #[test]
    fn test_temperature_pairs_with_unit() {
        let value =
            PropertyValue::Temperature(Temperature::new(24, TemperatureUnit::Celsius).unwrap());
        assert_eq!(value.wire_pairs(), vec![("SetTem", 24), ("TemUn", 0)]);
        assert_eq!(
            PropertyValue::Turbo(Switch::On).wire_pairs(),
            vec![("Tur", 1)]
        );
    }
}
