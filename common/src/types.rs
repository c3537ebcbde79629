use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

/// Heating/cooling state as exposed on the thermostat capability surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeatingCoolingState {
    Off = 0,
    Heat = 1,
    Cool = 2,
    Auto = 3,
}

impl HeatingCoolingState {
    pub const ALL: [Self; 4] = [Self::Off, Self::Heat, Self::Cool, Self::Auto];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Heat => "HEAT",
            Self::Cool => "COOL",
            Self::Auto => "AUTO",
        }
    }
}

impl TryFrom<u8> for HeatingCoolingState {
    type Error = AdapterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Heat),
            2 => Ok(Self::Cool),
            3 => Ok(Self::Auto),
            other => Err(AdapterError::InvalidTargetState(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Operating mode reported by the HVAC unit.
///
/// Anything the unit reports outside the known set lands in `Unknown`, which the
/// adapter folds into `Off` on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    Off,
    Heat,
    Cool,
    Auto,
    #[serde(other)]
    Unknown,
}

impl DeviceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Auto => "auto",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "heat" => Self::Heat,
            "cool" => Self::Cool,
            "auto" => Self::Auto,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

/// Cosmetic display preference. Never affects device commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureDisplayUnits {
    Celsius = 0,
    #[default]
    Fahrenheit = 1,
}

impl TemperatureDisplayUnits {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
        }
    }
}

impl TryFrom<u8> for TemperatureDisplayUnits {
    type Error = AdapterError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Celsius),
            1 => Ok(Self::Fahrenheit),
            other => Err(AdapterError::InvalidDisplayUnits(other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatus {
    pub name: String,
    #[serde(rename = "macAddress")]
    pub mac_address: String,
    #[serde(rename = "currentHeatingCoolingState")]
    pub current_state: HeatingCoolingState,
    #[serde(rename = "targetHeatingCoolingState")]
    pub target_state: HeatingCoolingState,
    #[serde(rename = "currentTemperature")]
    pub current_temperature_c: f64,
    #[serde(rename = "targetTemperature")]
    pub target_temperature_c: f64,
    #[serde(rename = "displayUnits")]
    pub display_units: TemperatureDisplayUnits,
    #[serde(rename = "detectedUnit")]
    pub detected_unit: Option<TemperatureUnit>,
    pub power: PowerState,
    #[serde(rename = "deviceMode")]
    pub device_mode: DeviceMode,
    #[serde(rename = "modeChangePending")]
    pub mode_change_pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterStatePayload {
    pub state: &'static str,
    pub temp: f64,
    pub target: f64,
    pub units: u8,
    pub power: &'static str,
    pub mode: &'static str,
    pub pending: bool,
}

impl From<&AdapterStatus> for AdapterStatePayload {
    fn from(status: &AdapterStatus) -> Self {
        Self {
            state: status.target_state.as_str(),
            temp: status.current_temperature_c,
            target: status.target_temperature_c,
            units: status.display_units.as_u8(),
            power: status.power.as_str(),
            mode: status.device_mode.as_str(),
            pending: status.mode_change_pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_state_accepts_only_known_values() {
        for state in HeatingCoolingState::ALL {
            assert_eq!(HeatingCoolingState::try_from(state.as_u8()).unwrap(), state);
        }
        assert!(matches!(
            HeatingCoolingState::try_from(4),
            Err(AdapterError::InvalidTargetState(4))
        ));
    }

    #[test]
    fn device_mode_parse_is_lenient() {
        assert_eq!(DeviceMode::parse("HEAT"), DeviceMode::Heat);
        assert_eq!(DeviceMode::parse(" cool\n"), DeviceMode::Cool);
        assert_eq!(DeviceMode::parse("dry"), DeviceMode::Unknown);
        assert_eq!(DeviceMode::parse(""), DeviceMode::Unknown);
    }

    #[test]
    fn unknown_mode_deserializes_without_error() {
        let mode: DeviceMode = serde_json::from_str("\"fan\"").unwrap();
        assert_eq!(mode, DeviceMode::Unknown);
    }

    #[test]
    fn display_units_default_to_fahrenheit() {
        assert_eq!(
            TemperatureDisplayUnits::default(),
            TemperatureDisplayUnits::Fahrenheit
        );
        assert!(TemperatureDisplayUnits::try_from(2).is_err());
    }
}
