use serde::{Deserialize, Serialize};

use crate::types::TemperatureDisplayUnits;

const MAX_SETTLE_DELAY_MS: u64 = 60_000;

/// Device-specific temperature constants. These are empirical firmware limits;
/// the two ranges are not conversions of each other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UnitThresholds {
    pub detection_threshold: f64,
    pub celsius_range: (i32, i32),
    pub fahrenheit_range: (i32, i32),
}

impl Default for UnitThresholds {
    fn default() -> Self {
        Self {
            detection_threshold: 50.0,
            celsius_range: (15, 35),
            fahrenheit_range: (62, 86),
        }
    }
}

impl UnitThresholds {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.detection_threshold.is_finite() {
            self.detection_threshold = defaults.detection_threshold;
        }
        if self.celsius_range.0 >= self.celsius_range.1 {
            self.celsius_range = defaults.celsius_range;
        }
        if self.fahrenheit_range.0 >= self.fahrenheit_range.1 {
            self.fahrenheit_range = defaults.fahrenheit_range;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Wait between a power-on command and the follow-up mode change.
    pub mode_settle_delay_ms: u64,
    pub units: UnitThresholds,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode_settle_delay_ms: 10_000,
            units: UnitThresholds::default(),
        }
    }
}

impl AdapterConfig {
    pub fn sanitize(&mut self) {
        self.mode_settle_delay_ms = self.mode_settle_delay_ms.min(MAX_SETTLE_DELAY_MS);
        self.units.sanitize();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistedSettings {
    pub display_units: TemperatureDisplayUnits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceIdentity {
    pub name: String,
    pub mac_address: String,
    pub manufacturer: String,
    pub model: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: "HVAC Unit".to_string(),
            mac_address: "00:00:00:00:00:00".to_string(),
            manufacturer: "Cielo".to_string(),
            model: "BREEZ-PLUS".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub settings: PersistedSettings,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub device: DeviceIdentity,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.adapter.sanitize();
        if self.device.name.trim().is_empty() {
            self.device.name = DeviceIdentity::default().name;
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let raw = r#"{ "adapter": { "mode_settle_delay_ms": 5000 }, "settings": { "display_units": "celsius" } }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.adapter.mode_settle_delay_ms, 5_000);
        assert_eq!(config.adapter.units, UnitThresholds::default());
        assert_eq!(
            config.settings.display_units,
            TemperatureDisplayUnits::Celsius
        );
        assert_eq!(config.network.mqtt_port, 1883);
    }

    #[test]
    fn sanitize_restores_inverted_ranges() {
        let mut config = AdapterConfig {
            mode_settle_delay_ms: 600_000,
            units: UnitThresholds {
                detection_threshold: f64::NAN,
                celsius_range: (35, 15),
                fahrenheit_range: (62, 62),
            },
        };
        config.sanitize();

        assert_eq!(config.mode_settle_delay_ms, MAX_SETTLE_DELAY_MS);
        assert_eq!(config.units, UnitThresholds::default());
    }
}
