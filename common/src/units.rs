use std::sync::OnceLock;

use tracing::info;

use crate::{config::UnitThresholds, error::AdapterError, types::TemperatureUnit};

/// Rounds half-way values up (toward positive infinity).
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

pub fn round_tenth(value: f64) -> f64 {
    round_half_up(value * 10.0) / 10.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    round_tenth((fahrenheit - 32.0) * 5.0 / 9.0)
}

pub fn classify(raw: f64, threshold: f64) -> TemperatureUnit {
    if raw < threshold {
        TemperatureUnit::Celsius
    } else {
        TemperatureUnit::Fahrenheit
    }
}

/// One-shot unit inference. The first observed value decides the unit for the
/// lifetime of the detector; later observations only read the cached result.
#[derive(Debug, Default)]
pub struct UnitDetector {
    unit: OnceLock<TemperatureUnit>,
}

impl UnitDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected(&self) -> Option<TemperatureUnit> {
        self.unit.get().copied()
    }

    pub fn observe(&self, raw: f64, threshold: f64) -> TemperatureUnit {
        *self.unit.get_or_init(|| {
            let unit = classify(raw, threshold);
            info!(
                "auto-detected temperature unit: {unit:?} (temp: {raw}{})",
                unit.symbol()
            );
            unit
        })
    }
}

/// Device reading to the Celsius value exposed outward.
pub fn device_to_celsius(raw: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Celsius => round_tenth(raw),
        TemperatureUnit::Fahrenheit => fahrenheit_to_celsius(raw),
    }
}

/// Outward Celsius value to the integer the device expects, clamped to the
/// unit's operating envelope.
pub fn celsius_to_device(
    celsius: f64,
    unit: TemperatureUnit,
    thresholds: &UnitThresholds,
) -> Result<i32, AdapterError> {
    if !celsius.is_finite() {
        return Err(AdapterError::InvalidTemperature(celsius));
    }

    let (raw, (min, max)) = match unit {
        TemperatureUnit::Celsius => (round_half_up(celsius), thresholds.celsius_range),
        TemperatureUnit::Fahrenheit => (
            round_half_up(celsius * 9.0 / 5.0 + 32.0),
            thresholds.fahrenheit_range,
        ),
    };

    Ok((raw as i32).clamp(min, max))
}

pub fn format_device_temperature(value: i32, unit: TemperatureUnit) -> String {
    match unit {
        TemperatureUnit::Celsius => format!("{value} °C"),
        TemperatureUnit::Fahrenheit => {
            format!("{value} °F / {} °C", fahrenheit_to_celsius(value as f64))
        }
    }
}
