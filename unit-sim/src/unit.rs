use hvac_common::{
    DeviceError, DeviceMode, PowerState, TemperatureUnit, UnitThresholds, TOPIC_UNIT_CMD_MODE,
    TOPIC_UNIT_CMD_POWER, TOPIC_UNIT_CMD_TEMPERATURE, TOPIC_UNIT_MODE, TOPIC_UNIT_POWER,
    TOPIC_UNIT_ROOM_TEMP, TOPIC_UNIT_TARGET_TEMP,
};

pub const DEFAULT_WARM_UP_MS: u64 = 8_000;
const DRIFT_STEP: f64 = 0.1;

/// In-memory model of a networked HVAC unit.
///
/// The unit refuses mode changes while a power-on transition is still running,
/// which is the behavior the bridge's deferred mode change works around.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedUnit {
    unit: TemperatureUnit,
    power: PowerState,
    mode: DeviceMode,
    room: f64,
    target: f64,
    warm_up_ms: u64,
    powering_on_until_ms: Option<u64>,
}

impl SimulatedUnit {
    pub fn new(unit: TemperatureUnit, warm_up_ms: u64) -> Self {
        let (room, target) = match unit {
            TemperatureUnit::Celsius => (20.0, 22.0),
            TemperatureUnit::Fahrenheit => (68.0, 72.0),
        };
        Self {
            unit,
            power: PowerState::Off,
            mode: DeviceMode::Off,
            room,
            target,
            warm_up_ms,
            powering_on_until_ms: None,
        }
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn room(&self) -> f64 {
        self.room
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_powering_on(&self, now_ms: u64) -> bool {
        self.powering_on_until_ms
            .is_some_and(|until| now_ms < until)
    }

    pub fn power_on(&mut self, now_ms: u64) -> bool {
        if self.power == PowerState::On {
            return false;
        }
        self.power = PowerState::On;
        self.powering_on_until_ms = Some(now_ms.saturating_add(self.warm_up_ms));
        true
    }

    pub fn power_off(&mut self) -> bool {
        self.powering_on_until_ms = None;
        if self.power == PowerState::Off {
            return false;
        }
        self.power = PowerState::Off;
        true
    }

    pub fn set_mode(&mut self, mode: DeviceMode, now_ms: u64) -> Result<bool, DeviceError> {
        if mode == DeviceMode::Unknown {
            return Err(DeviceError::Rejected("unknown mode".to_string()));
        }
        if self.is_powering_on(now_ms) {
            return Err(DeviceError::Rejected("unit is still powering on".to_string()));
        }
        if self.mode == mode {
            return Ok(false);
        }
        self.mode = mode;
        Ok(true)
    }

    pub fn set_temperature(&mut self, raw: &str) -> Result<bool, DeviceError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| DeviceError::Rejected(format!("invalid temperature {raw:?}")))?;

        let thresholds = UnitThresholds::default();
        let (min, max) = match self.unit {
            TemperatureUnit::Celsius => thresholds.celsius_range,
            TemperatureUnit::Fahrenheit => thresholds.fahrenheit_range,
        };
        let clamped = value.round().clamp(min as f64, max as f64);

        if self.target == clamped {
            return Ok(false);
        }
        self.target = clamped;
        Ok(true)
    }

    /// Applies a command received on one of the unit command topics.
    pub fn apply_command(
        &mut self,
        topic: &str,
        payload: &str,
        now_ms: u64,
    ) -> Result<bool, DeviceError> {
        match topic {
            TOPIC_UNIT_CMD_POWER => match PowerState::parse(payload) {
                Some(PowerState::On) => Ok(self.power_on(now_ms)),
                Some(PowerState::Off) => Ok(self.power_off()),
                None => Err(DeviceError::Rejected(format!("invalid power {payload:?}"))),
            },
            TOPIC_UNIT_CMD_MODE => self.set_mode(DeviceMode::parse(payload), now_ms),
            TOPIC_UNIT_CMD_TEMPERATURE => self.set_temperature(payload),
            other => Err(DeviceError::Rejected(format!("unknown command topic {other}"))),
        }
    }

    /// Ends the warm-up window once it has elapsed. Returns true if that happened.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        match self.powering_on_until_ms {
            Some(until) if now_ms >= until => {
                self.powering_on_until_ms = None;
                true
            }
            _ => false,
        }
    }

    /// Moves the room temperature one step toward the target when the running
    /// mode would do so. Returns true if the room temperature changed.
    pub fn drift(&mut self) -> bool {
        if self.power == PowerState::Off {
            return false;
        }

        let delta = self.target - self.room;
        let step = match self.mode {
            DeviceMode::Heat if delta > 0.0 => DRIFT_STEP,
            DeviceMode::Cool if delta < 0.0 => -DRIFT_STEP,
            DeviceMode::Auto if delta.abs() > f64::EPSILON => DRIFT_STEP.copysign(delta),
            _ => return false,
        };

        let next = if delta.abs() <= DRIFT_STEP {
            self.target
        } else {
            self.room + step
        };
        self.room = (next * 10.0).round() / 10.0;
        true
    }

    pub fn reports(&self) -> [(&'static str, String); 4] {
        [
            (TOPIC_UNIT_POWER, self.power.as_str().to_string()),
            (TOPIC_UNIT_MODE, self.mode.as_str().to_string()),
            (TOPIC_UNIT_ROOM_TEMP, format!("{:.1}", self.room)),
            (TOPIC_UNIT_TARGET_TEMP, format!("{}", self.target)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn mode_change_rejected_while_powering_on() {
        let mut unit = SimulatedUnit::new(TemperatureUnit::Fahrenheit, DEFAULT_WARM_UP_MS);

        assert!(unit.power_on(1_000));
        assert!(unit.set_mode(DeviceMode::Heat, 5_000).is_err());
        assert_eq!(unit.mode(), DeviceMode::Off);

        assert!(unit.tick(9_000));
        assert_eq!(unit.set_mode(DeviceMode::Heat, 9_000), Ok(true));
        assert_eq!(unit.mode(), DeviceMode::Heat);
    }

    #[test]
    fn commands_parse_topic_payloads() {
        let mut unit = SimulatedUnit::new(TemperatureUnit::Celsius, 0);

        assert_eq!(unit.apply_command(TOPIC_UNIT_CMD_POWER, "on", 0), Ok(true));
        assert_eq!(unit.apply_command(TOPIC_UNIT_CMD_MODE, "cool", 0), Ok(true));
        assert_eq!(
            unit.apply_command(TOPIC_UNIT_CMD_TEMPERATURE, "40", 0),
            Ok(true)
        );
        assert_eq!(unit.target(), 35.0);
        assert!(unit
            .apply_command(TOPIC_UNIT_CMD_POWER, "toggle", 0)
            .is_err());
    }

    #[test]
    fn heat_drifts_room_up_to_target() {
        let mut unit = SimulatedUnit::new(TemperatureUnit::Fahrenheit, 0);
        unit.power_on(0);
        unit.set_mode(DeviceMode::Heat, 0).unwrap();
        unit.set_temperature("68.2").unwrap();
        assert_eq!(unit.target(), 68.0);

        assert!(!unit.drift());

        unit.set_temperature("69").unwrap();
        for _ in 0..10 {
            assert!(unit.drift());
        }
        assert_eq!(unit.room(), 69.0);
        assert!(!unit.drift());
    }

    #[test]
    fn powered_off_unit_does_not_drift() {
        let mut unit = SimulatedUnit::new(TemperatureUnit::Celsius, 0);
        assert!(!unit.drift());
        assert_eq!(unit.room(), 20.0);
    }

    #[test]
    fn reports_use_device_units() {
        let unit = SimulatedUnit::new(TemperatureUnit::Fahrenheit, 0);
        let reports = unit.reports();

        assert_eq!(reports[0], (TOPIC_UNIT_POWER, "off".to_string()));
        assert_eq!(reports[2], (TOPIC_UNIT_ROOM_TEMP, "68.0".to_string()));
        assert_eq!(reports[3], (TOPIC_UNIT_TARGET_TEMP, "72".to_string()));
    }
}
