use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tracing::{debug, warn};

use hvac_common::{
    DeviceError, DeviceIdentity, DeviceMode, HvacDevice, PowerState, TOPIC_UNIT_CMD_MODE,
    TOPIC_UNIT_CMD_POWER, TOPIC_UNIT_CMD_TEMPERATURE, TOPIC_UNIT_MODE, TOPIC_UNIT_POWER,
    TOPIC_UNIT_ROOM_TEMP, TOPIC_UNIT_TARGET_TEMP,
};

pub const UNIT_STATE_TOPICS: [&str; 4] = [
    TOPIC_UNIT_POWER,
    TOPIC_UNIT_MODE,
    TOPIC_UNIT_ROOM_TEMP,
    TOPIC_UNIT_TARGET_TEMP,
];

/// Last state the unit reported. Fields stay `None` until the first report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportedState {
    pub power: Option<PowerState>,
    pub mode: Option<DeviceMode>,
    pub room_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
}

impl ReportedState {
    /// Applies one state report. Returns false when the topic is not a unit
    /// state topic or the payload does not parse.
    pub fn apply_report(&mut self, topic: &str, payload: &str) -> bool {
        match topic {
            TOPIC_UNIT_POWER => match PowerState::parse(payload) {
                Some(power) => {
                    self.power = Some(power);
                    true
                }
                None => false,
            },
            TOPIC_UNIT_MODE => {
                let mode = DeviceMode::parse(payload);
                if mode == DeviceMode::Unknown {
                    warn!("unit reported unrecognized mode {payload:?}");
                }
                self.mode = Some(mode);
                true
            }
            TOPIC_UNIT_ROOM_TEMP | TOPIC_UNIT_TARGET_TEMP => {
                let Some(value) = parse_temperature(payload) else {
                    return false;
                };
                if topic == TOPIC_UNIT_ROOM_TEMP {
                    self.room_temperature = Some(value);
                } else {
                    self.target_temperature = Some(value);
                }
                true
            }
            _ => false,
        }
    }
}

fn parse_temperature(payload: &str) -> Option<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub struct MqttDevice {
    identity: DeviceIdentity,
    mqtt: AsyncClient,
    state: RwLock<ReportedState>,
}

impl MqttDevice {
    pub fn new(identity: DeviceIdentity, mqtt: AsyncClient) -> Self {
        Self {
            identity,
            mqtt,
            state: RwLock::new(ReportedState::default()),
        }
    }

    pub fn apply_report(&self, topic: &str, payload: &str) -> bool {
        let applied = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_report(topic, payload);
        if applied {
            debug!("unit state {topic} = {payload}");
        }
        applied
    }

    fn snapshot(&self) -> ReportedState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ReportedState)) {
        apply(&mut self.state.write().unwrap_or_else(PoisonError::into_inner));
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), DeviceError> {
        self.mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| DeviceError::Transport(err.to_string()))
    }
}

#[async_trait]
impl HvacDevice for MqttDevice {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn mac_address(&self) -> &str {
        &self.identity.mac_address
    }

    fn power(&self) -> Result<PowerState, DeviceError> {
        self.snapshot()
            .power
            .ok_or(DeviceError::StateUnavailable("power"))
    }

    fn mode(&self) -> Result<DeviceMode, DeviceError> {
        self.snapshot()
            .mode
            .ok_or(DeviceError::StateUnavailable("mode"))
    }

    fn room_temperature(&self) -> Result<f64, DeviceError> {
        self.snapshot()
            .room_temperature
            .ok_or(DeviceError::StateUnavailable("room temperature"))
    }

    fn target_temperature(&self) -> Result<f64, DeviceError> {
        self.snapshot()
            .target_temperature
            .ok_or(DeviceError::StateUnavailable("target temperature"))
    }

    async fn power_on(&self) -> Result<(), DeviceError> {
        self.publish(TOPIC_UNIT_CMD_POWER, PowerState::On.as_str().to_string())
            .await?;
        self.update(|state| state.power = Some(PowerState::On));
        Ok(())
    }

    async fn power_off(&self) -> Result<(), DeviceError> {
        self.publish(TOPIC_UNIT_CMD_POWER, PowerState::Off.as_str().to_string())
            .await?;
        self.update(|state| state.power = Some(PowerState::Off));
        Ok(())
    }

    async fn set_mode(&self, mode: DeviceMode) -> Result<(), DeviceError> {
        if mode == DeviceMode::Unknown {
            return Err(DeviceError::Rejected("cannot command an unknown mode".to_string()));
        }
        self.publish(TOPIC_UNIT_CMD_MODE, mode.as_str().to_string())
            .await?;
        self.update(|state| state.mode = Some(mode));
        Ok(())
    }

    async fn set_temperature(&self, value: &str) -> Result<(), DeviceError> {
        let parsed = parse_temperature(value)
            .ok_or_else(|| DeviceError::Rejected(format!("invalid temperature {value:?}")))?;
        self.publish(TOPIC_UNIT_CMD_TEMPERATURE, value.to_string())
            .await?;
        self.update(|state| state.target_temperature = Some(parsed));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn reports_fill_cache() {
        let mut state = ReportedState::default();

        assert!(state.apply_report(TOPIC_UNIT_POWER, "ON"));
        assert!(state.apply_report(TOPIC_UNIT_MODE, "cool"));
        assert!(state.apply_report(TOPIC_UNIT_ROOM_TEMP, "71.5"));
        assert!(state.apply_report(TOPIC_UNIT_TARGET_TEMP, " 72\n"));

        assert_eq!(
            state,
            ReportedState {
                power: Some(PowerState::On),
                mode: Some(DeviceMode::Cool),
                room_temperature: Some(71.5),
                target_temperature: Some(72.0),
            }
        );
    }

    #[test]
    fn malformed_reports_are_ignored() {
        let mut state = ReportedState::default();

        assert!(!state.apply_report(TOPIC_UNIT_POWER, "standby"));
        assert!(!state.apply_report(TOPIC_UNIT_ROOM_TEMP, "NaN"));
        assert!(!state.apply_report(TOPIC_UNIT_TARGET_TEMP, "warm"));
        assert!(!state.apply_report("hvac/unit/state/fan", "high"));

        assert_eq!(state, ReportedState::default());
    }

    #[test]
    fn unrecognized_mode_is_cached_as_unknown() {
        let mut state = ReportedState::default();
        assert!(state.apply_report(TOPIC_UNIT_MODE, "dry"));
        assert_eq!(state.mode, Some(DeviceMode::Unknown));
    }
}
