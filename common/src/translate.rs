use crate::types::{DeviceMode, HeatingCoolingState, PowerState};

/// A single step the adapter performs against the device. `Delay` splits a plan:
/// everything after it runs detached once the delay has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterAction {
    PowerOn,
    PowerOff,
    SetMode(DeviceMode),
    SetTemperature(String),
    Delay(u64),
}

/// Folds device power into the mode. Total over every (power, mode) pair.
pub fn derive_outward_state(power: PowerState, mode: DeviceMode) -> HeatingCoolingState {
    if power == PowerState::Off {
        return HeatingCoolingState::Off;
    }

    match mode {
        DeviceMode::Heat => HeatingCoolingState::Heat,
        DeviceMode::Cool => HeatingCoolingState::Cool,
        DeviceMode::Auto => HeatingCoolingState::Auto,
        DeviceMode::Off | DeviceMode::Unknown => HeatingCoolingState::Off,
    }
}

pub fn target_device_mode(state: HeatingCoolingState) -> DeviceMode {
    match state {
        HeatingCoolingState::Off => DeviceMode::Off,
        HeatingCoolingState::Heat => DeviceMode::Heat,
        HeatingCoolingState::Cool => DeviceMode::Cool,
        HeatingCoolingState::Auto => DeviceMode::Auto,
    }
}

/// Plans the commands needed to move the device to `requested`.
///
/// An empty plan means the device already matches. A device that is off has to
/// finish powering on before it accepts a mode, so that case carries a delay.
pub fn plan_target_mode(
    power: PowerState,
    mode: DeviceMode,
    requested: HeatingCoolingState,
    settle_delay_ms: u64,
) -> Vec<AdapterAction> {
    let target = target_device_mode(requested);

    if target == DeviceMode::Off {
        return match power {
            PowerState::Off => Vec::new(),
            PowerState::On => vec![AdapterAction::PowerOff],
        };
    }

    match power {
        PowerState::On if mode == target => Vec::new(),
        PowerState::On => vec![AdapterAction::SetMode(target)],
        PowerState::Off => vec![
            AdapterAction::PowerOn,
            AdapterAction::Delay(settle_delay_ms),
            AdapterAction::SetMode(target),
        ],
    }
}

pub fn plan_target_temperature(current_device_value: f64, computed: i32) -> Vec<AdapterAction> {
    if current_device_value == computed as f64 {
        Vec::new()
    } else {
        vec![AdapterAction::SetTemperature(computed.to_string())]
    }
}

/// Splits a plan at its first `Delay` into the immediate steps, and the delay
/// plus the steps that follow it.
pub fn split_at_delay(
    actions: Vec<AdapterAction>,
) -> (Vec<AdapterAction>, Option<(u64, Vec<AdapterAction>)>) {
    let Some((index, delay_ms)) =
        actions
            .iter()
            .enumerate()
            .find_map(|(index, action)| match action {
                AdapterAction::Delay(ms) => Some((index, *ms)),
                _ => None,
            })
    else {
        return (actions, None);
    };

    let mut immediate = actions;
    let mut rest = immediate.split_off(index);
    rest.remove(0);

    (immediate, Some((delay_ms, rest)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MODES: [DeviceMode; 5] = [
        DeviceMode::Off,
        DeviceMode::Heat,
        DeviceMode::Cool,
        DeviceMode::Auto,
        DeviceMode::Unknown,
    ];

    #[test]
    fn powered_off_device_always_reads_off() {
        for mode in MODES {
            assert_eq!(
                derive_outward_state(PowerState::Off, mode),
                HeatingCoolingState::Off
            );
        }
    }

    #[test]
    fn powered_on_device_mirrors_mode() {
        assert_eq!(
            derive_outward_state(PowerState::On, DeviceMode::Heat),
            HeatingCoolingState::Heat
        );
        assert_eq!(
            derive_outward_state(PowerState::On, DeviceMode::Cool),
            HeatingCoolingState::Cool
        );
        assert_eq!(
            derive_outward_state(PowerState::On, DeviceMode::Auto),
            HeatingCoolingState::Auto
        );
        assert_eq!(
            derive_outward_state(PowerState::On, DeviceMode::Unknown),
            HeatingCoolingState::Off
        );
    }

    #[test]
    fn off_request_is_suppressed_when_already_off() {
        assert!(plan_target_mode(
            PowerState::Off,
            DeviceMode::Cool,
            HeatingCoolingState::Off,
            10_000
        )
        .is_empty());
        assert_eq!(
            plan_target_mode(
                PowerState::On,
                DeviceMode::Cool,
                HeatingCoolingState::Off,
                10_000
            ),
            vec![AdapterAction::PowerOff]
        );
    }

    #[test]
    fn mode_request_on_running_device() {
        assert!(plan_target_mode(
            PowerState::On,
            DeviceMode::Heat,
            HeatingCoolingState::Heat,
            10_000
        )
        .is_empty());
        assert_eq!(
            plan_target_mode(
                PowerState::On,
                DeviceMode::Heat,
                HeatingCoolingState::Auto,
                10_000
            ),
            vec![AdapterAction::SetMode(DeviceMode::Auto)]
        );
    }

    #[test]
    fn mode_request_on_stopped_device_waits_for_power_on() {
        assert_eq!(
            plan_target_mode(
                PowerState::Off,
                DeviceMode::Off,
                HeatingCoolingState::Cool,
                10_000
            ),
            vec![
                AdapterAction::PowerOn,
                AdapterAction::Delay(10_000),
                AdapterAction::SetMode(DeviceMode::Cool),
            ]
        );
    }

    #[test]
    fn settled_plan_round_trips() {
        // Apply each plan to a device model and read the outward state back.
        for requested in HeatingCoolingState::ALL {
            for start_power in [PowerState::On, PowerState::Off] {
                for start_mode in MODES {
                    let mut power = start_power;
                    let mut mode = start_mode;
                    for action in plan_target_mode(power, mode, requested, 0) {
                        match action {
                            AdapterAction::PowerOn => power = PowerState::On,
                            AdapterAction::PowerOff => power = PowerState::Off,
                            AdapterAction::SetMode(next) => mode = next,
                            AdapterAction::SetTemperature(_) | AdapterAction::Delay(_) => {}
                        }
                    }
                    assert_eq!(derive_outward_state(power, mode), requested);
                }
            }
        }
    }

    #[test]
    fn temperature_plan_skips_matching_value() {
        assert!(plan_target_temperature(72.0, 72).is_empty());
        assert_eq!(
            plan_target_temperature(70.0, 72),
            vec![AdapterAction::SetTemperature("72".to_string())]
        );
    }

    #[test]
    fn split_separates_deferred_tail() {
        let (immediate, deferred) = split_at_delay(vec![
            AdapterAction::PowerOn,
            AdapterAction::Delay(500),
            AdapterAction::SetMode(DeviceMode::Heat),
        ]);

        assert_eq!(immediate, vec![AdapterAction::PowerOn]);
        assert_eq!(
            deferred,
            Some((500, vec![AdapterAction::SetMode(DeviceMode::Heat)]))
        );

        let (immediate, deferred) = split_at_delay(vec![AdapterAction::PowerOff]);
        assert_eq!(immediate, vec![AdapterAction::PowerOff]);
        assert_eq!(deferred, None);
    }
}
