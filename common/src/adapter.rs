use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    config::AdapterConfig,
    device::HvacDevice,
    error::{AdapterError, DeviceError},
    translate::{
        derive_outward_state, plan_target_mode, plan_target_temperature, split_at_delay,
        target_device_mode, AdapterAction,
    },
    types::{
        AdapterStatus, DeviceMode, HeatingCoolingState, PowerState, TemperatureDisplayUnits,
        TemperatureUnit,
    },
    units::{celsius_to_device, device_to_celsius, format_device_temperature, UnitDetector},
};

/// Mode change waiting out the power-on settle window.
struct PendingModeChange {
    mode: DeviceMode,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Reconciles the thermostat capability surface with one HVAC unit.
///
/// Every command sequence runs under a per-instance lock, so at most one is in
/// flight at a time. The follow-up mode change after a power-on runs as a
/// detached task. A newer mode request retargets it without moving its deadline;
/// an off request, `shutdown`, or drop cancels it.
pub struct UnitAdapter<D: HvacDevice + 'static> {
    device: Arc<D>,
    config: AdapterConfig,
    detector: UnitDetector,
    display_units: Mutex<TemperatureDisplayUnits>,
    command_lock: Arc<Mutex<()>>,
    pending: Mutex<Option<PendingModeChange>>,
}

impl<D: HvacDevice + 'static> UnitAdapter<D> {
    pub fn new(
        device: Arc<D>,
        mut config: AdapterConfig,
        display_units: TemperatureDisplayUnits,
    ) -> Self {
        config.sanitize();
        info!(
            "adapter ready for {} ({}), mode settle delay {} ms",
            device.name(),
            device.mac_address(),
            config.mode_settle_delay_ms
        );
        Self {
            device,
            config,
            detector: UnitDetector::new(),
            display_units: Mutex::new(display_units),
            command_lock: Arc::new(Mutex::new(())),
            pending: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn detected_unit(&self) -> Option<TemperatureUnit> {
        self.detector.detected()
    }

    pub async fn current_heating_cooling_state(&self) -> Result<HeatingCoolingState, AdapterError> {
        let state = self.outward_state()?;
        debug!("current heating/cooling state: {state:?}");
        Ok(state)
    }

    pub async fn target_heating_cooling_state(&self) -> Result<HeatingCoolingState, AdapterError> {
        let state = self.outward_state()?;
        debug!("target heating/cooling state: {state:?}");
        Ok(state)
    }

    pub async fn current_temperature(&self) -> Result<f64, AdapterError> {
        let raw = self.device.room_temperature()?;
        debug!("current temperature (raw): {raw}");
        Ok(self.to_celsius(raw))
    }

    pub async fn target_temperature(&self) -> Result<f64, AdapterError> {
        let raw = self.device.target_temperature()?;
        debug!("target temperature (raw): {raw}");
        Ok(self.to_celsius(raw))
    }

    pub async fn temperature_display_units(&self) -> TemperatureDisplayUnits {
        *self.display_units.lock().await
    }

    pub async fn set_temperature_display_units(&self, units: TemperatureDisplayUnits) {
        info!("setting temperature display units to {}", units.symbol());
        *self.display_units.lock().await = units;
    }

    pub async fn set_target_heating_cooling_state(
        &self,
        requested: HeatingCoolingState,
    ) -> Result<(), AdapterError> {
        let _guard = self.command_lock.lock().await;

        // A pending mode change means the unit is still inside its power-on window.
        if requested != HeatingCoolingState::Off
            && self.retarget_pending(target_device_mode(requested)).await
        {
            return Ok(());
        }
        self.cancel_pending().await;

        let power = self.device.power()?;
        let mode = self.device.mode()?;
        info!(
            "set target heating/cooling state: requested {requested:?}, power {}, mode {}",
            power.as_str(),
            mode.as_str()
        );

        let plan = plan_target_mode(power, mode, requested, self.config.mode_settle_delay_ms);
        if plan.is_empty() {
            if requested == HeatingCoolingState::Off {
                info!("skipping power off command, already off");
            } else {
                debug!("skipping mode command, device already in {}", mode.as_str());
            }
            return Ok(());
        }

        let (immediate, deferred) = split_at_delay(plan);
        execute_actions(self.device.as_ref(), immediate).await?;

        if let Some((delay_ms, actions)) = deferred {
            debug!("deferring {actions:?} by {delay_ms} ms");
            let deadline = Instant::now() + Duration::from_millis(delay_ms);
            let handle = spawn_deferred(
                Arc::clone(&self.device),
                Arc::clone(&self.command_lock),
                deadline,
                actions,
            );
            *self.pending.lock().await = Some(PendingModeChange {
                mode: target_device_mode(requested),
                deadline,
                handle,
            });
        }

        Ok(())
    }

    pub async fn set_target_temperature(&self, celsius: f64) -> Result<(), AdapterError> {
        let _guard = self.command_lock.lock().await;

        let current = self.device.target_temperature()?;
        let unit = self
            .detector
            .observe(current, self.config.units.detection_threshold);
        let value = celsius_to_device(celsius, unit, &self.config.units)?;
        debug!("set target temperature ({unit:?} mode): {value}");

        let plan = plan_target_temperature(current, value);
        if plan.is_empty() {
            debug!("skipping temperature command, device already at {value}");
            return Ok(());
        }

        info!(
            "setting temperature to {}",
            format_device_temperature(value, unit)
        );
        execute_actions(self.device.as_ref(), plan).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<AdapterStatus, AdapterError> {
        let power = self.device.power()?;
        let mode = self.device.mode()?;
        let state = derive_outward_state(power, mode);

        Ok(AdapterStatus {
            name: self.device.name().to_string(),
            mac_address: self.device.mac_address().to_string(),
            current_state: state,
            target_state: state,
            current_temperature_c: self.current_temperature().await?,
            target_temperature_c: self.target_temperature().await?,
            display_units: self.temperature_display_units().await,
            detected_unit: self.detected_unit(),
            power,
            device_mode: mode,
            mode_change_pending: self.has_pending().await,
        })
    }

    pub async fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .await
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    /// Cancels any deferred mode change. Call before tearing the accessory down.
    pub async fn shutdown(&self) {
        self.cancel_pending().await;
        info!("adapter for {} shut down", self.device.name());
    }

    fn outward_state(&self) -> Result<HeatingCoolingState, AdapterError> {
        let power = self.device.power()?;
        let mode = self.device.mode()?;
        if power == PowerState::On && mode == DeviceMode::Unknown {
            debug!("device reported an unrecognized mode, treating as off");
        }
        Ok(derive_outward_state(power, mode))
    }

    fn to_celsius(&self, raw: f64) -> f64 {
        let unit = self
            .detector
            .observe(raw, self.config.units.detection_threshold);
        device_to_celsius(raw, unit)
    }

    /// Points a still-running deferred mode change at `mode`, keeping its
    /// deadline. Returns false when nothing is pending.
    async fn retarget_pending(&self, mode: DeviceMode) -> bool {
        let mut slot = self.pending.lock().await;
        let Some(pending) = slot
            .as_mut()
            .filter(|pending| !pending.handle.is_finished())
        else {
            return false;
        };

        if pending.mode == mode {
            debug!("deferred mode change to {} already pending", mode.as_str());
            return true;
        }

        pending.handle.abort();
        info!(
            "retargeting deferred mode change from {} to {}",
            pending.mode.as_str(),
            mode.as_str()
        );
        pending.handle = spawn_deferred(
            Arc::clone(&self.device),
            Arc::clone(&self.command_lock),
            pending.deadline,
            vec![AdapterAction::SetMode(mode)],
        );
        pending.mode = mode;
        true
    }

    async fn cancel_pending(&self) {
        if let Some(pending) = self.pending.lock().await.take() {
            if !pending.handle.is_finished() {
                pending.handle.abort();
                info!("cancelled pending deferred mode change");
            }
        }
    }
}

impl<D: HvacDevice + 'static> Drop for UnitAdapter<D> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.handle.abort();
        }
    }
}

async fn execute_actions<D: HvacDevice + ?Sized>(
    device: &D,
    actions: Vec<AdapterAction>,
) -> Result<(), DeviceError> {
    for action in actions {
        match action {
            AdapterAction::PowerOn => {
                info!("sending power on");
                device.power_on().await?;
            }
            AdapterAction::PowerOff => {
                info!("sending power off");
                device.power_off().await?;
            }
            AdapterAction::SetMode(mode) => {
                info!("setting mode to {}", mode.as_str());
                device.set_mode(mode).await?;
            }
            AdapterAction::SetTemperature(value) => {
                device.set_temperature(&value).await?;
            }
            AdapterAction::Delay(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
    }
    Ok(())
}

fn spawn_deferred<D: HvacDevice + 'static>(
    device: Arc<D>,
    command_lock: Arc<Mutex<()>>,
    deadline: Instant,
    actions: Vec<AdapterAction>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep_until(deadline).await;
        let _guard = command_lock.lock().await;

        let actions = drop_settled(device.as_ref(), actions);
        if let Err(err) = execute_actions(device.as_ref(), actions).await {
            warn!("deferred device command failed: {err}");
        }
    })
}

// A mode the device already runs in needs no command.
fn drop_settled<D: HvacDevice + ?Sized>(
    device: &D,
    actions: Vec<AdapterAction>,
) -> Vec<AdapterAction> {
    let running = matches!(device.power(), Ok(PowerState::On));
    let current = device.mode().ok();

    actions
        .into_iter()
        .filter(|action| match action {
            AdapterAction::SetMode(mode) => !(running && current == Some(*mode)),
            _ => true,
        })
        .collect()
}
