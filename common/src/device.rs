use async_trait::async_trait;

use crate::{
    error::DeviceError,
    types::{DeviceMode, PowerState},
};

/// Opaque handle to one networked HVAC unit.
///
/// Accessors read whatever state the transport last cached. Commands may suspend
/// until the unit acknowledges them and may fail; callers do not retry.
#[async_trait]
pub trait HvacDevice: Send + Sync {
    fn name(&self) -> &str;
    fn mac_address(&self) -> &str;

    fn power(&self) -> Result<PowerState, DeviceError>;
    fn mode(&self) -> Result<DeviceMode, DeviceError>;
    /// Room temperature in whatever unit the unit reports.
    fn room_temperature(&self) -> Result<f64, DeviceError>;
    /// Target temperature in whatever unit the unit reports.
    fn target_temperature(&self) -> Result<f64, DeviceError>;

    async fn power_on(&self) -> Result<(), DeviceError>;
    async fn power_off(&self) -> Result<(), DeviceError>;
    async fn set_mode(&self, mode: DeviceMode) -> Result<(), DeviceError>;
    async fn set_temperature(&self, value: &str) -> Result<(), DeviceError>;
}
