pub mod adapter;
pub mod config;
pub mod device;
pub mod error;
pub mod topics;
pub mod translate;
pub mod types;
pub mod units;

pub use adapter::UnitAdapter;
pub use config::{AdapterConfig, DeviceIdentity, PersistedSettings, RuntimeConfig, UnitThresholds};
pub use device::HvacDevice;
pub use error::{AdapterError, DeviceError};
pub use topics::*;
pub use translate::{derive_outward_state, plan_target_mode, AdapterAction};
pub use types::{
    AdapterStatePayload, AdapterStatus, DeviceMode, HeatingCoolingState, PowerState,
    TemperatureDisplayUnits, TemperatureUnit,
};
pub use units::UnitDetector;
