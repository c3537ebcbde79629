use thiserror::Error;

/// Failures reported by the device collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    #[error("device transport failed: {0}")]
    Transport(String),
    #[error("device has not reported {0} yet")]
    StateUnavailable(&'static str),
    #[error("device rejected command: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("invalid target heating/cooling state {0} (expected 0-3)")]
    InvalidTargetState(u8),
    #[error("invalid temperature display units {0} (expected 0 or 1)")]
    InvalidDisplayUnits(u8),
    #[error("invalid temperature {0}")]
    InvalidTemperature(f64),
}
