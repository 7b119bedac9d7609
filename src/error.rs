use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("failed to load mesh {reference}: {reason}")]
    MeshLoadFailure { reference: String, reason: String },

    #[error("immersive AR is not available on this device")]
    DeviceCapabilityUnavailable,

    #[error("draw failed: {0}")]
    DrawFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("patient record error: {0}")]
    PatientRecord(String),
}

pub type Result<T> = std::result::Result<T, ViewError>;
