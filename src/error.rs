//! Error types shared across the mix-design engine.
//!
//! Only genuine faults live here (unreadable files, unknown table keys, bad
//! configuration). Soft outcomes such as an untrainable pool or an unchanged
//! site factor are expressed as `Option` or plain values by the modules that
//! produce them.

use thiserror::Error;

use crate::standards::CurveType;

#[derive(Debug, Error)]
pub enum MixError {
    #[error("no grading envelope for Dmax {dmax} mm, curve {curve}")]
    UnknownEnvelope { dmax: f64, curve: CurveType },

    #[error("unknown curve type '{0}', expected A, B or C")]
    UnknownCurveType(String),

    #[error("exposure class '{0}' not found and no fallback class is defined")]
    UnknownExposureClass(String),

    #[error("concrete class '{0}' not found and no fallback class is defined")]
    UnknownConcreteClass(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Raised by `validate()` on configuration structs.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a given message.
    pub fn new(message: &str) -> ValidationError {
        ValidationError {
            message: message.to_owned(),
        }
    }
}
