//! Error types for flightwatch.
//!
//! This module defines the error type shared by the detectors, the pipeline and
//! the configuration layer. The ring buffer itself has no error channel: writes
//! never fail and reads report absence through `Option`.

use thiserror::Error;

/// The main error type for flightwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Registry Errors ===
    /// An anomaly model with this name is already registered.
    #[error("anomaly model '{name}' is already registered")]
    DuplicateModel {
        /// Name of the model.
        name: String,
    },

    /// No anomaly model with this name is registered.
    #[error("unknown anomaly model '{name}'")]
    UnknownModel {
        /// Name of the model.
        name: String,
    },

    /// An event detector with this name is already registered.
    #[error("event detector '{name}' is already registered")]
    DuplicateDetector {
        /// Name of the detector.
        name: String,
    },

    /// No event detector with this name is registered.
    #[error("unknown event detector '{name}'")]
    UnknownDetector {
        /// Name of the detector.
        name: String,
    },

    /// Built-in event detectors cannot be unregistered.
    #[error("event detector '{name}' is built in and cannot be unregistered")]
    ProtectedDetector {
        /// Name of the detector.
        name: String,
    },

    // === Model Errors ===
    /// The model has not been initialized.
    #[error("anomaly model '{name}' is not initialized")]
    ModelNotInitialized {
        /// Name of the model.
        name: String,
    },

    /// Not enough samples to train or evaluate.
    #[error("insufficient data for '{name}': {message}")]
    InsufficientData {
        /// Name of the model.
        name: String,
        /// Description of what was missing.
        message: String,
    },

    /// A model or detector failed while scoring a batch.
    #[error("'{name}' failed: {message}")]
    ModelFailed {
        /// Name of the model or detector.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// One or more models failed to train.
    #[error("training failed for: {}", failed.join(", "))]
    TrainingFailed {
        /// Names of the models that failed.
        failed: Vec<String>,
    },

    /// A telemetry sample could not be parsed.
    #[error("invalid sample at line {line}: {source}")]
    InvalidSample {
        /// One-based line number in the input.
        line: usize,
        /// The JSON parse failure.
        source: serde_json::Error,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flightwatch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a model failure error.
    #[must_use]
    pub fn model_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an insufficient data error.
    #[must_use]
    pub fn insufficient_data(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InsufficientData {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}
