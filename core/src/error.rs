use std::path::PathBuf;

use thiserror::Error;

/// Image extension error types
#[derive(Error, Debug)]
pub enum ExtendError {
    /// Malformed input (empty payload, bad certificate list, bad reference)
    #[error("Invalid input: {0}")]
    Input(String),

    /// A certificate file could not be read in eager mode
    #[error("Failed to read certificate {}: {source}", path.display())]
    CertRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The container engine or image store rejected a call
    #[error("Engine error during {step}: {message}")]
    Engine { step: &'static str, message: String },

    /// The extension binary exited with a non-zero status
    #[error("Extension failed with status code: {code}")]
    ExitStatus { code: i64 },

    /// Layer grafting failed
    #[error("Graft error: {0}")]
    Graft(#[from] GraftError),

    /// Relaying the container log stream failed
    #[error("Log relay error: {0}")]
    Relay(String),

    /// The caller cancelled the operation
    #[error("Cancelled during {step}")]
    Cancelled { step: &'static str },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures while shifting the donor's top layer onto the base image.
#[derive(Error, Debug)]
pub enum GraftError {
    #[error("no layers produced")]
    NoLayers,

    #[error("failed to write extended image: {0}")]
    Write(String),
}

impl ExtendError {
    /// Wrap an engine-side failure with the pipeline step it happened in.
    pub fn engine(step: &'static str, message: impl std::fmt::Display) -> Self {
        ExtendError::Engine {
            step,
            message: message.to_string(),
        }
    }

    /// Pipeline step this error is attributed to, if any.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            ExtendError::Engine { step, .. } | ExtendError::Cancelled { step } => Some(step),
            ExtendError::ExitStatus { .. } => Some("wait"),
            ExtendError::Graft(_) => Some("graft"),
            ExtendError::Relay(_) => Some("logs"),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ExtendError {
    fn from(err: serde_json::Error) -> Self {
        ExtendError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for ExtendError {
    fn from(err: toml::ser::Error) -> Self {
        ExtendError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ExtendError {
    fn from(err: toml::de::Error) -> Self {
        ExtendError::Serialization(err.to_string())
    }
}

/// Result type alias for image extension operations
pub type Result<T> = std::result::Result<T, ExtendError>;
