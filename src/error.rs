//! Error taxonomy for collaborator calls.
//!
//! Every call that leaves the process (remote service, capture device,
//! audio engine) reports failures as a [`ServiceError`]. The orchestration
//! code recovers from all of them locally; none is fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Endpoint unreachable, timed out, or answered with a non-success status
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Response arrived but lacks a required field or cannot be parsed
    #[error("Malformed response: {0}")]
    Structural(String),

    /// Capture or audio device cannot be used
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Queue or stat set has no entries
    #[error("Nothing to work with: {0}")]
    Empty(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Structural(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Structural(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
