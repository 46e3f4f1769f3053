//! Error handling module

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Adapter terminated: {0}")]
    Terminated(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// A failed call against the Ring cloud client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    /// Which client call produced the failure (e.g. "get_locations")
    pub origin: &'static str,
}

impl ApiError {
    pub fn new(origin: &'static str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.origin, self.message)
    }
}

impl std::error::Error for ApiError {}
