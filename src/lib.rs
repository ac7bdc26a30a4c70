//! Request-Pacer: an adaptive HTTP request scheduler
//!
//! This crate sits between callers and a shared HTTP client. Every request goes
//! through one scheduler that enforces a concurrency ceiling, periodic cooldown
//! pauses, an optional per-minute rate ceiling and automatic retry of transient
//! failures, while all requests share a single cookie jar.

pub mod config;
pub mod scheduler;

use thiserror::Error;

pub use scheduler::ErrorCode;

/// Main error type for Request-Pacer operations
#[derive(Debug, Error)]
pub enum PacerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request to {url} failed with {code} after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        code: ErrorCode,
        attempts: u32,
        message: String,
    },

    #[error("Scheduler stopped before the request to {url} completed")]
    Closed { url: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    InvalidUrl(#[from] ::url::ParseError),
}

impl PacerError {
    /// Returns the machine-readable error code, if this is a transport failure
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            PacerError::Transport { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the URL of the request that failed, if known
    pub fn url(&self) -> Option<&str> {
        match self {
            PacerError::Transport { url, .. } | PacerError::Closed { url } => Some(url),
            _ => None,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid header in config: {0}")]
    InvalidHeader(String),
}

/// Result type alias for Request-Pacer operations
pub type Result<T> = std::result::Result<T, PacerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, SchedulerConfig, TransportConfig};
pub use scheduler::{Body, BodyEncoding, Pacer, PacerStats, RequestSpec, Response, Transport};
