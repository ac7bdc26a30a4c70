//! Configuration module for Request-Pacer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use request_pacer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("pacer.toml")).unwrap();
//! println!("Scheduler will keep {} requests in flight", config.scheduler.max_slots);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, SchedulerConfig, TransportConfig, DEFAULT_MAX_RETRIES, DEFAULT_MAX_SLOTS,
    DEFAULT_SLEEP_EVERY, DEFAULT_SLEEP_FOR,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
