use crate::scheduler::ErrorCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Default number of simultaneous requests to the origin server
pub const DEFAULT_MAX_SLOTS: u32 = 5;

/// Default number of dispatches between cooldown pauses
pub const DEFAULT_SLEEP_EVERY: i64 = 40;

/// Default cooldown pause (milliseconds)
pub const DEFAULT_SLEEP_FOR: u64 = 1000;

/// Default retry budget per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Main configuration structure for Request-Pacer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Admission control and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Maximum number of requests in flight at once
    #[serde(rename = "max-slots")]
    pub max_slots: u32,

    /// Number of dispatches after which the scheduler pauses (<= 0 disables)
    #[serde(rename = "sleep-every")]
    pub sleep_every: i64,

    /// Length of the cooldown pause and base of the retry backoff (milliseconds)
    #[serde(rename = "sleep-for")]
    pub sleep_for: u64,

    /// Maximum dispatches per 60-second window (0 = unlimited)
    #[serde(rename = "max-per-minute")]
    pub max_per_minute: u32,

    /// Number of retries a task may consume before failing
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Transport error codes that are retried automatically
    #[serde(rename = "transient-codes")]
    pub transient_codes: HashSet<ErrorCode>,
}

impl SchedulerConfig {
    /// Returns the cooldown pause as a Duration
    pub fn sleep_for(&self) -> Duration {
        Duration::from_millis(self.sleep_for)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
            sleep_every: DEFAULT_SLEEP_EVERY,
            sleep_for: DEFAULT_SLEEP_FOR,
            max_per_minute: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            transient_codes: ErrorCode::default_transient(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Total request timeout (milliseconds)
    pub timeout: u64,

    /// Connection establishment timeout (milliseconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,

    /// Refuse plain-http URLs
    #[serde(rename = "https-only")]
    pub https_only: bool,

    /// Default headers added to every request
    pub headers: BTreeMap<String, String>,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("request-pacer/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30_000,
            connect_timeout: 10_000,
            https_only: false,
            headers: BTreeMap::new(),
        }
    }
}
