//! Scheduler module for admission control of outbound requests
//!
//! This module contains the request pacing logic, including:
//! - The task queue with front/back insertion
//! - A concurrency gate bounding simultaneous requests
//! - A cooldown governor pausing after every N dispatches
//! - A per-minute rate window
//! - Retry classification with linear backoff
//! - The HTTP transport carrying the shared session

mod cooldown;
mod dispatcher;
mod gate;
mod rate_window;
mod retry;
mod task;
mod transport;

pub use cooldown::CooldownGovernor;
pub use dispatcher::{Pacer, PacerStats};
pub use gate::{ConcurrencyGate, Slot};
pub use rate_window::{RateWindow, RATE_WINDOW};
pub use retry::{ErrorCode, RetryClassifier};
pub use task::{is_gateway_error, BodyEncoding, RequestSpec, RetryPredicate};
pub use transport::{
    build_http_client, classify_io_error, classify_reqwest_error, Body, HttpTransport, Response,
    Transport, TransportError,
};
