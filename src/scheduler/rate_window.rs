//! Fixed-window limiter on dispatches per minute

use std::time::Duration;
use tokio::time::Instant;

/// Length of one accounting window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Bounds how many dispatches may start within one window
///
/// The window opens on the first admission check after it was idle or
/// expired. On expiry the start advances by a whole number of windows so the
/// boundaries never drift.
#[derive(Debug, Clone)]
pub struct RateWindow {
    limit: u32,
    size: Duration,
    start: Option<Instant>,
    remaining: u32,
}

impl RateWindow {
    /// Creates a limiter allowing `limit` dispatches per minute (0 = unlimited)
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, RATE_WINDOW)
    }

    /// Creates a limiter with a custom window length
    pub fn with_window(limit: u32, size: Duration) -> Self {
        Self {
            limit,
            size,
            start: None,
            remaining: limit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0 && !self.size.is_zero()
    }

    /// Returns when the window reopens if it is exhausted at `now`
    pub fn blocked_until(&mut self, now: Instant) -> Option<Instant> {
        if !self.is_enabled() {
            return None;
        }

        let start = match self.start {
            Some(start) => start,
            None => {
                self.remaining = self.limit;
                *self.start.insert(now)
            }
        };

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.size {
            let windows = elapsed.as_nanos() / self.size.as_nanos();
            let windows = u32::try_from(windows).unwrap_or(u32::MAX);
            let advanced = start + self.size.saturating_mul(windows);
            self.start = Some(advanced);
            self.remaining = self.limit;
            tracing::trace!(remaining = self.remaining, "rate window reset");
            return None;
        }

        if self.remaining == 0 {
            let reopen = start + self.size;
            tracing::debug!(wait = ?(reopen - now), "rate window exhausted");
            Some(reopen)
        } else {
            None
        }
    }

    /// Counts one dispatch against the current window
    pub fn record_dispatch(&mut self) {
        if self.is_enabled() {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn window_start(&self) -> Option<Instant> {
        self.start
    }
}
