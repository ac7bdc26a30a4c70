//! Cooldown governor: a global pause after every N dispatches

use std::time::Duration;
use tokio::time::Instant;

/// Forces a pause of `sleep_for` after every `sleep_every` dispatches
///
/// While a pause is active nothing is dispatched, retries included.
#[derive(Debug, Clone)]
pub struct CooldownGovernor {
    sleep_every: Option<u32>,
    sleep_for: Duration,
    remaining: u32,
    paused_until: Option<Instant>,
}

impl CooldownGovernor {
    /// Creates a governor; `sleep_every <= 0` disables pausing
    pub fn new(sleep_every: i64, sleep_for: Duration) -> Self {
        let sleep_every = u32::try_from(sleep_every).ok().filter(|n| *n > 0);
        Self {
            sleep_every,
            sleep_for,
            remaining: sleep_every.unwrap_or(0),
            paused_until: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sleep_every.is_some()
    }

    /// Returns the end of the current pause, if one is active at `now`
    ///
    /// An expired pause is cleared here and the dispatch counter restarts.
    pub fn paused_until(&mut self, now: Instant) -> Option<Instant> {
        match self.paused_until {
            Some(until) if now < until => Some(until),
            Some(_) => {
                self.paused_until = None;
                self.remaining = self.sleep_every.unwrap_or(0);
                tracing::trace!("cooldown finished");
                None
            }
            None => None,
        }
    }

    /// Counts one dispatch, starting a pause when the interval is used up
    pub fn record_dispatch(&mut self, now: Instant) {
        if self.sleep_every.is_none() {
            return;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            let until = now + self.sleep_for;
            tracing::debug!(pause = ?self.sleep_for, "cooldown started");
            self.paused_until = Some(until);
        }
    }

    /// Dispatches left before the next pause
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}
