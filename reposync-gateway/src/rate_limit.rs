//! Shared view of the provider's request budget.
//!
//! The gateway keeps one [`RateLimitState`] behind a mutex. Callers reserve a
//! slot before each request and feed the response headers back afterwards.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use crate::transport::ApiResponse;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Fallback pause when the provider rate-limits without saying for how long.
pub const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Result of asking for a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Go,
    Wait(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining_calls: u32,
    pub reset_at: Instant,
    pub consecutive_failures: u32,
}

impl RateLimitState {
    /// Optimistic state until the first response tells us otherwise.
    pub fn unknown(now: Instant) -> Self {
        Self {
            remaining_calls: u32::MAX,
            reset_at: now,
            consecutive_failures: 0,
        }
    }

    /// Claim one call from the budget, or report how long to wait.
    pub fn reserve(&mut self, now: Instant) -> Reservation {
        if self.remaining_calls > 0 {
            self.remaining_calls -= 1;
            return Reservation::Go;
        }
        if now >= self.reset_at {
            // Window rolled over; the next response refreshes the real count.
            self.remaining_calls = u32::MAX;
            return Reservation::Go;
        }
        Reservation::Wait(self.reset_at - now)
    }

    /// `true` when a call made at `now` would have to wait.
    pub fn is_exhausted(&self, now: Instant) -> bool {
        self.remaining_calls == 0 && now < self.reset_at
    }

    /// Update the budget from `x-ratelimit-*` headers.
    pub fn observe(&mut self, response: &ApiResponse, now: Instant) {
        if let Some(remaining) = response
            .header(REMAINING_HEADER)
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            self.remaining_calls = remaining;
        }
        if let Some(reset) = response
            .header(RESET_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.reset_at = now + until_epoch(reset);
        }
    }

    /// Block the budget until `now + pause` after a rate-limit response.
    pub fn penalize(&mut self, now: Instant, pause: Duration) {
        self.remaining_calls = 0;
        self.reset_at = self.reset_at.max(now + pause);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

/// `Retry-After` in seconds, when present.
pub fn retry_after(response: &ApiResponse) -> Option<Duration> {
    response
        .header(RETRY_AFTER_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Time from now until the Unix timestamp `epoch_secs`, zero if already past.
fn until_epoch(epoch_secs: u64) -> Duration {
    let target = UNIX_EPOCH + Duration::from_secs(epoch_secs);
    target
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}
