//! Admission rate limiter
//!
//! Bounds new generation calls to `rate` admissions in any sliding
//! one-second window. The bucket refills as old admissions age out of the
//! window; the mutex shields only the admit-or-wait decision, and waiting
//! happens outside the lock so concurrent workers never serialize on a
//! sleeper. Built on `tokio::time` so paused-clock tests drive it
//! deterministically.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Window length the rate applies to
const WINDOW: Duration = Duration::from_secs(1);

struct LimiterInner {
    /// Admission timestamps within the current window
    admissions: VecDeque<Instant>,
    /// Hard block from a provider-reported rate limit
    blocked_until: Option<Instant>,
}

/// Sliding-window rate limiter shared by all workers of a stage
pub struct RateLimiter {
    rate_per_second: usize,
    inner: Mutex<LimiterInner>,
}

impl RateLimiter {
    /// Create a limiter admitting `rate_per_second` calls per second
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            rate_per_second: rate_per_second.max(1) as usize,
            inner: Mutex::new(LimiterInner {
                admissions: VecDeque::new(),
                blocked_until: None,
            }),
        }
    }

    /// Wait until the window has room, then record an admission
    pub async fn admit(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();

                if let Some(until) = inner.blocked_until {
                    if now < until {
                        until - now
                    } else {
                        inner.blocked_until = None;
                        self.try_admit(&mut inner, now).unwrap_or(WINDOW)
                    }
                } else {
                    match self.try_admit(&mut inner, now) {
                        None => return,
                        Some(wait) => wait,
                    }
                }
            };

            if wait.is_zero() {
                continue;
            }
            debug!(?wait, "admit: window full, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Prune expired admissions; admit now or report the time to wait
    fn try_admit(&self, inner: &mut LimiterInner, now: Instant) -> Option<Duration> {
        // Less than a window since clock start: nothing can have expired
        if let Some(window_start) = now.checked_sub(WINDOW) {
            while inner.admissions.front().map(|t| *t <= window_start).unwrap_or(false) {
                inner.admissions.pop_front();
            }
        }

        if inner.admissions.len() < self.rate_per_second {
            inner.admissions.push_back(now);
            return None;
        }

        // Wait until the oldest admission leaves the window
        let oldest = *inner.admissions.front().expect("window is full");
        Some((oldest + WINDOW).saturating_duration_since(now))
    }

    /// Block all admissions for `retry_after`
    ///
    /// Used when the provider itself reports a rate limit: trust its
    /// signal over our own accounting. Sleeps out the penalty so the
    /// calling unit resumes when admissions do.
    pub async fn penalize(&self, retry_after: Duration) {
        {
            let mut inner = self.inner.lock().await;
            let until = Instant::now() + retry_after;
            inner.blocked_until = Some(inner.blocked_until.map_or(until, |existing| existing.max(until)));
        }
        debug!(?retry_after, "penalize: provider rate limit, blocking admissions");
        tokio::time::sleep(retry_after).await;
    }
}
