//! Adaptive provider rate limiting on top of governor.
//!
//! Each provider client owns one limiter. Requests await a permit before they
//! are sent; the quota drops while the provider is failing (timeouts, 429s) and
//! climbs back toward the configured base once it recovers.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Error-rate driven quota bookkeeping, independent of the limiter itself.
#[derive(Debug, Clone)]
pub struct AdaptiveQuota {
    base_quota: u32,
    current_quota: u32,
    min_quota: u32,
    outcomes: VecDeque<bool>,
    window_size: usize,
    error_threshold: f64,
    last_adjustment: Instant,
    adjustment_interval: Duration,
}

impl AdaptiveQuota {
    pub fn new(base_quota: u32, window_size: usize, error_threshold: f64) -> Self {
        let base_quota = base_quota.max(1);
        Self {
            base_quota,
            current_quota: base_quota,
            min_quota: (base_quota / 4).max(1),
            outcomes: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            error_threshold: error_threshold.clamp(0.0, 1.0),
            last_adjustment: Instant::now(),
            adjustment_interval: Duration::from_secs(30),
        }
    }

    /// Record one request outcome. Returns the new quota if it changed.
    pub fn record(&mut self, success: bool) -> Option<u32> {
        self.outcomes.push_back(success);
        while self.outcomes.len() > self.window_size {
            self.outcomes.pop_front();
        }

        if self.outcomes.len() < self.window_size / 2
            || self.last_adjustment.elapsed() < self.adjustment_interval
        {
            return None;
        }
        self.adjust()
    }

    fn adjust(&mut self) -> Option<u32> {
        let error_rate = self.error_rate();
        let old_quota = self.current_quota;

        if error_rate > self.error_threshold {
            let reduced = (self.current_quota as f64 * (1.0 - (error_rate - self.error_threshold) * 0.5)) as u32;
            self.current_quota = reduced.max(self.min_quota);
        } else if error_rate < self.error_threshold * 0.5 && self.current_quota < self.base_quota {
            let raised = ((self.current_quota as f64) * 1.25).ceil() as u32;
            self.current_quota = raised.min(self.base_quota);
        }

        if self.current_quota == old_quota {
            return None;
        }
        self.last_adjustment = Instant::now();
        Some(self.current_quota)
    }

    pub fn error_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    pub fn current_quota(&self) -> u32 {
        self.current_quota
    }
}

fn build_limiter(requests_per_second: u32) -> Arc<DefaultDirectRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

struct LimiterState {
    limiter: Arc<DefaultDirectRateLimiter>,
    quota: AdaptiveQuota,
}

/// Per-provider adaptive rate limiter.
pub struct AdaptiveRateLimiter {
    name: &'static str,
    state: Mutex<LimiterState>,
}

impl AdaptiveRateLimiter {
    /// Create a limiter allowing `requests_per_second` with a 20% error threshold.
    pub fn new(name: &'static str, requests_per_second: u32, error_window: usize) -> Self {
        Self {
            name,
            state: Mutex::new(LimiterState {
                limiter: build_limiter(requests_per_second),
                quota: AdaptiveQuota::new(requests_per_second, error_window, 0.2),
            }),
        }
    }

    /// Wait until the provider quota allows another request.
    #[instrument(skip(self), fields(provider = self.name))]
    pub async fn acquire(&self) {
        let limiter = self.state.lock().await.limiter.clone();
        if limiter.check().is_err() {
            debug!("Provider quota exhausted, waiting for a permit");
            limiter.until_ready().await;
        }
    }

    pub async fn record_success(&self) {
        self.record(true).await;
    }

    pub async fn record_failure(&self) {
        self.record(false).await;
    }

    async fn record(&self, success: bool) {
        let mut state = self.state.lock().await;
        if let Some(new_quota) = state.quota.record(success) {
            warn!(
                "{} error rate {:.0}%, provider quota now {} req/s",
                self.name,
                state.quota.error_rate() * 100.0,
                new_quota
            );
            state.limiter = build_limiter(new_quota);
        }
    }

    pub async fn current_quota(&self) -> u32 {
        self.state.lock().await.quota.current_quota()
    }
}
