//! Adaptive throttle for the open-data API.
//!
//! The portal throttles anonymous clients without publishing its limits, so
//! the limiter only reacts to what responses tell it:
//! - HTTP 429 → exponential pause (2, 4, 8 … s), or the `Retry-After` hint,
//!   capped at [`MAX_BACKOFF_SECS`]
//! - `x-ratelimit-remaining: 0` with `x-ratelimit-reset` → pause until reset
//!
//! State is kept per endpoint URL so the resource and metadata endpoints do
//! not slow each other down.

use dashmap::DashMap;
use reqwest::header::{AsHeaderName, HeaderMap, RETRY_AFTER};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound for a single pause.
pub const MAX_BACKOFF_SECS: f64 = 60.0;

/// What the limiter currently knows about one endpoint.
#[derive(Debug, Clone, Default)]
pub struct EndpointThrottle {
    /// 429 answers since the last success
    pub strikes: u32,
    /// No request before this instant
    pub paused_until: Option<Instant>,
    /// Requests left in the advertised window
    pub window_remaining: Option<u32>,
    pub window_resets_at: Option<Instant>,
}

impl EndpointThrottle {
    /// Delay still owed before the next request; zero when free to go.
    pub fn delay(&self, now: Instant) -> Duration {
        let backoff = self
            .paused_until
            .map_or(Duration::ZERO, |until| until.saturating_duration_since(now));

        let window = match (self.window_remaining, self.window_resets_at) {
            (Some(0), Some(reset)) => reset.saturating_duration_since(now),
            _ => Duration::ZERO,
        };

        backoff.max(window)
    }

    /// Register a 429 and return the pause it imposes.
    pub fn strike(&mut self, retry_after_secs: Option<f64>, now: Instant) -> Duration {
        self.strikes += 1;
        let secs = match retry_after_secs {
            Some(hint) => hint.max(0.0),
            None => 2f64.powi(self.strikes.min(16) as i32),
        }
        .min(MAX_BACKOFF_SECS);

        let pause = Duration::from_secs_f64(secs);
        self.paused_until = Some(now + pause);
        pause
    }

    /// A non-throttled answer clears the backoff.
    pub fn clear(&mut self) {
        self.strikes = 0;
        self.paused_until = None;
    }

    /// Read the optional window headers.
    pub fn observe_headers(&mut self, headers: &HeaderMap, now: Instant) {
        if let Some(remaining) = header_number::<u32>(headers, "x-ratelimit-remaining") {
            self.window_remaining = Some(remaining);
        }
        if let Some(secs) = header_number::<f64>(headers, "x-ratelimit-reset") {
            let secs = secs.clamp(0.0, MAX_BACKOFF_SECS);
            self.window_resets_at = Some(now + Duration::from_secs_f64(secs));
        }
    }
}

fn header_number<T: FromStr>(headers: &HeaderMap, name: impl AsHeaderName) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Throttle shared by every request a client sends.
#[derive(Debug, Default)]
pub struct RateLimiter {
    endpoints: DashMap<String, EndpointThrottle>,
    responses: AtomicU64,
    throttled: AtomicU64,
    waited_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until `endpoint` may be called again. Returns the time slept.
    pub async fn wait_if_needed(&self, endpoint: &str) -> Duration {
        // Copy the delay out; the shard lock must not be held across the sleep.
        let delay = self
            .endpoints
            .get(endpoint)
            .map_or(Duration::ZERO, |throttle| throttle.delay(Instant::now()));

        if !delay.is_zero() {
            debug!(endpoint = endpoint, wait_ms = delay.as_millis() as u64, "Throttled, waiting");
            self.waited_ms
                .fetch_add(delay.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
        }

        delay
    }

    /// Feed one response back into the throttle. For a 429, returns the
    /// pause imposed before the next request to `endpoint`.
    pub fn record_response(
        &self,
        endpoint: &str,
        status: u16,
        headers: &HeaderMap,
    ) -> Option<Duration> {
        let now = Instant::now();
        self.responses.fetch_add(1, Ordering::Relaxed);

        let mut throttle = self.endpoints.entry(endpoint.to_string()).or_default();
        throttle.observe_headers(headers, now);

        match status {
            429 => {
                self.throttled.fetch_add(1, Ordering::Relaxed);
                let pause = throttle.strike(header_number(headers, RETRY_AFTER), now);
                warn!(
                    endpoint = endpoint,
                    strikes = throttle.strikes,
                    pause_ms = pause.as_millis() as u64,
                    "Rate limited (429), backing off"
                );
                Some(pause)
            }
            s if s < 400 => {
                throttle.clear();
                None
            }
            _ => None,
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            responses: self.responses.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            waited: Duration::from_millis(self.waited_ms.load(Ordering::Relaxed)),
            endpoints_tracked: self.endpoints.len(),
        }
    }
}

/// Counters since the limiter was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub responses: u64,
    /// Responses that were 429
    pub throttled: u64,
    pub waited: Duration,
    pub endpoints_tracked: usize,
}
