//! Rate limiter / floodwait controller: paces outbound batches and adapts
//! to flood-wait signals from the platform.
//!
//! The inter-request spacing itself (`batch_delay`) is adaptive — it
//! shrinks and grows at runtime in response to observed floodwaits — so it
//! is tracked as a plain field rather than baked into a `governor` quota,
//! which is fixed at construction. A `governor` direct limiter still backs
//! a hard ceiling derived from `max_batch_delay`, so that even a runaway
//! speed-up can never exceed the configured floor on request spacing.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter as GovernorLimiter};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub batch_delay: Duration,
    pub min_batch_delay: Duration,
    pub max_batch_delay: Duration,
    pub adaptive: bool,
    pub consecutive_threshold: u32,
    pub slowdown_factor: f64,
    pub speedup_factor: f64,
    pub speedup_interval: Duration,
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(1000),
            min_batch_delay: Duration::from_millis(200),
            max_batch_delay: Duration::from_secs(30),
            adaptive: true,
            consecutive_threshold: 2,
            slowdown_factor: 1.5,
            speedup_factor: 0.9,
            speedup_interval: Duration::from_secs(5 * 60),
            window: Duration::from_secs(60),
        }
    }
}

/// A single rate adjustment, emitted for logging whenever `batch_delay`
/// changes in response to floodwait pressure (or the absence of it).
#[derive(Debug, Clone, PartialEq)]
pub struct RateAdjustment {
    pub previous_delay: Duration,
    pub new_delay: Duration,
    pub reason: &'static str,
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    batch_delay: Duration,
    last_request_time: Option<Instant>,
    last_flood_wait_time: Option<Instant>,
    flood_wait_window: Vec<Instant>,
    request_count: u64,
    flood_wait_count: u64,
    total_flood_wait: Duration,
    floor_limiter: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let per_second = (1_000.0 / config.max_batch_delay.as_millis().max(1) as f64)
            .ceil()
            .max(1.0) as u32;
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap());
        Self {
            batch_delay: config.batch_delay,
            floor_limiter: GovernorLimiter::direct(quota),
            config,
            last_request_time: None,
            last_flood_wait_time: None,
            flood_wait_window: Vec::new(),
            request_count: 0,
            flood_wait_count: 0,
            total_flood_wait: Duration::ZERO,
        }
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }

    pub fn flood_wait_count(&self) -> u64 {
        self.flood_wait_count
    }

    pub fn total_flood_wait_seconds(&self) -> u64 {
        self.total_flood_wait.as_secs()
    }

    /// Waits until at least `batch_delay` has elapsed since the previous
    /// call, then records this call as the new baseline. Also checks
    /// whether a speed-up is due.
    pub async fn acquire(&mut self) -> Option<RateAdjustment> {
        let now = Instant::now();
        if let Some(last) = self.last_request_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.batch_delay {
                tokio::time::sleep(self.batch_delay - elapsed).await;
            }
        }
        while self.floor_limiter.check().is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.last_request_time = Some(Instant::now());
        self.request_count += 1;
        self.maybe_speed_up()
    }

    /// Records a floodwait observation and, if the adaptive consecutive
    /// threshold is reached within the rolling window, slows down.
    pub fn record_flood_wait(&mut self, seconds: u64) -> Option<RateAdjustment> {
        self.flood_wait_count += 1;
        self.total_flood_wait += Duration::from_secs(seconds);
        let now = Instant::now();
        self.last_flood_wait_time = Some(now);

        self.flood_wait_window.retain(|t| now.saturating_duration_since(*t) < self.config.window);
        self.flood_wait_window.push(now);

        if !self.config.adaptive {
            return None;
        }
        if self.flood_wait_window.len() as u32 >= self.config.consecutive_threshold {
            self.flood_wait_window.clear();
            return Some(self.slow_down());
        }
        None
    }

    fn slow_down(&mut self) -> RateAdjustment {
        let previous = self.batch_delay;
        let scaled = previous.mul_f64(self.config.slowdown_factor);
        self.batch_delay = scaled.min(self.config.max_batch_delay);
        RateAdjustment {
            previous_delay: previous,
            new_delay: self.batch_delay,
            reason: "consecutive flood waits",
        }
    }

    fn maybe_speed_up(&mut self) -> Option<RateAdjustment> {
        if !self.config.adaptive {
            return None;
        }
        let Some(last_flood) = self.last_flood_wait_time else {
            return None;
        };
        let now = Instant::now();
        if now.saturating_duration_since(last_flood) < self.config.speedup_interval {
            return None;
        }
        let previous = self.batch_delay;
        let scaled = previous.mul_f64(self.config.speedup_factor);
        self.batch_delay = scaled.max(self.config.min_batch_delay);
        self.last_flood_wait_time = None;
        if self.batch_delay == previous {
            return None;
        }
        Some(RateAdjustment {
            previous_delay: previous,
            new_delay: self.batch_delay,
            reason: "no recent flood waits",
        })
    }
}

/// Outcome of `with_flood_wait_retry`'s wrapped operation: either the
/// payload, or a floodwait signal carrying the wait duration.
pub enum RetryOutcome<T> {
    Done(T),
    FloodWait(u64),
}

/// Acquires, then runs `op`; on a floodwait outcome, records it, sleeps
/// for the indicated duration (invoking `on_wait` once with the total
/// duration — callers that want a per-second countdown loop build it on
/// top of their own `on_wait`), then retries. Non-floodwait outcomes
/// propagate.
pub async fn with_flood_wait_retry<F, Fut, T, W>(
    limiter: &mut RateLimiter,
    mut op: F,
    mut on_wait: W,
) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = RetryOutcome<T>>,
    W: FnMut(u64),
{
    loop {
        limiter.acquire().await;
        match op().await {
            RetryOutcome::Done(value) => return value,
            RetryOutcome::FloodWait(seconds) => {
                limiter.record_flood_wait(seconds);
                on_wait(seconds);
                tokio::time::sleep(Duration::from_secs(seconds)).await;
            }
        }
    }
}
