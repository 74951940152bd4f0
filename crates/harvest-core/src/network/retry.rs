//! Backoff for transient transfer failures.
//!
//! Transfers are attempted once unless the engine is built with
//! `max_retries > 0`. Each retry waits `base * 2^n` (capped, with jitter);
//! the wait is abandoned as soon as the transfer's cancellation token fires.

use crate::cancel::CancellationToken;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Statuses a server may answer differently on the next attempt.
pub fn is_transient_status(code: u16) -> bool {
    code == 429 || (500..600).contains(&code)
}

/// Attempt budget and backoff curve.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// `max_retries` extra attempts after the first.
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Wait before retry number `retry` (0 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let cap = self.max_delay.as_secs_f64();
        let mut secs = (self.base_delay.as_secs_f64() * 2f64.powi(retry.min(30) as i32)).min(cap);
        if self.jitter {
            secs = (secs * rand::rng().random_range(0.5..1.5)).min(cap);
        }
        Duration::from_secs_f64(secs)
    }
}

/// What happened across the attempts of one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    /// Cancellation fired while waiting for the next attempt.
    pub interrupted: bool,
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts or `cancel` fires during a backoff wait.
///
/// The last error is returned in every failing case.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
    is_transient: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut stats = RetryStats::default();

    loop {
        stats.attempts += 1;
        let err = match operation().await {
            Ok(value) => return (Ok(value), stats),
            Err(err) => err,
        };

        if !is_transient(&err) {
            debug!("Not retrying permanent failure: {}", err);
            return (Err(err), stats);
        }
        if stats.attempts >= max_attempts {
            warn!("Giving up after {} attempts: {}", stats.attempts, err);
            return (Err(err), stats);
        }

        let delay = config.delay_for(stats.attempts - 1);
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            stats.attempts, max_attempts, err, delay
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stats.interrupted = true;
                return (Err(err), stats);
            }
            _ = tokio::time::sleep(delay) => stats.total_delay += delay,
        }
    }
}
