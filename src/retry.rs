//! Bounded retry with an injectable cooldown.
//!
//! The cooldown is a trait so callers can wait on the tokio clock in
//! production and skip or record the wait in tests.

use async_trait::async_trait;
use std::time::Duration;

/// Waits between attempts.
#[async_trait]
pub trait Cooldown: Send + Sync {
    /// Suspends the caller for `delay`.
    async fn wait(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCooldown;

#[async_trait]
impl Cooldown for TokioCooldown {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCooldown;

#[async_trait]
impl Cooldown for NoCooldown {
    async fn wait(&self, _delay: Duration) {}
}

/// How many times a failed call is retried and how long to wait before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Fixed delay before every retry
    pub cooldown: Duration,
}

impl RetryPolicy {
    /// A policy with `max_retries` retries separated by `cooldown`.
    pub fn new(max_retries: usize, cooldown: Duration) -> Self {
        Self {
            max_retries,
            cooldown,
        }
    }
}

impl Default for RetryPolicy {
    /// One retry after a one-minute cooldown.
    fn default() -> Self {
        Self::new(1, Duration::from_secs(60))
    }
}
