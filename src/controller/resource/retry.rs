//! Retry wrapper with bounded exponential backoff
//!
//! Retry state lives in the wrapper's call frame. A step that fails with a
//! non-retryable error is not called again.

use super::{Resource, ResourceError};
use crate::controller::context::RunContext;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per step, the first call included
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound of the delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Call every step exactly once
    pub fn none() -> Self {
        Self::with_max_attempts(1)
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Create,
    Delete,
}

/// Retries the wrapped step on retryable errors
pub struct Retrying<K> {
    inner: Box<dyn Resource<K>>,
    config: RetryConfig,
}

impl<K: Send + Sync + 'static> Retrying<K> {
    pub fn new(inner: Box<dyn Resource<K>>, config: RetryConfig) -> Self {
        Retrying { inner, config }
    }

    async fn call(
        &self,
        direction: Direction,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<(), ResourceError> {
        match direction {
            Direction::Create => self.inner.ensure_created(run, obj).await,
            Direction::Delete => self.inner.ensure_deleted(run, obj).await,
        }
    }

    async fn with_retries(
        &self,
        direction: Direction,
        run: &mut RunContext,
        obj: &K,
    ) -> Result<(), ResourceError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match self.call(direction, run, obj).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(
                    resource = %self.inner.name(),
                    error = %err,
                    "Step failed with non-retryable error"
                );
                return Err(err);
            }

            if attempt >= max_attempts {
                error!(
                    resource = %self.inner.name(),
                    attempt = attempt,
                    error = %err,
                    "Step failed after max retries"
                );
                return Err(err);
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                resource = %self.inner.name(),
                attempt = attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Step failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> Resource<K> for Retrying<K> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn ensure_created(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        self.with_retries(Direction::Create, run, obj).await
    }

    async fn ensure_deleted(&self, run: &mut RunContext, obj: &K) -> Result<(), ResourceError> {
        self.with_retries(Direction::Delete, run, obj).await
    }
}
