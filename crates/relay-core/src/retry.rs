//! Bounded retry with exponential backoff and jitter.
//!
//! The executor knows nothing about the operation it wraps. Each call site
//! builds a fresh [`RetryPolicy`] and hands over a closure producing a
//! future; on exhaustion the last error is returned unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RetryTiming: the configurable part of every policy
// ---------------------------------------------------------------------------

/// Backoff timing shared by every call site. The retry *count* is fixed per
/// call site; only the timing is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryTiming {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_jitter_ms() -> u64 {
    250
}

impl Default for RetryTiming {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

impl RetryTiming {
    /// No waiting between attempts. Used by tests.
    pub const IMMEDIATE: Self = Self {
        base_delay_ms: 0,
        backoff_factor: 1.0,
        jitter_ms: 0,
    };

    /// Build a policy for one call site.
    pub fn policy(&self, label: &'static str, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_factor: self.backoff_factor,
            jitter: Duration::from_millis(self.jitter_ms),
            label,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Retry configuration for a single call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound of the uniformly random extra delay.
    pub jitter: Duration,
    /// Name used in diagnostics only.
    pub label: &'static str,
}

impl RetryPolicy {
    /// Deterministic part of the delay before retry `attempt` (0-indexed):
    /// `base_delay * backoff_factor^attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis.round() as u64)
    }

    /// Full delay before retry `attempt`, jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff_for(attempt) + jitter
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Run `operation` up to `policy.max_retries + 1` times, retrying every
/// failure.
pub async fn execute<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    execute_if(policy, operation, |_| true).await
}

/// Like [`execute`], but stops early when `should_retry` rejects an error.
/// The rejected error is returned as-is.
pub async fn execute_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries {
                    if policy.max_retries > 0 {
                        tracing::error!(
                            label = policy.label,
                            attempts = attempt + 1,
                            error = %err,
                            "retries exhausted"
                        );
                    }
                    return Err(err);
                }
                if !should_retry(&err) {
                    tracing::warn!(
                        label = policy.label,
                        error = %err,
                        "non-retryable failure"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    label = policy.label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
