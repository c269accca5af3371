//! Task model (spec §4.4): name, typed input/output (carried as
//! `serde_json::Value` at the engine boundary), retry policy, and the
//! pool/rate-limit bucket it runs on.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Worth retrying: network blip, 5xx, 429.
    Transient,
    /// Retrying won't help: 4xx other than 429, bad input.
    Permanent,
    /// The run was cancelled; don't retry, don't treat as a failure.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::FailedTerminal | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with jitter: `base * 2^attempt` plus up to 50%
    /// random jitter, capped at 30s so a misbehaving task doesn't stall a
    /// workflow for minutes between attempts.
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(30_000);
        let jitter = (capped as f64 * 0.5 * deterministic_jitter(attempt)) as u64;
        std::time::Duration::from_millis(capped + jitter)
    }
}

/// Jitter derived from the attempt number rather than `rand`/`Instant`, so
/// backoff delays stay reproducible in tests (the engine never needs
/// cryptographic randomness here, just spread).
fn deterministic_jitter(attempt: u32) -> f64 {
    let x = (attempt as u64).wrapping_mul(2654435761) % 1000;
    x as f64 / 1000.0
}

/// Declares everything about a task except its behaviour (which lives in
/// the closure passed to [`crate::workflow::run_task`]).
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub pool: String,
    pub rate_limit_bucket: Option<String>,
    pub retry: RetryPolicy,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, pool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool: pool.into(),
            rate_limit_bucket: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_rate_limit(mut self, bucket: impl Into<String>) -> Self {
        self.rate_limit_bucket = Some(bucket.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_with_attempt() {
        let policy = RetryPolicy::default();
        let d0 = policy.backoff_for_attempt(0);
        let d3 = policy.backoff_for_attempt(3);
        assert!(d3 > d0);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        let d = policy.backoff_for_attempt(63);
        assert!(d.as_millis() <= 30_000 + 15_000);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::FailedTerminal.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::FailedRetryable.is_terminal());
    }
}
