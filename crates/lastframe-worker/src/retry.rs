//! Failure policy and retry backoff.
//!
//! Decides what happens to an item whose extraction or output failed: another
//! attempt later, or a `failed` ledger record so it is never tried again.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do with an item that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Requeue with backoff until `max_attempts`, then record as failed
    #[default]
    Retry,
    /// Record as failed on the first failure
    MarkProcessed,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Retry => "retry",
            FailurePolicy::MarkProcessed => "mark_processed",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(FailurePolicy::Retry),
            "mark_processed" | "mark-processed" => Ok(FailurePolicy::MarkProcessed),
            other => Err(format!(
                "unknown failure policy '{}' (expected retry or mark_processed)",
                other
            )),
        }
    }
}

/// Backoff settings for the `retry` policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per identity, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryConfig {
    /// Delay after the failure of `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.pow(exponent));
        delay.min(self.max_delay)
    }
}

/// Outcome of applying the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Try again after the delay
    Requeue(Duration),
    /// Record the identity as failed
    GiveUp,
}

/// Decide what to do after `attempt` failed.
pub fn decide(
    policy: FailurePolicy,
    retry: &RetryConfig,
    attempt: u32,
    retryable: bool,
) -> FailureAction {
    match policy {
        FailurePolicy::Retry if retryable && attempt < retry.max_attempts => {
            FailureAction::Requeue(retry.delay_for_attempt(attempt))
        }
        _ => FailureAction::GiveUp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
        };

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(60), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_until_max_attempts() {
        let config = RetryConfig::default();
        assert_eq!(
            decide(FailurePolicy::Retry, &config, 1, true),
            FailureAction::Requeue(Duration::from_secs(5))
        );
        assert_eq!(
            decide(FailurePolicy::Retry, &config, 2, true),
            FailureAction::Requeue(Duration::from_secs(10))
        );
        assert_eq!(decide(FailurePolicy::Retry, &config, 3, true), FailureAction::GiveUp);
        assert_eq!(decide(FailurePolicy::Retry, &config, 1, false), FailureAction::GiveUp);
    }

    #[test]
    fn test_mark_processed_never_requeues() {
        let config = RetryConfig::default();
        assert_eq!(
            decide(FailurePolicy::MarkProcessed, &config, 1, true),
            FailureAction::GiveUp
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("retry".parse::<FailurePolicy>().unwrap(), FailurePolicy::Retry);
        assert_eq!(
            "MARK_PROCESSED".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::MarkProcessed
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }
}
