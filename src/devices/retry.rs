//! Retry policy for device endpoint calls
//!
//! Transport faults are retried a fixed number of times with a fixed pause.
//! A reply the device actually produced is never retried.

use std::time::Duration;

use super::types::FailureKind;

/// Retry policy for one HTTP exchange with a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Attempt count, never less than one
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Delay before the attempt following `attempt`
    ///
    /// Fixed, no growth: devices sit on a LAN and either answer or are gone.
    #[must_use]
    pub const fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.backoff
    }
}

/// Whether a transport error is worth another attempt
///
/// Connect failures, timeouts and connections dropped mid-request qualify.
/// Builder, redirect and decode errors do not.
#[must_use]
pub fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
}

/// Whether a reply whose body is not a JSON object should be retried
///
/// Only server errors qualify (proxy page, half-started server). A 5xx with a
/// JSON body is a real answer and never reaches this check.
#[must_use]
pub fn is_recoverable(status: u16) -> bool {
    (500..600).contains(&status)
}

/// Classify the final transport error
#[must_use]
pub fn failure_kind(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::ConnectionFailure
    }
}
