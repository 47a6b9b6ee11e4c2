//! Bounded, retried remote queries.
//!
//! A `RetryPolicy` is a plain value (attempt bound, back-off, retryable
//! predicate) so it can be exercised in tests with `Backoff::None` and no
//! real delays. The provider's no-data code is never retried: it is a normal
//! outcome, not a failure.

use super::provider::{DataError, QuoteSession, ResponseStatus, SeriesRequest};
use crate::domain::RawTable;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay inserted before each retry (never before the first attempt).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// A single failed attempt.
#[derive(Debug)]
pub enum RemoteFailure {
    /// The provider answered with a non-zero, non-no-data status code.
    Status { code: i64 },
    /// The session itself failed (transport, decoding, not started).
    Session(DataError),
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::Status { code } => write!(f, "provider status {code}"),
            RemoteFailure::Session(e) => write!(f, "{e}"),
        }
    }
}

pub type RetryPredicate = fn(&RemoteFailure) -> bool;

/// Retry every failure the provider can produce.
pub fn retry_all(_: &RemoteFailure) -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: RetryPredicate,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
            retryable: retry_all,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    /// No delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Backoff::None)
    }

    pub fn with_predicate(mut self, retryable: RetryPredicate) -> Self {
        self.retryable = retryable;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }
}

/// Result of a retried query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Data(RawTable),
    /// The provider has nothing for this instrument/range.
    NoData,
    /// Every permitted attempt failed.
    Unavailable { attempts: u32, last_error: String },
}

/// Issues one bounded, retried call against a session.
#[derive(Debug, Clone, Default)]
pub struct RetryingQuery {
    policy: RetryPolicy,
}

impl RetryingQuery {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn fetch(&self, session: &mut dyn QuoteSession, request: &SeriesRequest) -> QueryOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_failure: Option<RemoteFailure> = None;

        while attempts < max_attempts {
            if attempts > 0 {
                let delay = self.policy.backoff.delay(attempts);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            attempts += 1;

            let failure = match session.series(request) {
                Ok(response) => match response.status() {
                    ResponseStatus::Ok => return QueryOutcome::Data(response.data),
                    ResponseStatus::NoData => {
                        debug!(instrument = %request.instrument, "provider reports no data for range");
                        return QueryOutcome::NoData;
                    }
                    ResponseStatus::Error(code) => RemoteFailure::Status { code },
                },
                Err(e) => RemoteFailure::Session(e),
            };

            warn!(
                instrument = %request.instrument,
                attempt = attempts,
                max_attempts,
                fields = %request.joined_fields(),
                "remote query failed: {failure}"
            );

            let retry = (self.policy.retryable)(&failure);
            last_failure = Some(failure);
            if !retry {
                break;
            }
        }

        QueryOutcome::Unavailable {
            attempts,
            last_error: last_failure
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no attempt made".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let b = Backoff::Fixed(Duration::from_millis(500));
        assert_eq!(b.delay(1), Duration::from_millis(500));
        assert_eq!(b.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let b = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(b.delay(1), Duration::from_millis(100));
        assert_eq!(b.delay(2), Duration::from_millis(200));
        assert_eq!(b.delay(3), Duration::from_millis(350));
        assert_eq!(b.delay(40), Duration::from_millis(350));
    }

    #[test]
    fn default_policy_matches_provider_defaults() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.backoff, Backoff::Fixed(Duration::from_millis(500)));
        assert!((p.retryable)(&RemoteFailure::Status { code: -1 }));
    }
}
