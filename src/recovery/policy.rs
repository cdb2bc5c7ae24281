//! Recovery policy configuration.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use super::backoff::Backoff;
use crate::error::Error;

type RetryPredicate = Rc<dyn Fn(&Error) -> bool>;

/// How a failed operation is retried.
///
/// A policy combines a [`Backoff`] table with an optional cap on the number
/// of recovery attempts and an optional predicate that marks errors as not
/// worth retrying. Without a cap the loop retries until success.
///
/// # Examples
///
/// ```rust
/// use beampromise::recovery::{Backoff, RecoveryPolicy};
/// use beampromise::ErrorKind;
///
/// let policy = RecoveryPolicy::new(Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]))
///     .with_max_attempts(5)
///     .retry_if(|err| err.kind() != ErrorKind::Panicked);
///
/// assert_eq!(policy.max_attempts(), Some(5));
/// assert!(!policy.is_exhausted(3));
/// assert!(policy.is_exhausted(4));
/// ```
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoveryPolicy {
    backoff: Backoff,
    #[cfg_attr(feature = "serde", serde(default))]
    max_attempts: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip))]
    retry_if: Option<RetryPredicate>,
}

impl fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPolicy")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RecoveryPolicy {
    /// An uncapped policy using `backoff` between attempts.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            max_attempts: None,
            retry_if: None,
        }
    }

    /// Give up after `n` recovery attempts.
    ///
    /// The failure that starts recovery is not an attempt; the factory is
    /// called at most `n` times. A cap of zero behaves like one.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    /// Only keep retrying while `predicate` returns true for the latest error.
    ///
    /// A rejected error ends the loop immediately and becomes the final
    /// failure.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Error) -> bool + 'static,
    {
        self.retry_if = Some(Rc::new(predicate));
        self
    }

    /// The backoff table.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// The attempt cap, if any.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Returns false if the predicate marks `error` as permanent.
    pub fn is_retryable(&self, error: &Error) -> bool {
        self.retry_if.as_ref().is_none_or(|p| p(error))
    }

    /// Returns true if no attempt may follow a failed attempt `attempt` (0-indexed).
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts
            .is_some_and(|max| attempt.saturating_add(1) >= max)
    }

    /// The wait after attempt `attempt` fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay_with_jitter(attempt)
    }
}
