use std::future::Future;
use std::time::Duration;

use crate::iq::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Server faults and connection failures are worth retrying; client errors
/// and malformed answers are not.
pub fn classify(error: &RemoteError) -> ErrorClass {
    match error {
        RemoteError::Status { status, .. } if *status >= 500 => ErrorClass::Transient,
        RemoteError::Transport(_) => ErrorClass::Transient,
        RemoteError::Status { .. }
        | RemoteError::Request(_)
        | RemoteError::InvalidResponse(_)
        | RemoteError::Evaluation(_) => ErrorClass::Permanent,
    }
}

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Returns the delay before the next attempt, or `None` when the error must
    /// be surfaced.
    pub fn next_delay(&self, error: &RemoteError, retries_so_far: u32) -> Option<Duration> {
        if classify(error) == ErrorClass::Permanent || retries_so_far >= self.max_retries {
            None
        } else {
            Some(self.backoff(retries_so_far + 1))
        }
    }
}

/// Result of a call run under a [`RetryPolicy`].
#[derive(Debug)]
pub(crate) struct Attempted<T> {
    pub(crate) result: Result<T, RemoteError>,
    pub(crate) retries: u32,
}

impl<T> Attempted<T> {
    pub(crate) fn attempts(&self) -> u32 {
        self.retries + 1
    }
}

pub(crate) async fn with_retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    mut call: F,
    mut on_retry: R,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
    R: FnMut(u32, Duration, &RemoteError),
{
    let mut retries = 0;
    loop {
        match call().await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    retries,
                }
            }
            Err(error) => match policy.next_delay(&error, retries) {
                Some(delay) => {
                    retries += 1;
                    on_retry(retries, delay, &error);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Attempted {
                        result: Err(error),
                        retries,
                    }
                }
            },
        }
    }
}
