use std::time::Duration;

use super::retry::RetryPolicy;

/// Knobs for admission, polling cadence, and verdict classification.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub poll_interval: Duration,
    /// Status checks answered "in progress" before a job is given up as unfinished.
    pub max_polls: u32,
    pub retry: RetryPolicy,
    /// Treat a `Warning` policy action as a failed evaluation.
    pub fail_on_warning: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            poll_interval: Duration::from_secs(10),
            max_polls: 360,
            retry: RetryPolicy::default(),
            fail_on_warning: false,
        }
    }
}
