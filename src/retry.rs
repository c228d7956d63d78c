//! # Retry policy
//!
//! Maps the outcome of one execution attempt to the store mutation that
//! resolves it. The policy is a pure function of the job's counters, the
//! outcome and the clock; it never touches the store.
//!
//! | Outcome            | Condition                       | Decision                                          |
//! |--------------------|---------------------------------|---------------------------------------------------|
//! | success            |                                 | [`RetryDecision::Complete`]                       |
//! | non-zero exit      | `attempts + 1 > max_retries`    | [`RetryDecision::Dead`] with `attempts + 1`       |
//! | non-zero exit      | `attempts + 1 <= max_retries`   | [`RetryDecision::Retry`], `now + base^(attempts + 1)` |
//! | execution fault    |                                 | [`RetryDecision::Release`], attempts unchanged    |
//!
//! Execution faults are retried immediately and never count as an attempt. A
//! fault that never clears (for example a missing shell) therefore keeps the
//! job cycling between `pending` and `processing` without ever dead-lettering it.
//!
//! ```rust
//! use queuectl::{AttemptOutcome, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(2);
//! let decision = policy.decide(0, 2, AttemptOutcome::Failed, 1_000);
//! assert_eq!(decision, RetryDecision::Retry { attempts: 1, available_at: 1_002 });
//! ```

/// How an execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The command exited with status 0
    Succeeded,
    /// The command ran and exited non-zero
    Failed,
    /// The command could not be launched or reaped
    Fault,
}

/// The store mutation that resolves a claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Complete,
    Retry { attempts: u32, available_at: i64 },
    Dead { attempts: u32 },
    Release,
}

/// Exponential backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff base in seconds; the n-th retry waits `backoff_base^n` seconds
    pub backoff_base: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { backoff_base: 2 }
    }
}

impl RetryPolicy {
    pub fn new(backoff_base: u32) -> Self {
        RetryPolicy { backoff_base }
    }

    /// Delay in seconds before a job that has failed `attempts` times may run again.
    ///
    /// Saturates instead of overflowing for large exponents.
    pub fn delay_secs(&self, attempts: u32) -> i64 {
        let delay = u64::from(self.backoff_base).saturating_pow(attempts);
        i64::try_from(delay).unwrap_or(i64::MAX)
    }

    /// Decides the next state of a job that had `attempts` completed attempts
    /// before this one. `now_secs` is the current time in epoch seconds.
    pub fn decide(
        &self,
        attempts: u32,
        max_retries: u32,
        outcome: AttemptOutcome,
        now_secs: i64,
    ) -> RetryDecision {
        match outcome {
            AttemptOutcome::Succeeded => RetryDecision::Complete,
            AttemptOutcome::Fault => RetryDecision::Release,
            AttemptOutcome::Failed => {
                let attempts = attempts.saturating_add(1);
                if attempts > max_retries {
                    RetryDecision::Dead { attempts }
                } else {
                    RetryDecision::Retry {
                        attempts,
                        available_at: now_secs.saturating_add(self.delay_secs(attempts)),
                    }
                }
            }
        }
    }
}
