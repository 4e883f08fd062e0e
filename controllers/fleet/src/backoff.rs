//! # Bounded Retry
//!
//! One retry loop shared by the apiserver reachability probe and the
//! readiness wait. A policy bounds the loop by attempt count, by an overall
//! timeout, or both, and chooses how long to wait between attempts.
//!
//! Every wait races the caller's cancellation token, so a shutdown is
//! observed within the current attempt rather than after the nominal delay.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Delay schedule between consecutive attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Wait `attempt * step` after the zero-based failed attempt: 0, 1, 2, ... steps
    Linear(Duration),
    /// Wait the same interval after every failed attempt
    Fixed(Duration),
}

impl Schedule {
    /// Delay to apply after the zero-based `attempt` has failed
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::Linear(step) => step.saturating_mul(attempt),
            Self::Fixed(interval) => *interval,
        }
    }
}

/// Bounds and pacing for [`retry_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (`None` = bounded only by `timeout`)
    pub max_attempts: Option<u32>,
    /// Delay schedule between attempts
    pub schedule: Schedule,
    /// Overall deadline for the whole loop, including waits
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Reachability probing: 5 attempts, waiting 0s, 1s, 2s, 3s between them
    #[must_use]
    pub const fn probe() -> Self {
        Self {
            max_attempts: Some(5),
            schedule: Schedule::Linear(Duration::from_secs(1)),
            timeout: None,
        }
    }

    /// Apiserver readiness: poll every second for up to 30 seconds
    #[must_use]
    pub const fn readiness() -> Self {
        Self {
            max_attempts: None,
            schedule: Schedule::Fixed(Duration::from_secs(1)),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Why [`retry_until`] gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Every permitted attempt failed
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        /// Attempts made
        attempts: u32,
    },

    /// The overall deadline passed first
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The cancellation token fired
    #[error("cancelled")]
    Cancelled,
}

/// Runs `check` until it returns `true`, the policy is exhausted, or `token` fires.
///
/// `check` receives the zero-based attempt number. On success the number of
/// attempts made is returned. No delay follows the final permitted attempt.
pub async fn retry_until<F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    check: F,
) -> Result<u32, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    let attempts = attempt_loop(policy, token, check);
    match policy.timeout {
        Some(limit) => tokio::time::timeout(limit, attempts)
            .await
            .unwrap_or(Err(RetryError::TimedOut(limit))),
        None => attempts.await,
    }
}

async fn attempt_loop<F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut check: F,
) -> Result<u32, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempt = 0u32;

    loop {
        if token.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let succeeded = tokio::select! {
            biased;
            () = token.cancelled() => return Err(RetryError::Cancelled),
            ok = check(attempt) => ok,
        };

        let made = attempt + 1;
        if succeeded {
            return Ok(made);
        }
        if policy.max_attempts.is_some_and(|max| made >= max) {
            return Err(RetryError::Exhausted { attempts: made });
        }

        tokio::select! {
            biased;
            () = token.cancelled() => return Err(RetryError::Cancelled),
            () = tokio::time::sleep(policy.schedule.delay_after(attempt)) => {}
        }

        attempt = made;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_linear_schedule() {
        let schedule = Schedule::Linear(Duration::from_secs(1));
        let delays: Vec<u64> = (0..5).map(|i| schedule.delay_after(i).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fixed_schedule() {
        let schedule = Schedule::Fixed(Duration::from_secs(1));
        assert_eq!(schedule.delay_after(0), Duration::from_secs(1));
        assert_eq!(schedule.delay_after(7), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_policy_waits_increase_linearly() {
        let token = CancellationToken::new();
        let started = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result = retry_until(&RetryPolicy::probe(), &token, |_| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(started.elapsed().as_secs());
                false
            }
        })
        .await;

        assert_eq!(result, Err(RetryError::Exhausted { attempts: 5 }));
        // Cumulative offsets for gaps of 0s, 1s, 2s, 3s
        assert_eq!(*seen.lock().unwrap(), vec![0, 0, 1, 3, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let token = CancellationToken::new();

        let result = retry_until(&RetryPolicy::probe(), &token, |attempt| async move { attempt == 2 }).await;

        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_policy_times_out() {
        let token = CancellationToken::new();
        let started = Instant::now();

        let result = retry_until(&RetryPolicy::readiness(), &token, |_| async { false }).await;

        assert_eq!(result, Err(RetryError::TimedOut(Duration::from_secs(30))));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_wait_aborts_promptly() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });
        let started = Instant::now();
        let attempts = Arc::new(Mutex::new(0u32));

        let result = retry_until(&RetryPolicy::probe(), &token, |_| {
            let attempts = attempts.clone();
            async move {
                *attempts.lock().unwrap() += 1;
                false
            }
        })
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        // Attempts at 0s, 0s and 1s; cancelled during the 2s wait
        assert_eq!(*attempts.lock().unwrap(), 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let mut called = false;

        let result = retry_until(&RetryPolicy::probe(), &token, |_| {
            called = true;
            async { true }
        })
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert!(!called);
    }
}
