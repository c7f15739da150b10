//! Exponential backoff with jitter.
//!
//! [`BackoffPolicy`] is a pure function of the attempt number plus one jitter
//! draw: `min(base * 2^attempt, max) + random(0, jitter) * that`. The
//! connection supervisor schedules its reconnection attempts with it, and
//! [`retry_with_backoff`] applies it to any one-shot async operation.

use std::future::Future;
use std::time::Duration;

use log::debug;
use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::ConnectionOptions;

/// Reconnection timing policy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random extra, as a fraction of the capped delay.
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_options(&ConnectionOptions::default())
    }
}

impl BackoffPolicy {
    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self {
            base_delay: Duration::from_millis(options.reconnect_delay_ms),
            max_delay: Duration::from_millis(options.max_reconnect_delay_ms),
            jitter: options.reconnect_jitter,
            max_attempts: options.max_reconnect_attempts,
        }
    }

    /// Capped exponential delay without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp_ms.min(max_ms))
    }

    /// Delay for `attempt` with a given jitter draw `unit` in `[0, 1)`.
    ///
    /// A non-finite jitter factor or draw counts as no jitter.
    pub fn delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let capped = self.base_delay_for(attempt);
        let jitter = unit_interval(self.jitter) * unit_interval(unit);
        capped + capped.mul_f64(jitter)
    }

    /// Delay for `attempt` with a fresh random jitter draw.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(0.0..1.0);
        self.delay_with(attempt, unit)
    }

    /// Whether `attempts` failed attempts use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

fn unit_interval(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Why a single attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    #[error("{0}")]
    Failed(E),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),
}

/// Terminal outcome of [`retry_with_backoff`].
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: AttemptError<E> },
}

/// Run `op` until it succeeds, the policy gives up, or `cancel` fires.
///
/// `op` receives the zero-based attempt number. Each attempt is bounded by
/// `attempt_timeout` when one is given.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    attempt_timeout: Option<Duration>,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled { attempts });
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            outcome = run_attempt(op(attempts), attempt_timeout) => outcome,
        };

        let last = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        attempts += 1;
        if policy.is_exhausted(attempts) {
            return Err(RetryError::Exhausted { attempts, last });
        }

        let delay = policy.delay_for(attempts - 1);
        debug!("[store-link] Retrying in {}ms (attempt {})", delay.as_millis(), attempts + 1);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
            _ = tokio::time::sleep(delay) => {},
        }
    }
}

async fn run_attempt<T, E, Fut>(fut: Fut, timeout: Option<Duration>) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(AttemptError::Failed),
            Err(_) => Err(AttemptError::TimedOut(limit)),
        },
        None => fut.await.map_err(AttemptError::Failed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: Option<u32>) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: 0.3,
            max_attempts,
        }
    }

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let p = policy(None);
        assert_eq!(p.base_delay_for(0), Duration::from_millis(1000));
        assert_eq!(p.base_delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.base_delay_for(2), Duration::from_millis(4000));
        assert_eq!(p.base_delay_for(5), Duration::from_millis(30_000));
        assert_eq!(p.base_delay_for(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_non_finite_jitter_is_ignored() {
        let p = BackoffPolicy {
            jitter: f64::NAN,
            ..policy(None)
        };
        assert_eq!(p.delay_with(1, 0.5), Duration::from_millis(2000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));

        let p = BackoffPolicy {
            jitter: f64::INFINITY,
            ..policy(None)
        };
        assert_eq!(p.delay_with(0, 0.9), Duration::from_millis(1000));
        assert_eq!(policy(None).delay_with(0, f64::NAN), Duration::from_millis(1000));
    }

    #[test]
    fn test_huge_max_delay_does_not_overflow() {
        let p = BackoffPolicy {
            max_delay: Duration::from_millis(u64::MAX),
            ..policy(None)
        };
        assert!(p.delay_with(63, 1.0) >= Duration::from_millis(u64::MAX / 2));
    }

    #[test]
    fn test_jitter_bounds() {
        let p = policy(None);
        assert_eq!(p.delay_with(2, 0.0), Duration::from_millis(4000));
        assert_eq!(p.delay_with(2, 1.0), Duration::from_millis(5200));

        for attempt in 0..12 {
            let base = p.base_delay_for(attempt);
            let delay = p.delay_for(attempt);
            assert!(delay >= base, "attempt {}: {:?} < {:?}", attempt, delay, base);
            assert!(delay <= base.mul_f64(1.3));
            assert!(delay <= Duration::from_millis(39_000));
        }
    }

    #[test]
    fn test_exhaustion() {
        assert!(!policy(None).is_exhausted(1_000));
        assert!(!policy(Some(3)).is_exhausted(2));
        assert!(policy(Some(3)).is_exhausted(3));
        assert!(policy(Some(0)).is_exhausted(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let c = Arc::clone(&calls);

        let result: Result<&str, RetryError<String>> =
            retry_with_backoff(&policy(Some(5)), &cancel, None, move |attempt| {
                c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("boom {}", attempt))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let cancel = CancellationToken::new();
        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&policy(Some(2)), &cancel, None, |_| async { Err("refused") }).await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last.to_string(), "refused");
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_attempt_timeout() {
        let cancel = CancellationToken::new();
        let result: Result<(), RetryError<&str>> = retry_with_backoff(
            &policy(Some(1)),
            &cancel,
            Some(Duration::from_secs(2)),
            |_| std::future::pending(),
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                last: AttemptError::TimedOut(_),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancelled_while_waiting() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&policy(None), &cancel, None, |_| async { Err("down") }).await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    }
}
