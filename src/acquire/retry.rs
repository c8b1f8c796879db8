//! Retry Controller
//!
//! Runs an operation until it succeeds, fails permanently, or runs out of
//! attempts. Waits between attempts follow [`BackoffPolicy`] and are plain
//! `tokio::time::sleep`s, so dropping the future (e.g. on a budget timeout)
//! interrupts a wait in progress.

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Failure classes that can be retried, each with its own delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Transient,
    RateLimited,
    Blocked,
}

/// What to do with the value an attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stop and hand the value back (success).
    Done,
    /// Try again after a delay, optionally honouring an origin hint.
    Retry {
        kind: RetryKind,
        hint: Option<Duration>,
    },
    /// Stop immediately without further attempts (fatal).
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub rate_limit_multiplier: f64,
    pub blocked_penalty: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl BackoffPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier.max(1.0),
            rate_limit_multiplier: cfg.rate_limit_multiplier.max(1.0),
            blocked_penalty: Duration::from_millis(cfg.blocked_penalty_ms),
            jitter: cfg.jitter.clamp(0.0, 0.99),
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based),
    /// before jitter.
    pub fn nominal_delay(&self, kind: RetryKind, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let grow = |factor: f64| -> Duration {
            let ms = self.base.as_millis() as f64 * factor.powi(exponent);
            let capped = ms.min(self.max_delay.as_millis() as f64);
            Duration::from_millis(capped as u64)
        };

        let delay = match kind {
            RetryKind::Transient => grow(self.multiplier),
            RetryKind::RateLimited => match hint {
                Some(hint) => hint,
                None => grow(self.rate_limit_multiplier),
            },
            RetryKind::Blocked => grow(self.multiplier) + self.blocked_penalty,
        };
        delay.min(self.max_delay)
    }

    /// Nominal delay randomized within the jitter band, never above the ceiling.
    ///
    /// Origin hints are only ever stretched, never shortened.
    pub fn delay(&self, kind: RetryKind, attempt: u32, hint: Option<Duration>) -> Duration {
        let nominal = self.nominal_delay(kind, attempt, hint);
        if self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }

        let low = if kind == RetryKind::RateLimited && hint.is_some() {
            0.0
        } else {
            -self.jitter
        };
        let factor = 1.0 + rand::thread_rng().gen_range(low..=self.jitter);
        nominal.mul_f64(factor).min(self.max_delay)
    }
}

/// Final value of an `execute` call and how many times the operation ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    policy: BackoffPolicy,
    max_attempts: u32,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryController {
    pub fn new(policy: BackoffPolicy, max_attempts: u32) -> Self {
        Self {
            policy,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(BackoffPolicy::from_config(cfg), cfg.max_attempts)
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// `operation` receives the 1-based attempt number; `classify` decides
    /// whether its value ends the loop. After the last attempt the last value
    /// is returned whatever its verdict.
    pub async fn execute<T, F, Fut, C>(&self, operation: F, classify: C) -> Executed<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        C: Fn(&T) -> Verdict,
    {
        self.execute_limited(self.max_attempts, operation, classify)
            .await
    }

    /// Like [`execute`](Self::execute) with the attempt count further limited by `limit`.
    pub async fn execute_limited<T, F, Fut, C>(
        &self,
        limit: u32,
        mut operation: F,
        classify: C,
    ) -> Executed<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
        C: Fn(&T) -> Verdict,
    {
        let max_attempts = self.max_attempts.min(limit).max(1);
        let mut attempt = 1;

        loop {
            let value = operation(attempt).await;

            match classify(&value) {
                Verdict::Done | Verdict::Abort => {
                    return Executed {
                        value,
                        attempts: attempt,
                    }
                }
                Verdict::Retry { .. } if attempt >= max_attempts => {
                    return Executed {
                        value,
                        attempts: attempt,
                    }
                }
                Verdict::Retry { kind, hint } => {
                    let delay = self.policy.delay(kind, attempt, hint);
                    tracing::debug!(
                        attempt,
                        max_attempts,
                        ?kind,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy_without_jitter() -> BackoffPolicy {
        BackoffPolicy {
            jitter: 0.0,
            ..BackoffPolicy::default()
        }
    }

    #[test]
    fn transient_delays_grow_and_cap() {
        let policy = policy_without_jitter();
        let delays: Vec<Duration> = (1..=12)
            .map(|n| policy.nominal_delay(RetryKind::Transient, n, None))
            .collect();
        assert_eq!(delays[0], Duration::from_secs(3));
        assert_eq!(delays[1], Duration::from_secs(6));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), policy.max_delay);
    }

    #[test]
    fn rate_limited_grows_faster_than_transient() {
        let policy = policy_without_jitter();
        let delays: Vec<Duration> = (1..=8)
            .map(|n| policy.nominal_delay(RetryKind::RateLimited, n, None))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(
            policy.nominal_delay(RetryKind::RateLimited, 2, None)
                > policy.nominal_delay(RetryKind::Transient, 2, None)
        );
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn rate_limit_hint_is_honoured_and_capped() {
        let policy = policy_without_jitter();
        assert_eq!(
            policy.nominal_delay(RetryKind::RateLimited, 1, Some(Duration::from_secs(42))),
            Duration::from_secs(42)
        );
        assert_eq!(
            policy.nominal_delay(RetryKind::RateLimited, 1, Some(Duration::from_secs(3_600))),
            policy.max_delay
        );
    }

    #[test]
    fn blocked_carries_fixed_penalty() {
        let policy = policy_without_jitter();
        let first = policy.nominal_delay(RetryKind::Blocked, 1, None);
        assert_eq!(first, Duration::from_secs(123));
        let delays: Vec<Duration> = (1..=10)
            .map(|n| policy.nominal_delay(RetryKind::Blocked, n, None))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d >= policy.blocked_penalty.min(policy.max_delay)));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[test]
    fn jitter_stays_within_band_and_ceiling() {
        let policy = BackoffPolicy::default();
        for attempt in 1..=10 {
            let nominal = policy.nominal_delay(RetryKind::Transient, attempt, None);
            for _ in 0..50 {
                let d = policy.delay(RetryKind::Transient, attempt, None);
                assert!(d >= nominal.mul_f64(0.5));
                assert!(d <= nominal.mul_f64(1.5));
                assert!(d <= policy.max_delay);
            }
        }
    }

    #[test]
    fn jittered_hint_is_never_shorter() {
        let policy = BackoffPolicy::default();
        let hint = Duration::from_secs(20);
        for _ in 0..50 {
            let d = policy.delay(RetryKind::RateLimited, 1, Some(hint));
            assert!(d >= hint);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let controller = RetryController::new(BackoffPolicy::default(), 4);

        let counter = Arc::clone(&calls);
        let executed = controller
            .execute(
                move |_| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "still failing"
                    }
                },
                |_| Verdict::Retry {
                    kind: RetryKind::Transient,
                    hint: None,
                },
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(executed.attempts, 4);
        assert_eq!(executed.value, "still failing");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_on_first_attempt() {
        let controller = RetryController::new(BackoffPolicy::default(), 5);
        let executed = controller
            .execute(|attempt| async move { attempt }, |_| Verdict::Abort)
            .await;
        assert_eq!(executed.attempts, 1);
        assert_eq!(executed.value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_done() {
        let controller = RetryController::new(BackoffPolicy::default(), 5);
        let executed = controller
            .execute(
                |attempt| async move { attempt },
                |attempt| {
                    if *attempt == 3 {
                        Verdict::Done
                    } else {
                        Verdict::Retry {
                            kind: RetryKind::RateLimited,
                            hint: None,
                        }
                    }
                },
            )
            .await;
        assert_eq!(executed.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_lowers_max_attempts() {
        let controller = RetryController::new(BackoffPolicy::default(), 5);
        let executed = controller
            .execute_limited(
                2,
                |attempt| async move { attempt },
                |_| Verdict::Retry {
                    kind: RetryKind::Transient,
                    hint: None,
                },
            )
            .await;
        assert_eq!(executed.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_are_cancelled_by_timeout() {
        let controller = RetryController::new(BackoffPolicy::default(), 5);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            controller.execute(
                |_| async {},
                |_| Verdict::Retry {
                    kind: RetryKind::Blocked,
                    hint: None,
                },
            ),
        )
        .await;
        assert!(result.is_err());
    }
}
