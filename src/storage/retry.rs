use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How often, and how patiently, a failing operation is re-attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Delay doubles after every failure, starting at `initial_delay` and
    /// never exceeding `max_delay`. `None` means retry forever.
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        max_attempts: Option<u32>,
    },
    /// Same delay between every attempt, at most `max_attempts` attempts in total.
    Fixed { delay: Duration, max_attempts: u32 },
}

impl RetryPolicy {
    /// Download policy: 2s, 4s, 8s, then 10s forever.
    pub fn download() -> Self {
        RetryPolicy::Exponential {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            max_attempts: None,
        }
    }

    /// Decompression policy: three attempts, 2s apart.
    pub fn decompress() -> Self {
        RetryPolicy::Fixed {
            delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
            RetryPolicy::Fixed { max_attempts, .. } => Some(*max_attempts),
        }
    }

    /// Whether the 1-based `attempt` may still be made.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts().is_none_or(|max| attempt <= max)
    }

    /// Delay slept after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        match self {
            RetryPolicy::Exponential {
                initial_delay,
                max_delay,
                ..
            } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                initial_delay.saturating_mul(factor).min(*max_delay)
            }
            RetryPolicy::Fixed { delay, .. } => *delay,
        }
    }
}

/// Runs `op` until it succeeds, `should_retry` rejects the error, or the
/// policy runs out of attempts. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    what: &str,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !should_retry(&err) || !policy.allows_attempt(attempt + 1) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delays_double_until_cap() {
        let policy = RetryPolicy::download();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 10, 10, 10]);
        assert_eq!(policy.delay_after(500), Duration::from_secs(10));
        assert!(policy.allows_attempt(u32::MAX));
    }

    #[test]
    fn fixed_policy_bounds_attempts() {
        let policy = RetryPolicy::decompress();
        assert!(policy.allows_attempt(3));
        assert!(!policy.allows_attempt(4));
        assert_eq!(policy.delay_after(1), policy.delay_after(2));
    }
}
