//! Exponential backoff with jitter for calls that can fail transiently.
//!
//! The retrier holds no state between calls. Each backend decides which of
//! its errors are worth another attempt and hands that predicate in.

use rand::Rng;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps.
    #[cfg(test)]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn jittered_delay(&self, attempt: u32, jitter: f64) -> Duration {
        self.capped_delay(attempt)
            .mul_f64(jitter.clamp(JITTER_MIN, JITTER_MAX))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// `max_retries` retries have been spent. The last error is returned.
    pub fn run<T, E, F, P>(&self, is_retryable: P, op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut rng = rand::thread_rng();
        self.run_with(
            is_retryable,
            op,
            |attempt, err, delay| {
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying: {err}"
                );
            },
            || rng.gen_range(JITTER_MIN..JITTER_MAX),
            thread::sleep,
        )
    }

    pub fn run_with<T, E, F, P, N, J, S>(
        &self,
        is_retryable: P,
        mut op: F,
        mut on_retry: N,
        mut jitter: J,
        mut sleep: S,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        N: FnMut(u32, &E, Duration),
        J: FnMut() -> f64,
        S: FnMut(Duration),
    {
        let mut attempt = 0u32;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !is_retryable(&err) || attempt >= self.max_retries {
                return Err(err);
            }

            let delay = self.jittered_delay(attempt, jitter());
            on_retry(attempt + 1, &err, delay);
            if !delay.is_zero() {
                sleep(delay);
            }
            attempt += 1;
        }
    }
}
