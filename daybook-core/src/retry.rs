//! Bounded retry with a fixed backoff between attempts.
//!
//! Waiting goes through [`Sleeper`] so callers (and tests) decide what a
//! delay actually does.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Every attempt failed; `error` is the last failure.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        RetryPolicy { attempts, backoff }
    }

    /// Run `op` until it succeeds or the attempts run out, sleeping
    /// `backoff` between consecutive failures (never after the last one).
    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut op: F,
    ) -> Result<T, Exhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(label, attempt, attempts, "attempting");
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= attempts => {
                    warn!(label, attempts, %error, "giving up after final attempt");
                    return Err(Exhausted { attempts, error });
                }
                Err(error) => {
                    warn!(label, attempt, attempts, %error, "attempt failed, retrying");
                    sleeper.sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
