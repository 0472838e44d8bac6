// Retry with exponential backoff
//
// Used for the flight lookup only. The sale and bonus calls have their own
// failure policies and never go through here.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    // 0.0 keeps the delays exact
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

}

// backoff(i) = initial * multiplier^i, capped, with optional jitter
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let base_backoff_ms = (config.initial_backoff_ms as f64
        * config.backoff_multiplier.powf(retry_attempt as f64))
    .min(config.max_backoff_ms as f64);

    if config.jitter_factor <= 0.0 {
        return Duration::from_millis(base_backoff_ms as u64);
    }

    let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
    let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

    Duration::from_millis(backoff_ms as u64)
}

// Seam for the backoff sleeps so tests can run without waiting
#[async_trait]
pub trait Sleeper: Send + Sync + 'static {
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

// Records requested delays and returns immediately
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

// Runs `op` until it succeeds or `max_attempts` is reached. `op` gets the
// zero-based attempt number. Every failed attempt is followed by its backoff,
// the last one included, before the last error is returned as is.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let backoff = calculate_backoff(attempt, config);
                tracing::warn!(
                    attempt = attempt + 1,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "attempt failed"
                );
                sleeper.sleep(backoff).await;

                attempt += 1;
                if attempt >= attempts {
                    tracing::warn!(attempts, error = %err, "giving up after last attempt");
                    return Err(err);
                }
            }
        }
    }
}
