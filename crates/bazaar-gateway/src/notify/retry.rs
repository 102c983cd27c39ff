//! Bounded exponential-backoff retry for notification delivery.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            multiplier: 2.0,
        }
    }
}

fn next_delay_ms(current: u64, config: &RetryConfig) -> u64 {
    ((current as f64) * config.multiplier).min(config.max_delay_ms as f64) as u64
}

pub async fn with_retry<F, Fut, T, E>(mut operation: F, config: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0usize;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    attempt,
                    delay_ms,
                    error = %e,
                    "notification attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = next_delay_ms(delay_ms, config);
            }
            Err(e) => {
                debug!(attempts = attempt, error = %e, "notification failed after all retries");
                return Err(e);
            }
        }
    }
}
