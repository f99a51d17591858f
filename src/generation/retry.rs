//! Call-site retry with bounded exponential backoff.

use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-call timeout; an expired call counts as a transient failure
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_call_timeout_ms() -> Option<u64> {
    Some(120_000)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// Retries immediately; for tests and local backends.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_backoff_ms: 0,
            call_timeout_ms: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err("call_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        Duration::from_millis((raw as u64).min(self.max_backoff_ms))
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.call_timeout_ms {
                Some(ms) => tokio::time::timeout(Duration::from_millis(ms), op())
                    .await
                    .unwrap_or_else(|_| {
                        Err(GenerationError::Transient(format!(
                            "call timed out after {}ms",
                            ms
                        )))
                    }),
                None => op().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.backoff_for(attempt - 1);
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
