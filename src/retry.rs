//! Retry with exponential backoff and jitter, shared by every step that
//! talks to the network or spawns an external process.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::MineError;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Errors that can tell a transient failure from a permanent one.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for MineError {
    fn is_transient(&self) -> bool {
        MineError::is_transient(self)
    }
}

impl Transient for git2::Error {
    fn is_transient(&self) -> bool {
        crate::error::git_error_is_transient(self)
    }
}

impl Transient for std::io::Error {
    fn is_transient(&self) -> bool {
        crate::error::io_error_is_transient(self)
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `step` names the operation in log output.
    pub fn run<T, E, F>(&self, step: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Transient + std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && err.is_transient() => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        step,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, retrying: {}",
                        err
                    );
                    std::thread::sleep(backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Jittered delay before retry number `attempt` (1-indexed)
    fn backoff_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((capped * jitter) as u64)
    }
}
