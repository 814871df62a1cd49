//! Attempt Limiting
//!
//! Counts failed attempts per key (an account email, a lookup id) inside a
//! sliding-from-first-failure window. The limiter only answers "may this key
//! try again"; callers decide what a failure is.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;

/// Failure threshold and window
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    /// `None` disables blocking; failures are still counted.
    pub max_failures: Option<u32>,
    pub window: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_failures: None,
            window: Duration::from_secs(15 * 60),
        }
    }
}

impl AttemptPolicy {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures: Some(max_failures),
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("Too many failed attempts; retry in {retry_after:?}")]
    Exhausted { retry_after: Duration },

    #[error("Attempt store unavailable: {0}")]
    Backend(String),
}

/// Storage-agnostic attempt counter
#[trait_variant::make(AttemptLimiter: Send)]
pub trait LocalAttemptLimiter {
    /// Fails with [`AttemptError::Exhausted`] while `key` is blocked.
    async fn check(&self, key: &str) -> Result<(), AttemptError>;

    /// Count one failure; returns the failure count inside the window.
    async fn record_failure(&self, key: &str) -> Result<u32, AttemptError>;

    /// Forget all failures for `key` (after a success)
    async fn reset(&self, key: &str) -> Result<(), AttemptError>;
}

#[derive(Debug, Clone, Copy)]
struct FailureWindow {
    failures: u32,
    started: Instant,
}

/// Process-local limiter backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryAttemptLimiter {
    policy: AttemptPolicy,
    entries: DashMap<String, FailureWindow>,
}

impl MemoryAttemptLimiter {
    pub fn new(policy: AttemptPolicy) -> Self {
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Drop windows that have run out. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.saturating_duration_since(w.started) < self.policy.window);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), AttemptError> {
        let Some(max) = self.policy.max_failures else {
            return Ok(());
        };
        let Some(window) = self.entries.get(key).map(|e| *e) else {
            return Ok(());
        };
        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= self.policy.window {
            self.entries
                .remove_if(key, |_, w| w.started == window.started);
            return Ok(());
        }
        if window.failures >= max {
            return Err(AttemptError::Exhausted {
                retry_after: self.policy.window - elapsed,
            });
        }
        Ok(())
    }

    fn record_failure_at(&self, key: &str, now: Instant) -> u32 {
        let mut entry = self.entries.entry(key.to_string()).or_insert(FailureWindow {
            failures: 0,
            started: now,
        });
        if now.saturating_duration_since(entry.started) >= self.policy.window {
            *entry = FailureWindow {
                failures: 0,
                started: now,
            };
        }
        entry.failures += 1;
        entry.failures
    }
}

impl AttemptLimiter for MemoryAttemptLimiter {
    async fn check(&self, key: &str) -> Result<(), AttemptError> {
        self.check_at(key, Instant::now())
    }

    async fn record_failure(&self, key: &str) -> Result<u32, AttemptError> {
        Ok(self.record_failure_at(key, Instant::now()))
    }

    async fn reset(&self, key: &str) -> Result<(), AttemptError> {
        self.entries.remove(key);
        Ok(())
    }
}
