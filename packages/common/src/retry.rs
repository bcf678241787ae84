use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::DlqConfig;

/// A single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Backoff schedule and attempt budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u8,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u8) -> Duration {
        calculate_backoff(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DlqConfig::default())
    }
}

impl From<&DlqConfig> for RetryPolicy {
    fn from(config: &DlqConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry {
        attempt: u8,
        history: Vec<RetryAttempt>,
    },
    Exhausted {
        history: Vec<RetryAttempt>,
    },
}

#[derive(Debug, Clone)]
struct RetryState {
    history: Vec<RetryAttempt>,
    last_updated: Instant,
}

/// Failure history per message id.
///
/// Survives a redelivery of the same message within the process, so a
/// message that keeps failing across broker redeliveries still runs out of
/// attempts.
#[derive(Debug)]
pub struct RetryTracker {
    state: HashMap<String, RetryState>,
    max_attempts: u8,
}

impl RetryTracker {
    pub fn new(max_attempts: u8) -> Self {
        Self {
            state: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn record_failure(&mut self, id: &str, error: &str) -> RetryDecision {
        let entry = self.state.entry(id.to_string()).or_insert_with(|| RetryState {
            history: Vec::new(),
            last_updated: Instant::now(),
        });

        let attempt = entry.history.len() as u8 + 1;
        entry.history.push(RetryAttempt::new(attempt, error));
        entry.last_updated = Instant::now();

        if attempt < self.max_attempts {
            RetryDecision::Retry {
                attempt,
                history: entry.history.clone(),
            }
        } else {
            let history = self
                .state
                .remove(id)
                .map(|s| s.history)
                .unwrap_or_default();
            RetryDecision::Exhausted { history }
        }
    }

    pub fn clear(&mut self, id: &str) {
        self.state.remove(id);
    }

    /// Number of failures recorded so far for `id`.
    pub fn failures(&self, id: &str) -> u8 {
        self.state.get(id).map(|s| s.history.len() as u8).unwrap_or(0)
    }

    /// Remove entries that haven't been updated within `max_age`.
    pub fn cleanup_stale(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.state
            .retain(|_, state| now.duration_since(state.last_updated) < max_age);
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

/// Exponential backoff with jitter.
///
/// `min(base_ms * 2^(attempt-1) + jitter, max_ms)`, jitter in 0-25%.
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

/// Clears a message's retry state when dropped, unless defused.
///
/// Covers the paths where processing unwinds without reaching an explicit
/// clear, such as a panic inside a spawned task.
pub struct RetryCleanupGuard {
    tracker: Arc<Mutex<RetryTracker>>,
    message_id: String,
    defused: bool,
}

impl RetryCleanupGuard {
    pub fn new(tracker: Arc<Mutex<RetryTracker>>, message_id: impl Into<String>) -> Self {
        Self {
            tracker,
            message_id: message_id.into(),
            defused: false,
        }
    }

    pub fn defuse(&mut self) {
        self.defused = true;
    }
}

impl Drop for RetryCleanupGuard {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        if let Ok(mut tracker) = self.tracker.try_lock() {
            tracker.clear(&self.message_id);
        }
    }
}

/// Periodically drop retry entries for messages that stopped coming back.
pub fn spawn_cleanup_task(
    tracker: Arc<Mutex<RetryTracker>>,
    cleanup_interval: Duration,
    max_age: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);

        loop {
            interval.tick().await;
            let removed = {
                let mut guard = tracker.lock().await;
                let before = guard.len();
                guard.cleanup_stale(max_age);
                before - guard.len()
            };
            if removed > 0 {
                info!(removed, "Cleaned up stale retry tracker entries");
            }
        }
    })
}
