//! Public facade: one contract for both concurrency strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tickheap_core::{Result, Strategy, TimerConfig};

use crate::engine::SerializedTimer;
use crate::locked::LockedTimer;
use crate::tasks::{Callback, TaskId};

/// The operations a caller programs against, whichever engine sits behind them.
///
/// `add` and `remove` are accepted in every lifecycle state. Tasks added
/// while stopped wait for `start`; `stop` discards all pending tasks and
/// returns only after every launched callback has finished.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Schedule `callback` to run `interval` from now, then every `interval`
    /// unless `once`. Returns after the task is registered.
    ///
    /// The first run waits a full `interval`; it is not dispatched on the
    /// next tick. A recurring task with a one-hour interval first fires an
    /// hour after `add`.
    async fn add(&self, callback: Callback, interval: Duration, once: bool) -> Result<TaskId>;

    /// Cancel a pending task. `Ok(false)` for unknown or already-fired ids.
    async fn remove(&self, id: TaskId) -> Result<bool>;

    /// Begin ticking. No-op while running.
    async fn start(&self) -> Result<()>;

    /// Stop ticking, discard pending tasks, wait for in-flight callbacks.
    /// No-op while stopped.
    async fn stop(&self) -> Result<()>;

    fn state(&self) -> TimerState;

    /// Callbacks currently executing.
    fn running_count(&self) -> u64;

    /// Callbacks that have completed, including ones that panicked.
    fn finish_count(&self) -> u64;

    /// Callbacks that panicked.
    fn failed_count(&self) -> u64;

    /// Registered tasks not yet fired (recurring tasks stay counted).
    fn task_count(&self) -> usize;

    fn stats(&self) -> TimerStats {
        TimerStats {
            state: self.state(),
            pending: self.task_count(),
            running: self.running_count(),
            finished: self.finish_count(),
            failed: self.failed_count(),
            captured_at: Utc::now(),
        }
    }
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Stopped,
    Running,
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerState::Stopped => write!(f, "stopped"),
            TimerState::Running => write!(f, "running"),
        }
    }
}

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;

/// Atomic Stopped/Running flag; each transition succeeds for exactly one caller.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    status: AtomicU8,
}

impl Lifecycle {
    /// Stopped → Running. False if already running.
    pub(crate) fn begin(&self) -> bool {
        self.status
            .compare_exchange(STOPPED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running → Stopped. False if already stopped.
    pub(crate) fn end(&self) -> bool {
        self.status
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn state(&self) -> TimerState {
        match self.status.load(Ordering::Acquire) {
            RUNNING => TimerState::Running,
            _ => TimerState::Stopped,
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Serialize)]
pub struct TimerStats {
    pub state: TimerState,
    pub pending: usize,
    pub running: u64,
    pub finished: u64,
    pub failed: u64,
    pub captured_at: DateTime<Utc>,
}

/// Build the engine `config.strategy` names. Must be called inside a tokio runtime.
pub fn timer_from_config(config: &TimerConfig) -> Result<Arc<dyn Timer>> {
    Ok(match config.strategy {
        Strategy::Serialized => Arc::new(SerializedTimer::new(config)?),
        Strategy::SharedLock => Arc::new(LockedTimer::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), TimerState::Stopped);
        assert!(!lifecycle.end());
        assert!(lifecycle.begin());
        assert!(!lifecycle.begin());
        assert_eq!(lifecycle.state(), TimerState::Running);
        assert!(lifecycle.end());
        assert!(!lifecycle.end());
        assert_eq!(lifecycle.state(), TimerState::Stopped);
    }

    #[tokio::test]
    async fn test_factory_picks_strategy() {
        for strategy in [Strategy::Serialized, Strategy::SharedLock] {
            let config = TimerConfig {
                strategy,
                ..TimerConfig::default()
            };
            let timer = timer_from_config(&config).unwrap();
            let stats = timer.stats();
            assert_eq!(stats.state, TimerState::Stopped);
            assert_eq!(stats.pending, 0);
            assert_eq!(stats.finished, 0);
        }
    }
}
