//! Task definitions: the core data model for scheduled work.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Opaque task identifier handed back by `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Per-engine id source. Ids start at 1, increase monotonically and are never reused.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> TaskId {
        TaskId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// The unit of work a task runs. Zero arguments, no return value.
#[derive(Clone)]
pub enum Callback {
    /// Synchronous closure, run on tokio's blocking pool.
    Blocking(Arc<dyn Fn() + Send + Sync>),
    /// Closure producing a future, run as its own async task.
    Future(Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>),
}

impl Callback {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Callback::Blocking(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Callback::Future(Arc::new(move || -> BoxFuture<'static, ()> { Box::pin(f()) }))
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Blocking(_) => f.write_str("Callback::Blocking(..)"),
            Callback::Future(_) => f.write_str("Callback::Future(..)"),
        }
    }
}

/// A scheduled task.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub callback: Callback,
    /// Time between runs; also the delay before the first run.
    pub interval: Duration,
    /// Dispatch exactly once, then discard.
    pub once: bool,
    /// When the task next becomes eligible for dispatch.
    pub due: Instant,
}

impl Task {
    /// Create a task whose first run is one `interval` after `now`.
    pub fn new(id: TaskId, callback: Callback, interval: Duration, once: bool, now: Instant) -> Self {
        Self {
            id,
            callback,
            interval,
            once,
            due: due_after(now, interval),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.due <= now
    }

    /// Move the due time one interval past `now`.
    pub fn reschedule(&mut self, now: Instant) {
        self.due = due_after(now, self.interval);
    }
}

// Intervals too large to represent saturate at roughly thirty years out.
fn due_after(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval)
        .unwrap_or_else(|| now + Duration::from_secs(30 * 365 * 24 * 3600))
}

/// Convert a signed delta into an interval; negative deltas clamp to zero.
pub fn clamp_interval(delta: chrono::TimeDelta) -> Duration {
    delta.to_std().unwrap_or(Duration::ZERO)
}
