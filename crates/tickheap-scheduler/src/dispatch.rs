//! Dispatcher: launches each due callback as an independent tokio task.
//!
//! Dispatch is fire-and-forget: the tick loop never waits for a callback.
//! Counters are atomics so completion contexts and readers need no lock,
//! and `wait_idle` gives `stop` its join point.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::Notify;

use crate::tasks::{Callback, TaskId};

#[derive(Default)]
struct Counters {
    running: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl Counters {
    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
        if self.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Cloneable handle; clones share the same counters.
#[derive(Clone, Default)]
pub struct Dispatcher {
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `callback` without waiting for it.
    ///
    /// A panicking callback is caught and counted in both `failed_count` and
    /// `finish_count`.
    pub fn dispatch(&self, id: TaskId, callback: Callback) {
        // Counted before the spawn so `wait_idle` cannot miss this callback.
        self.counters.running.fetch_add(1, Ordering::AcqRel);
        let counters = Arc::clone(&self.counters);
        tracing::debug!("🚀 Dispatching {id}");
        tokio::spawn(async move {
            if let Err(reason) = run(callback).await {
                counters.failed.fetch_add(1, Ordering::AcqRel);
                tracing::warn!("⚠️ Callback for {id} failed: {reason}");
            }
            counters.finish();
        });
    }

    /// Resolve once no callback is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.running_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn running_count(&self) -> u64 {
        self.counters.running.load(Ordering::Acquire)
    }

    pub fn finish_count(&self) -> u64 {
        self.counters.finished.load(Ordering::Acquire)
    }

    pub fn failed_count(&self) -> u64 {
        self.counters.failed.load(Ordering::Acquire)
    }
}

async fn run(callback: Callback) -> Result<(), String> {
    match callback {
        Callback::Blocking(f) => tokio::task::spawn_blocking(move || f())
            .await
            .map_err(|e| e.to_string()),
        Callback::Future(f) => AssertUnwindSafe(async move { f().await })
            .catch_unwind()
            .await
            .map_err(|payload| panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
