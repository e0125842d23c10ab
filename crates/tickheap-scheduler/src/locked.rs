//! Shared-lock engine: callers mutate the schedule directly under a mutex.
//!
//! `add` and `remove` never go through the tick loop. The loop takes the
//! lock only to pop due tasks and, after each dispatch, to settle that task;
//! callbacks are launched with the lock released. Shutdown still goes
//! through a close request so `stop` can wait for the loop to clear state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tickheap_core::{Result, TickheapError, TimerConfig};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatch::Dispatcher;
use crate::schedule::Schedule;
use crate::tasks::{Callback, IdGenerator, Task, TaskId};
use crate::timer::{Lifecycle, Timer, TimerState};

/// Asks the tick loop to clear the schedule and exit; answered with the
/// number of tasks discarded.
struct CloseRequest {
    reply: oneshot::Sender<usize>,
}

/// Timer whose schedule is guarded by a mutex.
pub struct LockedTimer {
    schedule: Arc<Mutex<Schedule>>,
    pending: Arc<AtomicUsize>,
    ids: IdGenerator,
    lifecycle: Lifecycle,
    dispatcher: Dispatcher,
    // Close channel of the running tick loop. Its lock also serializes start/stop.
    control: Mutex<Option<mpsc::Sender<CloseRequest>>>,
    tick: Duration,
}

impl LockedTimer {
    pub fn new(config: &TimerConfig) -> Result<Self> {
        config.validate()?;
        let schedule = Schedule::with_capacity(config.heap_capacity);
        let pending = schedule.gauge();
        Ok(Self {
            schedule: Arc::new(Mutex::new(schedule)),
            pending,
            ids: IdGenerator::new(),
            lifecycle: Lifecycle::default(),
            dispatcher: Dispatcher::new(),
            control: Mutex::new(None),
            tick: config.tick_interval(),
        })
    }
}

#[async_trait]
impl Timer for LockedTimer {
    async fn add(&self, callback: Callback, interval: Duration, once: bool) -> Result<TaskId> {
        let task = Task::new(self.ids.next_id(), callback, interval, once, Instant::now());
        let id = self.schedule.lock().await.insert(task);
        tracing::debug!("📅 {id} added");
        Ok(id)
    }

    async fn remove(&self, id: TaskId) -> Result<bool> {
        let removed = self.schedule.lock().await.cancel(id);
        if removed {
            tracing::debug!("🗑️ {id} removed");
        }
        Ok(removed)
    }

    async fn start(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if !self.lifecycle.begin() {
            return Ok(());
        }
        let (close, requests) = mpsc::channel(1);
        *control = Some(close);
        tokio::spawn(tick_loop(
            Arc::clone(&self.schedule),
            self.dispatcher.clone(),
            requests,
            self.tick,
        ));
        tracing::info!("⏰ Timer started (shared lock, tick every {:?})", self.tick);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if !self.lifecycle.end() {
            return Ok(());
        }
        let discarded = match control.take() {
            Some(close) => request_close(&close).await,
            None => Ok(self.schedule.lock().await.clear()),
        };
        self.dispatcher.wait_idle().await;
        let discarded = discarded?;
        tracing::info!(
            "🛑 Timer stopped (shared lock): {} pending discarded, {} finished",
            discarded,
            self.dispatcher.finish_count()
        );
        Ok(())
    }

    fn state(&self) -> TimerState {
        self.lifecycle.state()
    }

    fn running_count(&self) -> u64 {
        self.dispatcher.running_count()
    }

    fn finish_count(&self) -> u64 {
        self.dispatcher.finish_count()
    }

    fn failed_count(&self) -> u64 {
        self.dispatcher.failed_count()
    }

    fn task_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

async fn request_close(close: &mpsc::Sender<CloseRequest>) -> Result<usize> {
    let (reply, response) = oneshot::channel();
    close
        .send(CloseRequest { reply })
        .await
        .map_err(|_| TickheapError::EngineClosed)?;
    response.await.map_err(|_| TickheapError::EngineClosed)
}

async fn tick_loop(
    schedule: Arc<Mutex<Schedule>>,
    dispatcher: Dispatcher,
    mut requests: mpsc::Receiver<CloseRequest>,
    tick: Duration,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => check_and_dispatch(&schedule, &dispatcher).await,
            request = requests.recv() => {
                // A closed channel means the timer was dropped; clear anyway.
                let discarded = schedule.lock().await.clear();
                if let Some(request) = request {
                    let _ = request.reply.send(discarded);
                }
                break;
            }
        }
    }
    tracing::debug!("Tick loop exited");
}

async fn check_and_dispatch(schedule: &Mutex<Schedule>, dispatcher: &Dispatcher) {
    let due = schedule.lock().await.pop_due(Instant::now());
    for (id, callback) in due {
        dispatcher.dispatch(id, callback);
        schedule.lock().await.after_dispatch(id, Instant::now());
    }
}
