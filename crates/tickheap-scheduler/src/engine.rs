//! Serialized-owner engine: one loop owns the schedule and every mutation
//! reaches it as a command.
//!
//! Only the owner loop touches the registry and the priority store, so
//! neither needs a lock. The loop is spawned with the timer and lives until
//! the timer handle is dropped; `start` and `stop` only switch its ticker on
//! and off. That keeps `add` usable before `start` and after `stop`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tickheap_core::{Result, TickheapError, TimerConfig};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::dispatch::Dispatcher;
use crate::schedule::Schedule;
use crate::tasks::{Callback, IdGenerator, Task, TaskId};
use crate::timer::{Lifecycle, Timer, TimerState};

/// A request for the owner loop. Each carries a one-shot reply channel.
enum Command {
    Add { task: Task, reply: oneshot::Sender<()> },
    Remove { id: TaskId, reply: oneshot::Sender<bool> },
    Start { reply: oneshot::Sender<()> },
    /// Stop ticking and discard every task; replies with the discarded count.
    Close { reply: oneshot::Sender<usize> },
}

/// Timer whose state is owned by a single command-driven loop.
pub struct SerializedTimer {
    commands: mpsc::UnboundedSender<Command>,
    ids: IdGenerator,
    lifecycle: Lifecycle,
    // Serializes start/stop so their commands cannot interleave.
    transitions: Mutex<()>,
    dispatcher: Dispatcher,
    pending: Arc<AtomicUsize>,
    tick: Duration,
}

impl SerializedTimer {
    /// Spawn the owner loop. Must be called inside a tokio runtime.
    pub fn new(config: &TimerConfig) -> Result<Self> {
        config.validate()?;
        let (commands, receiver) = mpsc::unbounded_channel();
        let schedule = Schedule::with_capacity(config.heap_capacity);
        let pending = schedule.gauge();
        let dispatcher = Dispatcher::new();
        let owner = Owner {
            schedule,
            dispatcher: dispatcher.clone(),
            commands: receiver,
            tick: config.tick_interval(),
            ticker: None,
        };
        tokio::spawn(owner.run());

        Ok(Self {
            commands,
            ids: IdGenerator::new(),
            lifecycle: Lifecycle::default(),
            transitions: Mutex::new(()),
            dispatcher,
            pending,
            tick: config.tick_interval(),
        })
    }

    /// Send a command and wait for the owner loop to answer it.
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| TickheapError::EngineClosed)?;
        response.await.map_err(|_| TickheapError::EngineClosed)
    }
}

#[async_trait]
impl Timer for SerializedTimer {
    async fn add(&self, callback: Callback, interval: Duration, once: bool) -> Result<TaskId> {
        let task = Task::new(self.ids.next_id(), callback, interval, once, Instant::now());
        let id = task.id;
        self.request(|reply| Command::Add { task, reply }).await?;
        Ok(id)
    }

    async fn remove(&self, id: TaskId) -> Result<bool> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    async fn start(&self) -> Result<()> {
        let _guard = self.transitions.lock().await;
        if !self.lifecycle.begin() {
            return Ok(());
        }
        if let Err(e) = self.request(|reply| Command::Start { reply }).await {
            self.lifecycle.end();
            return Err(e);
        }
        tracing::info!("⏰ Timer started (serialized, tick every {:?})", self.tick);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _guard = self.transitions.lock().await;
        if !self.lifecycle.end() {
            return Ok(());
        }
        let discarded = self.request(|reply| Command::Close { reply }).await;
        self.dispatcher.wait_idle().await;
        let discarded = discarded?;
        tracing::info!(
            "🛑 Timer stopped (serialized): {} pending discarded, {} finished",
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

/// The single owner of the schedule.
struct Owner {
    schedule: Schedule,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    tick: Duration,
    ticker: Option<Interval>,
}

impl Owner {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => self.check_and_dispatch(),
            }
        }
        tracing::debug!("Owner loop exited with {} tasks pending", self.schedule.len());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Add { task, reply } => {
                let id = self.schedule.insert(task);
                tracing::debug!("📅 {id} added ({} pending)", self.schedule.len());
                let _ = reply.send(());
            }
            Command::Remove { id, reply } => {
                let removed = self.schedule.cancel(id);
                if removed {
                    tracing::debug!("🗑️ {id} removed");
                }
                let _ = reply.send(removed);
            }
            Command::Start { reply } => {
                if self.ticker.is_none() {
                    let mut ticker = tokio::time::interval(self.tick);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.ticker = Some(ticker);
                }
                let _ = reply.send(());
            }
            Command::Close { reply } => {
                self.ticker = None;
                let _ = reply.send(self.schedule.clear());
            }
        }
    }

    /// Pop everything due, then dispatch it. Dispatch re-pushes recurring
    /// tasks, so it must not interleave with the pop loop.
    fn check_and_dispatch(&mut self) {
        let due = self.schedule.pop_due(Instant::now());
        for (id, callback) in due {
            self.dispatcher.dispatch(id, callback);
            self.schedule.after_dispatch(id, Instant::now());
        }
    }
}

/// Next tick of the ticker, or never while it is switched off.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config(tick_ms: u64) -> TimerConfig {
        TimerConfig {
            tick_interval_ms: tick_ms,
            ..TimerConfig::default()
        }
    }

    fn counting(hits: &Arc<AtomicUsize>) -> Callback {
        let hits = hits.clone();
        Callback::future(move || {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_before_start_waits_for_start() {
        let timer = SerializedTimer::new(&config(10)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        timer.add(counting(&hits), Duration::from_millis(20), true).await.unwrap();
        assert_eq!(timer.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timer.task_count(), 0);
        timer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_reports_outcome() {
        let timer = SerializedTimer::new(&config(10)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = timer.add(counting(&hits), Duration::from_secs(5), false).await.unwrap();
        assert!(timer.remove(id).await.unwrap());
        assert!(!timer.remove(id).await.unwrap());
        assert!(!timer.remove(TaskId::new(999)).await.unwrap());
        assert_eq!(timer.task_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_pending_and_restart_works() {
        let timer = SerializedTimer::new(&config(10)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        timer.start().await.unwrap();
        timer.add(counting(&hits), Duration::from_secs(60), false).await.unwrap();
        timer.add(counting(&hits), Duration::from_secs(60), false).await.unwrap();
        assert_eq!(timer.task_count(), 2);

        timer.stop().await.unwrap();
        assert_eq!(timer.task_count(), 0);
        assert_eq!(timer.state(), TimerState::Stopped);

        timer.start().await.unwrap();
        let id = timer.add(counting(&hits), Duration::from_millis(30), true).await.unwrap();
        assert_eq!(id.get(), 3);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        timer.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_recurring_fires_every_tick() {
        let timer = SerializedTimer::new(&config(10)).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        timer.add(counting(&hits), Duration::ZERO, false).await.unwrap();
        timer.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(95)).await;
        timer.stop().await.unwrap();
        let fired = hits.load(Ordering::SeqCst);
        assert!((9..=11).contains(&fired), "fired {fired} times");
    }

    #[tokio::test]
    async fn test_zero_tick_rejected() {
        let err = SerializedTimer::new(&config(0)).err().unwrap();
        assert!(matches!(err, TickheapError::Config(_)), "{err}");
    }
}
