//! # tickheap scheduler
//!
//! Tick-driven software timer. Tasks wait in a min-heap keyed by due time;
//! a periodic tick pops whatever is due and launches each callback as its
//! own tokio task. Recurring tasks go back on the heap, once tasks are
//! dropped after their single run.
//!
//! ## Architecture
//! ```text
//! Timer (facade)
//!   ├── SerializedTimer: owner loop, all mutations via command channel
//!   │     └── Owner { Schedule, ticker } ← Add / Remove / Start / Close
//!   └── LockedTimer: Mutex<Schedule>, callers mutate directly
//!         └── tick loop ← CloseRequest
//!
//! Schedule
//!   ├── TaskRegistry: TaskId → Task (owns every task)
//!   └── PriorityStore: (due, TaskId) min-heap
//!
//! Dispatcher: spawn per due task, running/finished/failed counters,
//!             wait_idle for stop
//! ```

pub mod dispatch;
pub mod engine;
pub mod heap;
pub mod locked;
pub mod registry;
pub mod schedule;
pub mod tasks;
pub mod timer;

pub use dispatch::Dispatcher;
pub use engine::SerializedTimer;
pub use heap::PriorityStore;
pub use locked::LockedTimer;
pub use registry::TaskRegistry;
pub use schedule::Schedule;
pub use tasks::{Callback, IdGenerator, Task, TaskId, clamp_interval};
pub use timer::{Timer, TimerState, TimerStats, timer_from_config};
