//! Registry and priority store composed into the scheduling core both
//! engines share.
//!
//! Invariant: every id in the store is also in the registry. The only
//! exception is the dispatch window, between `pop_due` and `after_dispatch`,
//! when a due task is registered but not enqueued.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use tokio::time::Instant;

use crate::heap::PriorityStore;
use crate::registry::TaskRegistry;
use crate::tasks::{Callback, Task, TaskId};

pub struct Schedule {
    registry: TaskRegistry,
    queue: PriorityStore<Instant, TaskId>,
}

impl Schedule {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: TaskRegistry::new(),
            queue: PriorityStore::with_capacity(capacity),
        }
    }

    /// Pending-task gauge, see [`TaskRegistry::gauge`].
    pub fn gauge(&self) -> Arc<AtomicUsize> {
        self.registry.gauge()
    }

    pub fn insert(&mut self, task: Task) -> TaskId {
        let id = task.id;
        self.queue.push(task.due, id);
        self.registry.insert(task);
        id
    }

    /// Cancel a pending task. Returns false for unknown or already-fired ids.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if self.registry.remove(id).is_none() {
            return false;
        }
        // Absent from the store if the task is mid-dispatch.
        self.queue.remove(&id);
        true
    }

    /// Pop every task due at `now`, in due order.
    ///
    /// Stops at the first entry still in the future; the heap guarantees the
    /// rest are later.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TaskId, Callback)> {
        let mut due = Vec::new();
        while let Some((at, id)) = self.queue.peek() {
            if at > now {
                break;
            }
            self.queue.pop();
            if let Some(task) = self.registry.get(id) {
                due.push((id, task.callback.clone()));
            }
        }
        due
    }

    /// Settle a dispatched task: a once task leaves the registry, a recurring
    /// one is pushed back one interval past `now`. A task cancelled while it
    /// was in flight stays gone.
    pub fn after_dispatch(&mut self, id: TaskId, now: Instant) {
        let Some(task) = self.registry.get_mut(id) else {
            return;
        };
        if task.once {
            self.registry.remove(id);
        } else {
            task.reschedule(now);
            let due = task.due;
            self.queue.push(due, id);
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.registry.contains(id)
    }

    /// Registered tasks (pending, not yet fired).
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Entries currently in the priority store.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Discard everything, returning how many tasks were dropped.
    pub fn clear(&mut self) -> usize {
        self.queue.clear();
        self.registry.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::IdGenerator;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn add(schedule: &mut Schedule, ids: &IdGenerator, interval_ms: u64, once: bool, now: Instant) -> TaskId {
        schedule.insert(Task::new(
            ids.next_id(),
            Callback::blocking(|| {}),
            Duration::from_millis(interval_ms),
            once,
            now,
        ))
    }

    #[test]
    fn test_pop_due_in_order_and_stops_at_future() {
        let ids = IdGenerator::new();
        let mut schedule = Schedule::with_capacity(4);
        let now = Instant::now();
        let late = add(&mut schedule, &ids, 30, true, now);
        let early = add(&mut schedule, &ids, 10, true, now);
        let future = add(&mut schedule, &ids, 500, true, now);

        let due: Vec<TaskId> = schedule
            .pop_due(now + Duration::from_millis(40))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(due, vec![early, late]);
        assert_eq!(schedule.queued(), 1);
        // Popped tasks stay registered until settled.
        assert_eq!(schedule.len(), 3);
        assert!(schedule.contains(future));
    }

    #[test]
    fn test_once_task_leaves_registry() {
        let ids = IdGenerator::new();
        let mut schedule = Schedule::with_capacity(4);
        let gauge = schedule.gauge();
        let now = Instant::now();
        let id = add(&mut schedule, &ids, 0, true, now);

        assert_eq!(schedule.pop_due(now).len(), 1);
        schedule.after_dispatch(id, now);
        assert!(schedule.is_empty());
        assert_eq!(schedule.queued(), 0);
        assert_eq!(gauge.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_recurring_task_is_pushed_back() {
        let ids = IdGenerator::new();
        let mut schedule = Schedule::with_capacity(4);
        let now = Instant::now();
        let id = add(&mut schedule, &ids, 50, false, now);

        let fire_at = now + Duration::from_millis(60);
        assert_eq!(schedule.pop_due(fire_at).len(), 1);
        schedule.after_dispatch(id, fire_at);
        assert_eq!(schedule.queued(), 1);
        assert!(schedule.pop_due(fire_at + Duration::from_millis(49)).is_empty());
        assert_eq!(schedule.pop_due(fire_at + Duration::from_millis(50)).len(), 1);
    }

    #[test]
    fn test_cancel_during_dispatch_window() {
        let ids = IdGenerator::new();
        let mut schedule = Schedule::with_capacity(4);
        let now = Instant::now();
        let id = add(&mut schedule, &ids, 0, false, now);

        assert_eq!(schedule.pop_due(now).len(), 1);
        assert!(schedule.cancel(id));
        schedule.after_dispatch(id, now);
        assert_eq!(schedule.queued(), 0);
        assert!(schedule.is_empty());
        assert!(!schedule.cancel(id));
    }

    #[test]
    fn test_clear_reports_discarded() {
        let ids = IdGenerator::new();
        let mut schedule = Schedule::with_capacity(0);
        let now = Instant::now();
        for _ in 0..5 {
            add(&mut schedule, &ids, 10, false, now);
        }
        assert_eq!(schedule.clear(), 5);
        assert_eq!(schedule.queued(), 0);
    }
}
