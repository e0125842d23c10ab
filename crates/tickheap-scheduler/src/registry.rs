//! Task Registry: the arena that owns every pending task, keyed by id.
//!
//! The priority store only holds ids, so a due-time change made here is the
//! one both sides see. The registry also publishes its size through a shared
//! gauge so callers can read the pending count without taking the engine's
//! lock or sending it a command.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tasks::{Task, TaskId};

pub struct TaskRegistry {
    tasks: HashMap<TaskId, Task>,
    pending: Arc<AtomicUsize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A reader for the registry size that outlives borrows of the registry.
    pub fn gauge(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.pending)
    }

    pub fn insert(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
        self.publish();
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let removed = self.tasks.remove(&id);
        self.publish();
        removed
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop every task, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.tasks.len();
        self.tasks.clear();
        self.publish();
        discarded
    }

    fn publish(&self) {
        self.pending.store(self.tasks.len(), Ordering::Release);
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
