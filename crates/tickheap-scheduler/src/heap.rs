//! Priority Store: a binary min-heap of handles keyed by due time.
//!
//! The store keeps the key next to each handle, so the key is read once on
//! `push` and never again. Callers that change a task's due time must
//! `remove` and `push` it again. No synchronization is done here; the
//! engines own that.

/// Min-ordered priority queue over copyable handles.
#[derive(Debug, Clone)]
pub struct PriorityStore<K, H> {
    entries: Vec<(K, H)>,
}

impl<K: Ord + Copy, H: PartialEq + Copy> PriorityStore<K, H> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a handle under `key`. O(log n).
    pub fn push(&mut self, key: K, handle: H) {
        self.entries.push((key, handle));
        self.sift_up(self.entries.len() - 1);
    }

    /// The minimum-key entry, without removing it.
    pub fn peek(&self) -> Option<(K, H)> {
        self.entries.first().copied()
    }

    /// Remove and return the minimum-key entry. O(log n).
    pub fn pop(&mut self) -> Option<(K, H)> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Remove a specific handle, wherever it sits. O(n) scan.
    /// Returns false if the handle is not enqueued.
    pub fn remove(&mut self, handle: &H) -> bool {
        match self.entries.iter().position(|(_, h)| h == handle) {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: &H) -> bool {
        self.entries.iter().any(|(_, h)| h == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot of every entry in key order.
    pub fn to_vec(&self) -> Vec<(K, H)> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    fn remove_at(&mut self, index: usize) -> (K, H) {
        let removed = self.entries.swap_remove(index);
        if index < self.entries.len() {
            self.sift_down(index);
            self.sift_up(index);
        }
        removed
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.entries[index].0 < self.entries[parent].0 {
                self.entries.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len && self.entries[right].0 < self.entries[left].0 {
                right
            } else {
                left
            };
            if self.entries[smallest].0 < self.entries[index].0 {
                self.entries.swap(index, smallest);
                index = smallest;
            } else {
                break;
            }
        }
    }
}

impl<K: Ord + Copy, H: PartialEq + Copy> Default for PriorityStore<K, H> {
    fn default() -> Self {
        Self::new()
    }
}
