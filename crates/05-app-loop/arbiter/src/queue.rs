use std::collections::{BTreeMap, VecDeque};

/// Renderer priority; lower numbers win.
pub type Priority = u32;

/// Priority queues (lowest number first) with FIFO order inside each priority.
#[derive(Debug)]
pub struct PendingQueue<T> {
    buckets: BTreeMap<Priority, VecDeque<T>>,
    len: usize,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            len: 0,
        }
    }
}

impl<T> PendingQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when no item is queued at any priority.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Enqueues `item` behind everything already queued at `priority`.
    pub fn enqueue(&mut self, priority: Priority, item: T) {
        self.buckets.entry(priority).or_default().push_back(item);
        self.len += 1;
    }

    /// Pops the oldest item of the best priority.
    pub fn pop_next(&mut self) -> Option<(Priority, T)> {
        let mut entry = self.buckets.first_entry()?;
        let priority = *entry.key();
        let item = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        if item.is_some() {
            self.len -= 1;
        }
        item.map(|item| (priority, item))
    }

    /// Keeps only the items for which `keep` returns true. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let before = self.len;
        self.buckets.retain(|_, bucket| {
            bucket.retain(|item| keep(item));
            !bucket.is_empty()
        });
        self.len = self.buckets.values().map(VecDeque::len).sum();
        before - self.len
    }

    /// Removes everything, in pop order.
    pub fn drain(&mut self) -> Vec<(Priority, T)> {
        let buckets = std::mem::take(&mut self.buckets);
        self.len = 0;
        buckets
            .into_iter()
            .flat_map(|(priority, bucket)| bucket.into_iter().map(move |item| (priority, item)))
            .collect()
    }

    /// Iterates in pop order without removing anything.
    pub fn iter(&self) -> impl Iterator<Item = (Priority, &T)> {
        self.buckets
            .iter()
            .flat_map(|(priority, bucket)| bucket.iter().map(move |item| (*priority, item)))
    }
}
