use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// Timer entry; `due` is measured in world uptime seconds.
#[derive(Clone, Copy, Debug)]
struct CronEntry<K> {
    key: K,
    due: u64,
}

// BinaryHeap is a max-heap, so the ordering is reversed to pop the earliest entry first.
impl<K: Ord> Ord for CronEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl<K: Ord> PartialOrd for CronEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> PartialEq for CronEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for CronEntry<K> {}

/// Keyed one-shot timers. Re-arming a key supersedes its earlier entry;
/// stale heap entries are skipped lazily.
#[derive(Debug)]
pub struct CronSystem<K> {
    heap: BinaryHeap<CronEntry<K>>,
    index: HashMap<K, u64>,
}

impl<K: Copy + Eq + Hash + Ord> Default for CronSystem<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash + Ord> CronSystem<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            index: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: K, delay: u64, now: u64) {
        let due = now.saturating_add(delay);
        self.index.insert(key, due);
        self.heap.push(CronEntry { key, due });
    }

    pub fn pop_ready(&mut self, now: u64) -> Option<K> {
        loop {
            let entry = *self.heap.peek()?;
            match self.index.get(&entry.key) {
                Some(&due) if due == entry.due => {
                    if entry.due > now {
                        return None;
                    }
                    self.heap.pop();
                    self.index.remove(&entry.key);
                    return Some(entry.key);
                }
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    pub fn drain_ready(&mut self, now: u64) -> Vec<K> {
        let mut ready = Vec::new();
        while let Some(key) = self.pop_ready(now) {
            ready.push(key);
        }
        ready
    }

    /// Cancels a timer and returns the seconds it still had to run.
    pub fn stop(&mut self, key: K, now: u64) -> Option<u64> {
        let due = self.index.remove(&key)?;
        Some(due.saturating_sub(now))
    }

    pub fn remaining(&self, key: K, now: u64) -> Option<u64> {
        self.index.get(&key).map(|due| due.saturating_sub(now))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_timer_pops_first() {
        let mut cron = CronSystem::new();
        cron.set(1u32, 10, 1000);
        cron.set(2u32, 5, 1000);
        assert_eq!(cron.len(), 2);
        assert_eq!(cron.pop_ready(1004), None);
        assert_eq!(cron.pop_ready(1005), Some(2));
        assert_eq!(cron.pop_ready(1009), None);
        assert_eq!(cron.pop_ready(1010), Some(1));
        assert!(cron.is_empty());
    }

    #[test]
    fn rearming_supersedes_old_entry() {
        let mut cron = CronSystem::new();
        cron.set(7u32, 5, 0);
        cron.set(7u32, 20, 0);
        assert_eq!(cron.pop_ready(10), None);
        assert_eq!(cron.remaining(7, 10), Some(10));
        assert_eq!(cron.pop_ready(20), Some(7));
        assert_eq!(cron.pop_ready(100), None);
    }

    #[test]
    fn stop_cancels_and_reports_remaining() {
        let mut cron = CronSystem::new();
        cron.set(3u32, 30, 100);
        assert_eq!(cron.stop(3, 110), Some(20));
        assert_eq!(cron.stop(3, 110), None);
        assert_eq!(cron.pop_ready(1000), None);
    }

    #[test]
    fn drain_returns_everything_due() {
        let mut cron = CronSystem::new();
        for key in 1u32..=3 {
            cron.set(key, 5, 0);
        }
        cron.set(4u32, 50, 0);
        let mut ready = cron.drain_ready(5);
        ready.sort();
        assert_eq!(ready, vec![1, 2, 3]);
        assert_eq!(cron.len(), 1);
    }
}
