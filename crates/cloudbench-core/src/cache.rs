//! Bounded per-layer cache of full-resolution stage outputs.
//!
//! An entry at index `i` holds the buffers produced by running the layer's
//! pipeline through stage `i`. Entries are only valid as long as stages
//! `0..=i` are untouched, so structural edits invalidate from the edited
//! index upward while earlier prefixes survive.

use crate::models::PointBuffers;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct StageCache {
    capacity: usize,
    entries: VecDeque<(usize, Arc<PointBuffers>)>,
}

impl StageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store the output of stage `index`, evicting the oldest entry once
    /// the cache is full. Re-inserting an index replaces its entry in place.
    pub fn insert(&mut self, index: usize, data: Arc<PointBuffers>) {
        if self.capacity == 0 {
            return;
        }
        if let Some(slot) = self.entries.iter_mut().find(|(i, _)| *i == index) {
            slot.1 = data;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((index, data));
    }

    pub fn get(&self, index: usize) -> Option<Arc<PointBuffers>> {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, data)| Arc::clone(data))
    }

    /// The entry with the highest stage index, if any
    pub fn latest(&self) -> Option<(usize, Arc<PointBuffers>)> {
        self.entries
            .iter()
            .max_by_key(|(i, _)| *i)
            .map(|(i, data)| (*i, Arc::clone(data)))
    }

    /// Drop every entry at `index` or above. Called when the stage at
    /// `index` is removed, toggled, or replaced.
    pub fn invalidate_from(&mut self, index: usize) {
        self.entries.retain(|(i, _)| *i < index);
    }

    /// Shift entries above `index` down by one after a stage removal so
    /// they keep pointing at the same stages.
    pub fn reindex_after_removal(&mut self, index: usize) {
        for (i, _) in &mut self.entries {
            if *i > index {
                *i -= 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers(n: usize) -> Arc<PointBuffers> {
        Arc::new(PointBuffers::from_xyz(
            vec![0.0; n],
            vec![0.0; n],
            vec![0.0; n],
        ))
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = StageCache::new(2);
        cache.insert(0, buffers(10));
        cache.insert(1, buffers(5));

        assert_eq!(cache.get(0).unwrap().len(), 10);
        assert_eq!(cache.get(1).unwrap().len(), 5);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache = StageCache::new(2);
        cache.insert(0, buffers(10));
        cache.insert(1, buffers(5));
        cache.insert(2, buffers(3));

        assert!(cache.get(0).is_none());
        assert_eq!(cache.get(1).unwrap().len(), 5);
        assert_eq!(cache.get(2).unwrap().len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_replaces_without_eviction() {
        let mut cache = StageCache::new(2);
        cache.insert(0, buffers(10));
        cache.insert(1, buffers(5));
        cache.insert(1, buffers(7));

        assert_eq!(cache.get(0).unwrap().len(), 10);
        assert_eq!(cache.get(1).unwrap().len(), 7);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_latest() {
        let mut cache = StageCache::new(3);
        assert!(cache.latest().is_none());
        cache.insert(0, buffers(10));
        cache.insert(2, buffers(4));
        cache.insert(1, buffers(6));

        let (index, data) = cache.latest().unwrap();
        assert_eq!(index, 2);
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_invalidate_from_keeps_prefix() {
        let mut cache = StageCache::new(3);
        cache.insert(0, buffers(10));
        cache.insert(1, buffers(5));
        cache.insert(2, buffers(3));

        cache.invalidate_from(1);
        assert_eq!(cache.get(0).unwrap().len(), 10);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_reindex_after_removal() {
        let mut cache = StageCache::new(3);
        cache.insert(0, buffers(10));
        cache.insert(2, buffers(3));

        // stage 1 removed: entry 0 stays put, entry 2 becomes entry 1
        cache.reindex_after_removal(1);
        assert_eq!(cache.get(0).unwrap().len(), 10);
        assert_eq!(cache.get(1).unwrap().len(), 3);
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = StageCache::new(0);
        cache.insert(0, buffers(10));
        assert!(cache.is_empty());
        assert!(cache.get(0).is_none());
    }
}
