//! Per-partition top-K collection.
//!
//! Matches are gathered into an [`EntityScoreQueue`], a binary heap over
//! (entity id, score) pairs. Without a limit the heap runs in max mode and
//! its pop order is the result order. With a bounded skip/limit the heap
//! runs in min mode: once it holds `skip + limit` entries the lowest-scoring
//! one is evicted on every better insertion, so after collection it holds
//! exactly the global top `skip + limit` for that partition, which are then
//! reversed into descending order. Ties resolve arbitrarily by heap
//! structure.

use ahash::AHashSet;

use crate::data::EntityId;

/// One ranked match. Within any stream produced by this crate, scores are
/// monotonically non-increasing in iteration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    pub entity_id: EntityId,
    pub score: f32,
}

impl ScoreEntry {
    pub fn new(entity_id: EntityId, score: f32) -> Self {
        ScoreEntry { entity_id, score }
    }
}

/// Requested heap sizes at or above this are not materialized; collection
/// falls back to the unbounded max-heap path instead.
const MAX_BOUNDED_TARGET: usize = u32::MAX as usize;

/// Array-backed, 1-indexed binary heap of (entity id, score) pairs.
///
/// Grows by doubling. In max mode the top is the highest score, in min mode
/// the lowest.
#[derive(Debug)]
pub struct EntityScoreQueue {
    max_mode: bool,
    ids: Vec<EntityId>,
    scores: Vec<f32>,
    size: usize,
}

const INITIAL_CAPACITY: usize = 32;

impl EntityScoreQueue {
    /// A queue whose top is the highest score.
    pub fn max() -> Self {
        EntityScoreQueue::with_mode(true)
    }

    /// A queue whose top is the lowest score.
    pub fn min() -> Self {
        EntityScoreQueue::with_mode(false)
    }

    fn with_mode(max_mode: bool) -> Self {
        // Slot 0 is unused; the root lives at index 1.
        EntityScoreQueue {
            max_mode,
            ids: vec![0; INITIAL_CAPACITY + 1],
            scores: vec![0.0; INITIAL_CAPACITY + 1],
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The current top entry, without removing it.
    pub fn peek(&self) -> Option<ScoreEntry> {
        if self.size == 0 {
            None
        } else {
            Some(ScoreEntry::new(self.ids[1], self.scores[1]))
        }
    }

    /// Insert an entry, growing the backing arrays when full.
    pub fn insert(&mut self, entity_id: EntityId, score: f32) {
        if self.size + 1 == self.ids.len() {
            let doubled = self.ids.len() * 2;
            self.ids.resize(doubled, 0);
            self.scores.resize(doubled, 0.0);
        }
        self.size += 1;
        self.ids[self.size] = entity_id;
        self.scores[self.size] = score;
        self.lift(self.size);
    }

    /// Remove and return the top entry.
    pub fn pop(&mut self) -> Option<ScoreEntry> {
        if self.size == 0 {
            return None;
        }
        let top = ScoreEntry::new(self.ids[1], self.scores[1]);
        self.ids[1] = self.ids[self.size];
        self.scores[1] = self.scores[self.size];
        self.size -= 1;
        if self.size > 1 {
            self.sink(1);
        }
        Some(top)
    }

    /// Replace the top entry and restore heap order. Used by the bounded
    /// collector to evict the lowest score without shrinking the arrays.
    pub fn replace_top(&mut self, entity_id: EntityId, score: f32) {
        debug_assert!(self.size > 0);
        self.ids[1] = entity_id;
        self.scores[1] = score;
        self.sink(1);
    }

    /// True when `a` belongs closer to the root than `b`.
    fn outranks(&self, a: f32, b: f32) -> bool {
        if self.max_mode { a > b } else { a < b }
    }

    fn lift(&mut self, mut index: usize) {
        while index > 1 {
            let parent = index >> 1;
            if self.outranks(self.scores[index], self.scores[parent]) {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sink(&mut self, mut index: usize) {
        loop {
            let left = index << 1;
            let right = left + 1;
            let mut best = index;
            if left <= self.size && self.outranks(self.scores[left], self.scores[best]) {
                best = left;
            }
            if right <= self.size && self.outranks(self.scores[right], self.scores[best]) {
                best = right;
            }
            if best == index {
                break;
            }
            self.swap(index, best);
            index = best;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.ids.swap(a, b);
        self.scores.swap(a, b);
    }
}

/// Collects one partition's matches, honoring an exclusion filter and a
/// skip/limit constraint.
#[derive(Debug)]
pub struct TopEntityCollector<'a> {
    queue: EntityScoreQueue,
    /// `skip + limit` when bounded; `None` on the unbounded fallback path.
    target: Option<usize>,
    excluded: Option<&'a AHashSet<EntityId>>,
}

impl<'a> TopEntityCollector<'a> {
    /// A collector for the given skip/limit constraint.
    ///
    /// When `skip + limit` is too large to materialize as a bounded heap
    /// the collector silently takes the unbounded path, and the caller
    /// applies skip/limit on the merged stream (which it does anyway).
    pub fn new(skip: usize, limit: usize) -> Self {
        let target = skip.saturating_add(limit);
        if target == 0 {
            // Nothing requested; a bounded heap of size zero collects nothing.
            return TopEntityCollector {
                queue: EntityScoreQueue::min(),
                target: Some(0),
                excluded: None,
            };
        }
        if target >= MAX_BOUNDED_TARGET {
            TopEntityCollector {
                queue: EntityScoreQueue::max(),
                target: None,
                excluded: None,
            }
        } else {
            TopEntityCollector {
                queue: EntityScoreQueue::min(),
                target: Some(target),
                excluded: None,
            }
        }
    }

    /// A collector that keeps every match, highest score first.
    pub fn unbounded() -> Self {
        TopEntityCollector {
            queue: EntityScoreQueue::max(),
            target: None,
            excluded: None,
        }
    }

    /// Drop these entity ids before insertion. Used by the transaction
    /// overlay so entities it re-indexed never surface from the base index.
    pub fn with_exclusions(mut self, excluded: &'a AHashSet<EntityId>) -> Self {
        self.excluded = Some(excluded);
        self
    }

    /// Offer one match to the collector.
    pub fn collect(&mut self, entity_id: EntityId, score: f32) {
        if let Some(excluded) = self.excluded
            && excluded.contains(&entity_id)
        {
            return;
        }
        match self.target {
            None => self.queue.insert(entity_id, score),
            Some(0) => {}
            Some(target) => {
                if self.queue.len() < target {
                    self.queue.insert(entity_id, score);
                } else if let Some(lowest) = self.queue.peek()
                    && score > lowest.score
                {
                    self.queue.replace_top(entity_id, score);
                }
            }
        }
    }

    /// Finish collection and return the entries in descending score order.
    pub fn into_entries(mut self) -> Vec<ScoreEntry> {
        let mut entries = Vec::with_capacity(self.queue.len());
        while let Some(entry) = self.queue.pop() {
            entries.push(entry);
        }
        if self.target.is_some() {
            // Min-mode pops lowest first.
            entries.reverse();
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores_of(entries: &[ScoreEntry]) -> Vec<f32> {
        entries.iter().map(|e| e.score).collect()
    }

    #[test]
    fn test_max_queue_pops_in_descending_order() {
        let mut queue = EntityScoreQueue::max();
        for (id, score) in [(1, 0.5), (2, 2.0), (3, 1.5), (4, 0.1)] {
            queue.insert(id, score);
        }
        let mut popped = Vec::new();
        while let Some(entry) = queue.pop() {
            popped.push(entry.score);
        }
        assert_eq!(popped, vec![2.0, 1.5, 0.5, 0.1]);
    }

    #[test]
    fn test_queue_grows_past_initial_capacity() {
        let mut queue = EntityScoreQueue::max();
        for i in 0..500u64 {
            queue.insert(i, i as f32);
        }
        assert_eq!(queue.len(), 500);
        assert_eq!(queue.pop().unwrap().score, 499.0);
    }

    #[test]
    fn test_bounded_collector_keeps_top_skip_plus_limit() {
        let mut collector = TopEntityCollector::new(2, 3);
        for (id, score) in [(1, 0.1), (2, 0.9), (3, 0.5), (4, 0.8), (5, 0.3), (6, 0.7), (7, 0.2)] {
            collector.collect(id, score);
        }
        let entries = collector.into_entries();
        // Top 5 of the 7 offered, descending.
        assert_eq!(scores_of(&entries), vec![0.9, 0.8, 0.7, 0.5, 0.3]);
    }

    #[test]
    fn test_zero_limit_collects_nothing() {
        let mut collector = TopEntityCollector::new(0, 0);
        collector.collect(1, 1.0);
        assert!(collector.into_entries().is_empty());
    }

    #[test]
    fn test_huge_limit_falls_back_to_unbounded() {
        let mut collector = TopEntityCollector::new(10, usize::MAX);
        for (id, score) in [(1, 0.4), (2, 0.6)] {
            collector.collect(id, score);
        }
        let entries = collector.into_entries();
        assert_eq!(scores_of(&entries), vec![0.6, 0.4]);
    }

    #[test]
    fn test_exclusions_are_dropped_before_insertion() {
        let excluded: AHashSet<EntityId> = [2u64].into_iter().collect();
        let mut collector = TopEntityCollector::new(0, 2).with_exclusions(&excluded);
        collector.collect(1, 0.5);
        collector.collect(2, 0.9);
        collector.collect(3, 0.4);
        let entries = collector.into_entries();
        assert_eq!(
            entries.iter().map(|e| e.entity_id).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_collector_matches_sorted_reference() {
        use rand::Rng;
        let mut rng = rand::rng();
        let pairs: Vec<(EntityId, f32)> = (0..200u64)
            .map(|id| (id, rng.random_range(0.0f32..100.0)))
            .collect();

        let mut reference: Vec<f32> = pairs.iter().map(|(_, s)| *s).collect();
        reference.sort_by(|a, b| b.partial_cmp(a).unwrap());

        for (skip, limit) in [(0, 0), (0, 1), (0, 200), (100, 50), (200, 10), (0, 210)] {
            let mut collector = TopEntityCollector::new(skip, limit);
            for (id, score) in &pairs {
                collector.collect(*id, *score);
            }
            let entries = collector.into_entries();
            let kept = (skip + limit).min(pairs.len());
            assert_eq!(entries.len(), kept, "skip={} limit={}", skip, limit);
            for (entry, expected) in entries.iter().zip(&reference) {
                assert_eq!(entry.score, *expected, "skip={} limit={}", skip, limit);
            }
        }
    }
}
