//! Ranked query execution across partitions and overlay readers.
//!
//! One query execution runs in two passes. First the statistics pass
//! aggregates term- and collection-level statistics across every
//! participating reader, so scores are computed against global corpus
//! statistics. Then each reader collects its own top matches into a bounded
//! collector (partitions in parallel), and the per-reader streams are
//! merged into one globally score-descending stream on which skip and limit
//! are applied.

use ahash::AHashSet;
use rayon::prelude::*;

use crate::collect::{ScoreEntry, TopEntityCollector};
use crate::data::EntityId;
use crate::index::memory::MemoryIndex;
use crate::index::partition::PartitionSearcher;
use crate::merge::{ScoreStream, merge_score_streams};
use crate::stats::{GlobalStatistics, StatisticsSource};

/// Skip/limit constraint of one query.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Entries discarded from the front of the merged stream.
    pub skip: usize,
    /// Maximum entries returned after the skip.
    pub limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            skip: 0,
            limit: usize::MAX,
        }
    }
}

impl QueryOptions {
    pub fn new(skip: usize, limit: usize) -> Self {
        QueryOptions { skip, limit }
    }
}

/// A ranked, score-descending stream of `(entity id, score)` matches.
#[derive(Debug)]
pub struct ScoredEntities {
    inner: std::vec::IntoIter<ScoreEntry>,
}

impl ScoredEntities {
    pub(crate) fn new(entries: Vec<ScoreEntry>) -> Self {
        ScoredEntities {
            inner: entries.into_iter(),
        }
    }
}

impl Iterator for ScoredEntities {
    type Item = ScoreEntry;

    fn next(&mut self) -> Option<ScoreEntry> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ScoredEntities {}

/// Execute one ranked query.
///
/// `base` are the committed partition searchers; `excluded` suppresses
/// entity ids from them (entities re-indexed by a transaction overlay).
/// The `overlay` reader, when present, is searched without exclusion.
pub(crate) fn execute_search(
    base: &[PartitionSearcher],
    overlay: Option<&MemoryIndex>,
    excluded: Option<&AHashSet<EntityId>>,
    fields: &[String],
    terms: &[String],
    skip: usize,
    limit: usize,
) -> Vec<ScoreEntry> {
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut sources: Vec<&dyn StatisticsSource> = base
        .iter()
        .map(|searcher| searcher as &dyn StatisticsSource)
        .collect();
    if let Some(overlay) = overlay {
        sources.push(overlay);
    }
    let statistics = GlobalStatistics::aggregate(&sources, fields, terms);

    let mut streams: Vec<ScoreStream> = base
        .par_iter()
        .map(|searcher| {
            let mut collector = TopEntityCollector::new(skip, limit);
            if let Some(excluded) = excluded {
                collector = collector.with_exclusions(excluded);
            }
            searcher.with_index(|index| {
                index.score_matches(fields, terms, &statistics, &mut |entity_id, score| {
                    collector.collect(entity_id, score)
                });
            });
            Box::new(collector.into_entries().into_iter()) as ScoreStream
        })
        .collect();

    if let Some(overlay) = overlay {
        let mut collector = TopEntityCollector::new(skip, limit);
        overlay.score_matches(fields, terms, &statistics, &mut |entity_id, score| {
            collector.collect(entity_id, score)
        });
        streams.push(Box::new(collector.into_entries().into_iter()));
    }

    merge_score_streams(streams).skip(skip).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::codec::DocumentBuffer;
    use crate::data::PropertyValue;
    use crate::index::partitioned::PartitionedIndex;

    fn fields() -> Vec<String> {
        vec!["body".to_string()]
    }

    fn write(index: &PartitionedIndex, entity_id: EntityId, text: &str) {
        let analyzer = StandardAnalyzer::new();
        let mut buffer = DocumentBuffer::new();
        let document = buffer.encode(
            entity_id,
            &fields(),
            &[Some(PropertyValue::Text(text.to_string()))],
        );
        index.write(document, &analyzer).unwrap();
    }

    #[test]
    fn test_identical_documents_score_identically_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let index = PartitionedIndex::create("idx", dir.path(), 4).unwrap();
        index.set_online();

        // Two identical documents land in different partitions; a pile of
        // unrelated documents skews the per-partition local statistics.
        write(&index, 0, "rare marble statue");
        write(&index, 1, "rare marble statue");
        for id in 2..20u64 {
            write(&index, id, "filler text about nothing much");
        }

        let hits = index
            .query(&fields(), &["marble".to_string()], 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, hits[1].score);
    }

    #[test]
    fn test_exclusion_suppresses_base_hits() {
        let dir = tempfile::tempdir().unwrap();
        let index = PartitionedIndex::create("idx", dir.path(), 2).unwrap();
        index.set_online();
        write(&index, 1, "apple orchard");
        write(&index, 2, "apple pie");

        let excluded: AHashSet<EntityId> = [1u64].into_iter().collect();
        let searchers = index.searchers().unwrap();
        let hits = execute_search(
            &searchers,
            None,
            Some(&excluded),
            &fields(),
            &["apple".to_string()],
            0,
            10,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entity_id, 2);
    }

    #[test]
    fn test_empty_terms_yield_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let index = PartitionedIndex::create("idx", dir.path(), 1).unwrap();
        index.set_online();
        write(&index, 1, "something");

        let searchers = index.searchers().unwrap();
        let hits = execute_search(&searchers, None, None, &fields(), &[], 0, 10);
        assert!(hits.is_empty());
    }
}
