//! Cross-partition statistics aggregation and relevance scoring.
//!
//! Relevance scoring is sensitive to corpus-wide term rarity. When one
//! query spans several partitions (and possibly a transaction overlay), a
//! document in a small partition would score differently than an identical
//! document in a large one if every reader scored against its own local
//! statistics. [`GlobalStatistics`] therefore sums term- and
//! collection-level statistics across exactly the readers participating in
//! one query execution, and every reader scores against that sum. Instances
//! are built per query execution and never reused across queries, because
//! the underlying readers can change between executions.

use ahash::AHashMap;

/// BM25 term-frequency saturation.
const K1: f32 = 1.2;
/// BM25 length-normalization strength.
const B: f32 = 0.75;

/// Per-term statistics of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermStatistics {
    /// Number of documents containing the term.
    pub doc_freq: u64,
    /// Total number of occurrences of the term.
    pub total_term_freq: u64,
}

/// Collection-level statistics of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStatistics {
    /// Total document count of the reader, regardless of field.
    pub max_doc: u64,
    /// Number of documents that have the field.
    pub doc_count: u64,
    /// Sum of field lengths over those documents.
    pub sum_total_term_freq: u64,
    /// Sum of distinct-term counts over those documents.
    pub sum_doc_freq: u64,
}

/// One reader's contribution to a query's statistics.
pub trait StatisticsSource {
    fn max_doc(&self) -> u64;

    /// `None` when the reader has no occurrence of the term at all.
    fn term_statistics(&self, field: &str, term: &str) -> Option<TermStatistics>;

    /// `None` when the reader has no document with the field.
    fn collection_statistics(&self, field: &str) -> Option<CollectionStatistics>;
}

/// Statistics summed across every reader participating in one query.
#[derive(Debug, Default)]
pub struct GlobalStatistics {
    terms: AHashMap<(String, String), TermStatistics>,
    collections: AHashMap<String, CollectionStatistics>,
}

impl GlobalStatistics {
    /// Aggregate statistics for the given fields and terms across
    /// `sources`. Readers with zero occurrences of a term are excluded from
    /// that term's sum rather than contributing a zero-valued entry.
    pub fn aggregate(
        sources: &[&dyn StatisticsSource],
        fields: &[String],
        terms: &[String],
    ) -> Self {
        let mut statistics = GlobalStatistics::default();
        for field in fields {
            let mut collection: Option<CollectionStatistics> = None;
            for source in sources {
                let Some(found) = source.collection_statistics(field) else {
                    continue;
                };
                if found.doc_count == 0 {
                    continue;
                }
                let entry = collection.get_or_insert(CollectionStatistics {
                    max_doc: 0,
                    doc_count: 0,
                    sum_total_term_freq: 0,
                    sum_doc_freq: 0,
                });
                entry.max_doc += source.max_doc();
                entry.doc_count += found.doc_count;
                entry.sum_total_term_freq += found.sum_total_term_freq;
                entry.sum_doc_freq += found.sum_doc_freq;
            }
            if let Some(collection) = collection {
                statistics.collections.insert(field.clone(), collection);
            }

            for term in terms {
                let mut aggregated: Option<TermStatistics> = None;
                for source in sources {
                    let Some(found) = source.term_statistics(field, term) else {
                        continue;
                    };
                    if found.doc_freq == 0 {
                        continue;
                    }
                    let entry = aggregated.get_or_insert(TermStatistics {
                        doc_freq: 0,
                        total_term_freq: 0,
                    });
                    entry.doc_freq += found.doc_freq;
                    entry.total_term_freq += found.total_term_freq;
                }
                if let Some(aggregated) = aggregated {
                    statistics
                        .terms
                        .insert((field.clone(), term.clone()), aggregated);
                }
            }
        }
        statistics
    }

    /// Aggregated statistics for a term, `None` when no participating
    /// reader has it.
    pub fn term_statistics(&self, field: &str, term: &str) -> Option<&TermStatistics> {
        self.terms.get(&(field.to_string(), term.to_string()))
    }

    /// Aggregated collection statistics for a field.
    pub fn collection_statistics(&self, field: &str) -> Option<&CollectionStatistics> {
        self.collections.get(field)
    }

    /// BM25 contribution of one (field, term) match.
    ///
    /// Unknown statistics yield a zero contribution, not an error: a term
    /// or field absent from every participating reader simply does not
    /// score.
    pub fn score(&self, field: &str, term: &str, term_freq: u32, field_length: u32) -> f32 {
        let Some(term_stats) = self.term_statistics(field, term) else {
            return 0.0;
        };
        let Some(collection) = self.collection_statistics(field) else {
            return 0.0;
        };
        let doc_count = collection.doc_count as f32;
        let doc_freq = term_stats.doc_freq as f32;
        let idf = (1.0 + (doc_count - doc_freq + 0.5) / (doc_freq + 0.5)).ln();

        let avg_length = collection.sum_total_term_freq as f32 / doc_count;
        let length = if field_length == 0 {
            avg_length
        } else {
            field_length as f32
        };
        let tf = term_freq as f32;
        let norm = (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * length / avg_length));
        idf * norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        max_doc: u64,
        term: Option<TermStatistics>,
        collection: Option<CollectionStatistics>,
    }

    impl StatisticsSource for FixedSource {
        fn max_doc(&self) -> u64 {
            self.max_doc
        }
        fn term_statistics(&self, _field: &str, _term: &str) -> Option<TermStatistics> {
            self.term
        }
        fn collection_statistics(&self, _field: &str) -> Option<CollectionStatistics> {
            self.collection
        }
    }

    fn fields() -> Vec<String> {
        vec!["body".to_string()]
    }

    fn terms() -> Vec<String> {
        vec!["foo".to_string()]
    }

    #[test]
    fn test_zero_occurrence_partitions_contribute_nothing() {
        // Partition 1 has foo in 3 docs (5 occurrences); partition 2
        // reports a zero doc-freq and must be excluded from the sum, even
        // though it claims a non-zero total term frequency.
        let one = FixedSource {
            max_doc: 10,
            term: Some(TermStatistics {
                doc_freq: 3,
                total_term_freq: 5,
            }),
            collection: Some(CollectionStatistics {
                max_doc: 10,
                doc_count: 10,
                sum_total_term_freq: 100,
                sum_doc_freq: 40,
            }),
        };
        let two = FixedSource {
            max_doc: 50,
            term: Some(TermStatistics {
                doc_freq: 0,
                total_term_freq: 7,
            }),
            collection: Some(CollectionStatistics {
                max_doc: 50,
                doc_count: 50,
                sum_total_term_freq: 700,
                sum_doc_freq: 300,
            }),
        };
        let statistics =
            GlobalStatistics::aggregate(&[&one, &two], &fields(), &terms());
        let term = statistics.term_statistics("body", "foo").unwrap();
        assert_eq!(term.doc_freq, 3);
        assert_eq!(term.total_term_freq, 5);
    }

    #[test]
    fn test_term_sums_across_occurring_partitions() {
        let one = FixedSource {
            max_doc: 10,
            term: Some(TermStatistics {
                doc_freq: 3,
                total_term_freq: 4,
            }),
            collection: Some(CollectionStatistics {
                max_doc: 10,
                doc_count: 8,
                sum_total_term_freq: 80,
                sum_doc_freq: 30,
            }),
        };
        let two = FixedSource {
            max_doc: 20,
            term: Some(TermStatistics {
                doc_freq: 5,
                total_term_freq: 9,
            }),
            collection: Some(CollectionStatistics {
                max_doc: 20,
                doc_count: 20,
                sum_total_term_freq: 300,
                sum_doc_freq: 100,
            }),
        };
        let statistics =
            GlobalStatistics::aggregate(&[&one, &two], &fields(), &terms());
        let term = statistics.term_statistics("body", "foo").unwrap();
        assert_eq!(term.doc_freq, 8);
        assert_eq!(term.total_term_freq, 13);

        let collection = statistics.collection_statistics("body").unwrap();
        assert_eq!(collection.max_doc, 30);
        assert_eq!(collection.doc_count, 28);
        assert_eq!(collection.sum_total_term_freq, 380);
        assert_eq!(collection.sum_doc_freq, 130);
    }

    #[test]
    fn test_unknown_term_is_absent_and_scores_zero() {
        let statistics = GlobalStatistics::aggregate(&[], &fields(), &terms());
        assert!(statistics.term_statistics("body", "foo").is_none());
        assert!(statistics.collection_statistics("body").is_none());
        assert_eq!(statistics.score("body", "foo", 3, 10), 0.0);
    }

    #[test]
    fn test_score_is_positive_and_rarity_sensitive() {
        let source = FixedSource {
            max_doc: 100,
            term: Some(TermStatistics {
                doc_freq: 2,
                total_term_freq: 3,
            }),
            collection: Some(CollectionStatistics {
                max_doc: 100,
                doc_count: 100,
                sum_total_term_freq: 1_000,
                sum_doc_freq: 500,
            }),
        };
        let rare = GlobalStatistics::aggregate(&[&source], &fields(), &terms());

        let common_source = FixedSource {
            term: Some(TermStatistics {
                doc_freq: 90,
                total_term_freq: 300,
            }),
            ..source
        };
        let common = GlobalStatistics::aggregate(&[&common_source], &fields(), &terms());

        let rare_score = rare.score("body", "foo", 1, 10);
        let common_score = common.score("body", "foo", 1, 10);
        assert!(rare_score > 0.0);
        assert!(common_score > 0.0);
        assert!(rare_score > common_score);
    }
}
