use tempfile::TempDir;

use sorrel::{DocumentBuffer, PartitionedIndex, PropertyValue, ScoreEntry};
use sorrel::analysis::StandardAnalyzer;

fn fields() -> Vec<String> {
    vec!["body".to_string()]
}

/// Build a four-partition index with thirty documents of varying term
/// frequency and length, so scores are distinct and ordering meaningful.
fn ranked_corpus(dir: &TempDir) -> std::sync::Arc<PartitionedIndex> {
    let analyzer = StandardAnalyzer::new();
    let index = PartitionedIndex::create("corpus", dir.path(), 4).unwrap();
    index.set_online();
    let mut buffer = DocumentBuffer::new();
    for i in 0..30u64 {
        let zebra_count = (i % 5 + 1) as usize;
        let padding = (i + 3) as usize;
        let mut text = "zebra ".repeat(zebra_count);
        for p in 0..padding {
            text.push_str(&format!("pad{} ", p));
        }
        let document = buffer.encode(
            i,
            &fields(),
            &[Some(PropertyValue::Text(text))],
        );
        index.write(document, &analyzer).unwrap();
    }
    index
}

#[test]
fn test_results_are_globally_score_ordered_across_partitions() {
    let dir = TempDir::new().unwrap();
    let index = ranked_corpus(&dir);

    let hits = index
        .query(&fields(), &["zebra".to_string()], 0, usize::MAX)
        .unwrap();
    assert_eq!(hits.len(), 30);
    for window in hits.windows(2) {
        assert!(
            window[0].score >= window[1].score,
            "scores must be non-increasing: {:?}",
            window
        );
    }
}

#[test]
fn test_skip_limit_matches_full_result_slices() {
    let dir = TempDir::new().unwrap();
    let index = ranked_corpus(&dir);

    let full: Vec<ScoreEntry> = index
        .query(&fields(), &["zebra".to_string()], 0, usize::MAX)
        .unwrap();

    for (skip, limit) in [(0, 0), (0, 1), (0, 30), (0, 40), (15, 10), (15, 30), (30, 5)] {
        let hits = index
            .query(&fields(), &["zebra".to_string()], skip, limit)
            .unwrap();
        let expected: Vec<ScoreEntry> = full
            .iter()
            .skip(skip)
            .take(limit)
            .copied()
            .collect();
        assert_eq!(hits, expected, "skip={} limit={}", skip, limit);
    }
}

#[test]
fn test_rarer_terms_outrank_common_ones() {
    let dir = TempDir::new().unwrap();
    let analyzer = StandardAnalyzer::new();
    let index = PartitionedIndex::create("corpus", dir.path(), 2).unwrap();
    index.set_online();
    let mut buffer = DocumentBuffer::new();

    // "quill" appears once in the corpus, "common" in every document.
    for i in 0..10u64 {
        let text = if i == 0 {
            "quill common words here".to_string()
        } else {
            "common words here again".to_string()
        };
        let document = buffer.encode(i, &fields(), &[Some(PropertyValue::Text(text))]);
        index.write(document, &analyzer).unwrap();
    }

    let hits = index
        .query(
            &fields(),
            &["quill".to_string(), "common".to_string()],
            0,
            usize::MAX,
        )
        .unwrap();
    assert_eq!(hits.len(), 10);
    assert_eq!(
        hits[0].entity_id, 0,
        "the document matching the rare term must rank first"
    );
}
