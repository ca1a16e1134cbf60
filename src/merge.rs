//! Streaming merge of score-ordered result streams.
//!
//! Each input iterator is already descending by score; the merge keeps one
//! buffered head element per input and repeatedly emits the maximum among
//! the heads, refilling only the slot it emitted from. That is O(N) per
//! emitted element, which is fine because N is the number of partitions and
//! overlay readers participating in one query, typically a handful.
//!
//! Skip and limit are applied on the merged stream with the standard
//! iterator adapters: `skip(n)` discards the first n entries, `take(m)`
//! truncates after m.

use crate::collect::ScoreEntry;

/// A score-descending stream of ranked matches.
pub type ScoreStream = Box<dyn Iterator<Item = ScoreEntry> + Send>;

/// Merge any number of score-descending streams into one globally
/// score-descending stream containing exactly the union of the inputs.
pub fn merge_score_streams(streams: Vec<ScoreStream>) -> MergedScoreStream {
    let mut inputs = Vec::with_capacity(streams.len());
    let mut heads = Vec::with_capacity(streams.len());
    for mut stream in streams {
        heads.push(stream.next());
        inputs.push(stream);
    }
    MergedScoreStream { inputs, heads }
}

/// Iterator produced by [`merge_score_streams`].
pub struct MergedScoreStream {
    inputs: Vec<ScoreStream>,
    heads: Vec<Option<ScoreEntry>>,
}

impl Iterator for MergedScoreStream {
    type Item = ScoreEntry;

    fn next(&mut self) -> Option<ScoreEntry> {
        let mut best: Option<(usize, f32)> = None;
        for (slot, head) in self.heads.iter().enumerate() {
            if let Some(entry) = head {
                match best {
                    Some((_, best_score)) if entry.score <= best_score => {}
                    _ => best = Some((slot, entry.score)),
                }
            }
        }
        let (slot, _) = best?;
        let entry = self.heads[slot].take();
        self.heads[slot] = self.inputs[slot].next();
        entry
    }
}
