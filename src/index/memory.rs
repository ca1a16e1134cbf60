//! In-memory inverted index primitive.
//!
//! Keeps per-field postings (term → entity → term frequency) together with
//! a forward index used for document removal and length normalization.
//! Writes go through an analyzer; reads expose exactly the statistics the
//! cross-partition aggregator needs.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::analysis::Analyzer;
use crate::codec::EntityDocument;
use crate::data::EntityId;
use crate::stats::{CollectionStatistics, GlobalStatistics, StatisticsSource, TermStatistics};

/// Indexed state of one field of one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredField {
    /// Term → frequency within this field.
    pub terms: AHashMap<String, u32>,
    /// Token count of the field, before frequency folding.
    pub length: u32,
}

/// Forward-index entry for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredDocument {
    pub fields: AHashMap<String, StoredField>,
}

#[derive(Debug, Default)]
struct Postings {
    entries: AHashMap<EntityId, u32>,
    total_term_freq: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct FieldTotals {
    doc_count: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
}

/// A writable, searchable inverted index held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    postings: AHashMap<String, AHashMap<String, Postings>>,
    docs: AHashMap<EntityId, StoredDocument>,
    field_totals: AHashMap<String, FieldTotals>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        MemoryIndex::default()
    }

    /// Number of documents, including ones with no indexable text.
    pub fn doc_count(&self) -> u64 {
        self.docs.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.docs.contains_key(&entity_id)
    }

    /// Upsert a document: analyze its text fields and index the result.
    /// A previously indexed document for the same entity is replaced.
    pub fn write(&mut self, document: &EntityDocument, analyzer: &dyn Analyzer) {
        let mut stored = StoredDocument::default();
        for (field, text) in &document.fields {
            let tokens = analyzer.analyze(text);
            if tokens.is_empty() {
                continue;
            }
            let length = tokens.len() as u32;
            let mut terms: AHashMap<String, u32> = AHashMap::new();
            for token in tokens {
                *terms.entry(token).or_insert(0) += 1;
            }
            stored
                .fields
                .insert(field.clone(), StoredField { terms, length });
        }
        self.insert_stored(document.entity_id, stored);
    }

    /// Remove a document. Unknown entities are a no-op.
    pub fn remove(&mut self, entity_id: EntityId) {
        let Some(stored) = self.docs.remove(&entity_id) else {
            return;
        };
        for (field, stored_field) in &stored.fields {
            if let Some(field_postings) = self.postings.get_mut(field) {
                for term in stored_field.terms.keys() {
                    if let Some(postings) = field_postings.get_mut(term) {
                        if let Some(tf) = postings.entries.remove(&entity_id) {
                            postings.total_term_freq -= tf as u64;
                        }
                        if postings.entries.is_empty() {
                            field_postings.remove(term);
                        }
                    }
                }
                if field_postings.is_empty() {
                    self.postings.remove(field);
                }
            }
            if let Some(totals) = self.field_totals.get_mut(field) {
                totals.doc_count -= 1;
                totals.sum_total_term_freq -= stored_field.length as u64;
                totals.sum_doc_freq -= stored_field.terms.len() as u64;
                if totals.doc_count == 0 {
                    self.field_totals.remove(field);
                }
            }
        }
    }

    /// Drop every document.
    pub fn clear(&mut self) {
        self.postings.clear();
        self.docs.clear();
        self.field_totals.clear();
    }

    /// Re-insert an already analyzed document, e.g. replayed from a
    /// partition snapshot. Replaces any existing document for the entity.
    pub fn insert_stored(&mut self, entity_id: EntityId, stored: StoredDocument) {
        self.remove(entity_id);
        for (field, stored_field) in &stored.fields {
            let field_postings = self.postings.entry(field.clone()).or_default();
            for (term, tf) in &stored_field.terms {
                let postings = field_postings.entry(term.clone()).or_default();
                postings.entries.insert(entity_id, *tf);
                postings.total_term_freq += *tf as u64;
            }
            let totals = self.field_totals.entry(field.clone()).or_default();
            totals.doc_count += 1;
            totals.sum_total_term_freq += stored_field.length as u64;
            totals.sum_doc_freq += stored_field.terms.len() as u64;
        }
        self.docs.insert(entity_id, stored);
    }

    /// Iterate the forward index, for snapshot writing.
    pub fn stored_documents(&self) -> impl Iterator<Item = (EntityId, &StoredDocument)> {
        self.docs.iter().map(|(id, stored)| (*id, stored))
    }

    fn field_length(&self, entity_id: EntityId, field: &str) -> u32 {
        self.docs
            .get(&entity_id)
            .and_then(|stored| stored.fields.get(field))
            .map(|stored_field| stored_field.length)
            .unwrap_or(0)
    }

    /// Score every document matching any of `terms` in any of `fields`
    /// against the supplied global statistics, feeding the accumulated
    /// per-entity scores to `emit`.
    pub fn score_matches(
        &self,
        fields: &[String],
        terms: &[String],
        statistics: &GlobalStatistics,
        emit: &mut dyn FnMut(EntityId, f32),
    ) {
        let mut accumulated: AHashMap<EntityId, f32> = AHashMap::new();
        for field in fields {
            let Some(field_postings) = self.postings.get(field) else {
                continue;
            };
            for term in terms {
                let Some(postings) = field_postings.get(term) else {
                    continue;
                };
                for (entity_id, tf) in &postings.entries {
                    let contribution = statistics.score(
                        field,
                        term,
                        *tf,
                        self.field_length(*entity_id, field),
                    );
                    *accumulated.entry(*entity_id).or_insert(0.0) += contribution;
                }
            }
        }
        for (entity_id, score) in accumulated {
            if score > 0.0 {
                emit(entity_id, score);
            }
        }
    }
}

impl StatisticsSource for MemoryIndex {
    fn max_doc(&self) -> u64 {
        self.doc_count()
    }

    fn term_statistics(&self, field: &str, term: &str) -> Option<TermStatistics> {
        let postings = self.postings.get(field)?.get(term)?;
        if postings.entries.is_empty() {
            return None;
        }
        Some(TermStatistics {
            doc_freq: postings.entries.len() as u64,
            total_term_freq: postings.total_term_freq,
        })
    }

    fn collection_statistics(&self, field: &str) -> Option<CollectionStatistics> {
        let totals = self.field_totals.get(field)?;
        Some(CollectionStatistics {
            max_doc: self.doc_count(),
            doc_count: totals.doc_count,
            sum_total_term_freq: totals.sum_total_term_freq,
            sum_doc_freq: totals.sum_doc_freq,
        })
    }
}
