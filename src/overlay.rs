//! Per-transaction overlay readers.
//!
//! A transaction querying a full-text index must see its own uncommitted
//! writes, and must not see committed matches it has since superseded. The
//! committed index cannot serve that, so each (transaction, index) pair
//! gets a [`TransactionOverlay`]: a disposable in-memory index of the
//! transaction's pending writes plus an exclusion set of every entity the
//! transaction touched.
//!
//! The overlay moves through three states. It starts EMPTY; the first read
//! builds it (VALID). Whenever the transaction's write-set revision
//! advances it becomes STALE, and the next read rebuilds it from scratch by
//! replaying the entire current write-set (never a delta) through the
//! index's token and property filters, reading property values through the
//! transaction's own read view. Entities whose token changes take them out
//! of the index still enter the exclusion set, so their stale base-index
//! hits stay suppressed. The overlay is destroyed with its transaction.

use std::sync::Arc;

use ahash::AHashMap;
use ahash::AHashSet;
use log::debug;

use crate::analysis::Analyzer;
use crate::codec::DocumentBuffer;
use crate::collect::ScoreEntry;
use crate::data::{EntityId, PropertyValue};
use crate::error::Result;
use crate::index::memory::MemoryIndex;
use crate::index::partitioned::PartitionedIndex;
use crate::schema::IndexDescriptor;
use crate::search::{self, QueryOptions};
use crate::txn::{EntityModification, Transaction};

/// Where an overlay stands relative to its transaction's write-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// Never built.
    Empty,
    /// Built against the transaction's current write-set revision.
    Valid,
    /// The write-set has changed since the overlay was built.
    Stale,
}

/// In-memory index of one transaction's pending writes against one index.
pub struct TransactionOverlay {
    descriptor: Arc<IndexDescriptor>,
    analyzer: Arc<dyn Analyzer>,
    /// Write-set revision the overlay was last built against. `None` until
    /// the first build.
    revision: Option<u64>,
    overlay: MemoryIndex,
    excluded: AHashSet<EntityId>,
    buffer: DocumentBuffer,
}

impl std::fmt::Debug for TransactionOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionOverlay")
            .field("index", &self.descriptor.name)
            .field("revision", &self.revision)
            .field("excluded", &self.excluded.len())
            .finish()
    }
}

impl TransactionOverlay {
    pub fn new(descriptor: Arc<IndexDescriptor>, analyzer: Arc<dyn Analyzer>) -> Self {
        TransactionOverlay {
            descriptor,
            analyzer,
            revision: None,
            overlay: MemoryIndex::new(),
            excluded: AHashSet::new(),
            buffer: DocumentBuffer::new(),
        }
    }

    /// The overlay's state relative to `txn`'s current write-set.
    pub fn state(&self, txn: &dyn Transaction) -> OverlayState {
        match self.revision {
            None => OverlayState::Empty,
            Some(revision) if revision == txn.revision() => OverlayState::Valid,
            Some(_) => OverlayState::Stale,
        }
    }

    /// Entity ids modified by the transaction, used to suppress stale base
    /// hits. Only meaningful while the overlay is valid.
    pub fn excluded(&self) -> &AHashSet<EntityId> {
        &self.excluded
    }

    /// Bring the overlay up to date with the transaction's write-set,
    /// rebuilding from scratch when the revision has advanced.
    pub fn refresh(&mut self, txn: &dyn Transaction) -> Result<()> {
        if self.state(txn) == OverlayState::Valid {
            return Ok(());
        }
        self.excluded.clear();
        self.overlay.clear();

        let descriptor = Arc::clone(&self.descriptor);
        let analyzer = Arc::clone(&self.analyzer);
        let overlay = &mut self.overlay;
        let excluded = &mut self.excluded;
        let buffer = &mut self.buffer;

        txn.visit_write_set(descriptor.entity_type, &mut |m: &EntityModification| {
            excluded.insert(m.entity_id);
            if m.removed || !descriptor.matches_tokens(&m.tokens) {
                // Suppressed from the base index, nothing to re-index.
                return Ok(());
            }
            let values: Vec<Option<PropertyValue>> = descriptor
                .properties
                .iter()
                .map(|property| txn.property_value(descriptor.entity_type, m.entity_id, property))
                .collect();
            let document = buffer.encode(m.entity_id, &descriptor.properties, &values);
            overlay.write(document, analyzer.as_ref());
            Ok(())
        })?;

        self.revision = Some(txn.revision());
        debug!(
            "rebuilt overlay for index '{}' at revision {} ({} documents, {} excluded)",
            self.descriptor.name,
            txn.revision(),
            self.overlay.doc_count(),
            self.excluded.len()
        );
        Ok(())
    }

    /// Execute a ranked query that merges the committed base index with
    /// this transaction's pending writes: base hits for entities the
    /// transaction touched are filtered out, the overlay's hits are merged
    /// in, and global score order is preserved.
    pub fn query(
        &mut self,
        txn: &dyn Transaction,
        base: &PartitionedIndex,
        terms: &[String],
        options: QueryOptions,
    ) -> Result<Vec<ScoreEntry>> {
        self.refresh(txn)?;
        let searchers = base.searchers()?;
        Ok(search::execute_search(
            &searchers,
            Some(&self.overlay),
            Some(&self.excluded),
            &self.descriptor.properties,
            terms,
            options.skip,
            options.limit,
        ))
    }
}

/// The overlays of one transaction, at most one per index. Owned by the
/// transaction's auxiliary state and dropped when the transaction ends,
/// releasing every overlay's resources.
#[derive(Debug, Default)]
pub struct OverlaySet {
    overlays: AHashMap<String, TransactionOverlay>,
}

impl OverlaySet {
    pub fn new() -> Self {
        OverlaySet::default()
    }

    /// The overlay for `descriptor`, created on first use.
    pub fn overlay_for(
        &mut self,
        descriptor: &Arc<IndexDescriptor>,
        analyzer: &Arc<dyn Analyzer>,
    ) -> &mut TransactionOverlay {
        self.overlays
            .entry(descriptor.name.clone())
            .or_insert_with(|| {
                TransactionOverlay::new(Arc::clone(descriptor), Arc::clone(analyzer))
            })
    }

    /// Release the overlay of one index, e.g. when that index is dropped
    /// mid-transaction.
    pub fn release(&mut self, index_name: &str) {
        self.overlays.remove(index_name);
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }
}
