//! A single index partition.
//!
//! Each partition owns one writer (the partition itself serializes writes
//! through its lock) and hands out any number of concurrently-live searcher
//! handles. Searchers are reference counted; closing a partition while
//! searchers are outstanding is a loud error.
//!
//! Durability is a snapshot file per partition holding the forward index in
//! a length-prefixed record format: `[u32: length][json: SnapshotRecord]`
//! repeated for each document, written to a temporary file and atomically
//! renamed into place on flush.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analysis::Analyzer;
use crate::codec::EntityDocument;
use crate::data::EntityId;
use crate::error::{Result, SorrelError};
use crate::index::memory::{MemoryIndex, StoredDocument};
use crate::stats::{CollectionStatistics, StatisticsSource, TermStatistics};

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    entity_id: EntityId,
    document: StoredDocument,
}

/// One independently searchable, independently writable index slice.
pub struct Partition {
    id: usize,
    path: PathBuf,
    index: RwLock<MemoryIndex>,
    open_searchers: AtomicUsize,
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("open_searchers", &self.open_searchers.load(Ordering::Relaxed))
            .finish()
    }
}

/// File name of the snapshot for partition `id`.
pub fn partition_file_name(id: usize) -> String {
    format!("partition-{:05}.seg", id)
}

impl Partition {
    /// Create a fresh, empty partition inside `index_dir`.
    pub fn create(id: usize, index_dir: &Path) -> Self {
        Partition {
            id,
            path: index_dir.join(partition_file_name(id)),
            index: RwLock::new(MemoryIndex::new()),
            open_searchers: AtomicUsize::new(0),
        }
    }

    /// Open a partition from its snapshot file. A missing file yields an
    /// empty partition, which happens when the process stopped between
    /// partition creation and the first flush.
    pub fn open(id: usize, index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(partition_file_name(id));
        let index = match fs::File::open(&path) {
            Ok(file) => Self::replay(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => MemoryIndex::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            "opened partition {} with {} documents from {}",
            id,
            index.doc_count(),
            path.display()
        );
        Ok(Partition {
            id,
            path,
            index: RwLock::new(index),
            open_searchers: AtomicUsize::new(0),
        })
    }

    fn replay<R: Read>(mut reader: R) -> Result<MemoryIndex> {
        let mut index = MemoryIndex::new();
        let mut length_buf = [0u8; 4];
        loop {
            match reader.read_exact(&mut length_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes(length_buf) as usize;
            let mut record_buf = vec![0u8; length];
            reader.read_exact(&mut record_buf)?;
            let record: SnapshotRecord = serde_json::from_slice(&record_buf)?;
            index.insert_stored(record.entity_id, record.document);
        }
        Ok(index)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn doc_count(&self) -> u64 {
        self.index.read().doc_count()
    }

    /// Apply one document through this partition's writer.
    pub fn apply(&self, document: &EntityDocument, analyzer: &dyn Analyzer) {
        self.index.write().write(document, analyzer);
    }

    /// Remove an entity's document, if this partition holds one.
    pub fn remove(&self, entity_id: EntityId) {
        self.index.write().remove(entity_id);
    }

    pub fn contains(&self, entity_id: EntityId) -> bool {
        self.index.read().contains(entity_id)
    }

    /// Acquire a searcher handle over this partition.
    pub fn searcher(self: &Arc<Self>) -> PartitionSearcher {
        self.open_searchers.fetch_add(1, Ordering::SeqCst);
        PartitionSearcher {
            partition: Arc::clone(self),
        }
    }

    /// Number of searcher handles currently live.
    pub fn open_searchers(&self) -> usize {
        self.open_searchers.load(Ordering::SeqCst)
    }

    /// Persist the partition's current state to its snapshot file.
    pub fn flush(&self) -> Result<()> {
        let index = self.index.read();
        let tmp_path = self.path.with_extension("seg.tmp");
        {
            let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
            for (entity_id, document) in index.stored_documents() {
                let record = SnapshotRecord {
                    entity_id,
                    document: document.clone(),
                };
                let encoded = serde_json::to_vec(&record)?;
                writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
                writer.write_all(&encoded)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(
            "flushed partition {} ({} documents)",
            self.id,
            index.doc_count()
        );
        Ok(())
    }

    /// Close the partition. Outstanding searchers make this fail loudly
    /// rather than invalidating their views.
    pub fn close(&self) -> Result<()> {
        let outstanding = self.open_searchers();
        if outstanding > 0 {
            return Err(SorrelError::index(format!(
                "cannot close partition {}: {} searcher(s) still open",
                self.id, outstanding
            )));
        }
        Ok(())
    }

    /// Delete the partition's on-disk snapshot.
    pub fn delete_files(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A reference-counted searcher handle over one partition.
///
/// Each read operation takes the partition's read lock for its duration, so
/// one scoring pass observes a consistent view.
pub struct PartitionSearcher {
    partition: Arc<Partition>,
}

impl std::fmt::Debug for PartitionSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionSearcher")
            .field("partition", &self.partition.id)
            .finish()
    }
}

impl PartitionSearcher {
    /// Run `f` against the partition's index under the read lock.
    pub fn with_index<R>(&self, f: impl FnOnce(&MemoryIndex) -> R) -> R {
        let guard = self.partition.index.read();
        f(&guard)
    }

    pub fn partition_id(&self) -> usize {
        self.partition.id
    }
}

impl Drop for PartitionSearcher {
    fn drop(&mut self) {
        self.partition.open_searchers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StatisticsSource for PartitionSearcher {
    fn max_doc(&self) -> u64 {
        self.with_index(|index| index.max_doc())
    }

    fn term_statistics(&self, field: &str, term: &str) -> Option<TermStatistics> {
        self.with_index(|index| index.term_statistics(field, term))
    }

    fn collection_statistics(&self, field: &str) -> Option<CollectionStatistics> {
        self.with_index(|index| index.collection_statistics(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::codec::DocumentBuffer;
    use crate::data::PropertyValue;

    fn doc(entity_id: EntityId, text: &str) -> EntityDocument {
        let mut buffer = DocumentBuffer::new();
        buffer
            .encode(
                entity_id,
                &["body".to_string()],
                &[Some(PropertyValue::Text(text.to_string()))],
            )
            .clone()
    }

    #[test]
    fn test_flush_and_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = StandardAnalyzer::new();

        let partition = Partition::create(0, dir.path());
        partition.apply(&doc(1, "alpha beta"), &analyzer);
        partition.apply(&doc(2, "beta gamma"), &analyzer);
        partition.remove(1);
        partition.flush().unwrap();

        let reopened = Partition::open(0, dir.path()).unwrap();
        assert_eq!(reopened.doc_count(), 1);
        assert!(reopened.contains(2));
        assert!(!reopened.contains(1));
    }

    #[test]
    fn test_open_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open(3, dir.path()).unwrap();
        assert_eq!(partition.doc_count(), 0);
    }

    #[test]
    fn test_close_fails_with_outstanding_searchers() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Arc::new(Partition::create(0, dir.path()));

        let searcher = partition.searcher();
        assert_eq!(partition.open_searchers(), 1);
        assert!(partition.close().is_err());

        drop(searcher);
        assert_eq!(partition.open_searchers(), 0);
        partition.close().unwrap();
    }
}
