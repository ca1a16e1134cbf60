//! The partitioned index and its lifecycle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::codec::EntityDocument;
use crate::collect::ScoreEntry;
use crate::data::EntityId;
use crate::error::{Result, SorrelError};
use crate::index::partition::{Partition, PartitionSearcher};
use crate::search;

/// Lifecycle state of one logical index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// Created, initial content still being built.
    Populating,
    /// Serving reads and writes.
    Online,
    /// Terminal: population or update application failed. Carries the
    /// causing message; writes and queries fail fast.
    Failed(String),
    /// Terminal: the index was dropped and its files removed.
    Dropped,
}

/// An ordered, append-only set of partitions making up one logical index.
///
/// The partition count only grows; a partition is never removed except by
/// dropping the whole index, which is terminal.
pub struct PartitionedIndex {
    name: String,
    path: PathBuf,
    partitions: RwLock<Vec<Arc<Partition>>>,
    state: RwLock<IndexState>,
}

impl std::fmt::Debug for PartitionedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedIndex")
            .field("name", &self.name)
            .field("partitions", &self.partitions.read().len())
            .field("state", &self.state.read())
            .finish()
    }
}

impl PartitionedIndex {
    /// Create a fresh index with `partition_count` empty partitions. The
    /// index starts in [`IndexState::Populating`].
    pub fn create<S: Into<String>>(
        name: S,
        path: &Path,
        partition_count: usize,
    ) -> Result<Arc<Self>> {
        let partition_count = partition_count.max(1);
        fs::create_dir_all(path)?;
        let partitions = (0..partition_count)
            .map(|id| Arc::new(Partition::create(id, path)))
            .collect();
        Ok(Arc::new(PartitionedIndex {
            name: name.into(),
            path: path.to_path_buf(),
            partitions: RwLock::new(partitions),
            state: RwLock::new(IndexState::Populating),
        }))
    }

    /// Open an existing index from disk, replaying every partition
    /// snapshot found in the index directory. Opens directly online.
    pub fn open<S: Into<String>>(name: S, path: &Path) -> Result<Arc<Self>> {
        let name = name.into();
        let mut ids = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = file_name
                .strip_prefix("partition-")
                .and_then(|rest| rest.strip_suffix(".seg"))
                && let Ok(id) = stem.parse::<usize>()
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        if ids.is_empty() {
            ids.push(0);
        }
        let mut partitions = Vec::with_capacity(ids.len());
        for id in ids {
            partitions.push(Arc::new(Partition::open(id, path)?));
        }
        debug!("opened index '{}' with {} partition(s)", name, partitions.len());
        Ok(Arc::new(PartitionedIndex {
            name,
            path: path.to_path_buf(),
            partitions: RwLock::new(partitions),
            state: RwLock::new(IndexState::Online),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> IndexState {
        self.state.read().clone()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    /// Total document count across partitions.
    pub fn doc_count(&self) -> u64 {
        self.partitions.read().iter().map(|p| p.doc_count()).sum()
    }

    /// Transition from populating to serving.
    pub fn set_online(&self) {
        let mut state = self.state.write();
        if *state == IndexState::Populating {
            *state = IndexState::Online;
        }
    }

    /// Mark the index failed. The first failure message wins; the failed
    /// state is terminal except for `drop`.
    pub fn mark_failed<S: Into<String>>(&self, message: S) {
        let mut state = self.state.write();
        match *state {
            IndexState::Failed(_) | IndexState::Dropped => {}
            _ => {
                let message = message.into();
                warn!("index '{}' marked failed: {}", self.name, message);
                *state = IndexState::Failed(message);
            }
        }
    }

    /// The failure message, when the index is in the failed state.
    pub fn population_failure(&self) -> Option<String> {
        match &*self.state.read() {
            IndexState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match &*self.state.read() {
            IndexState::Populating | IndexState::Online => Ok(()),
            IndexState::Failed(message) => Err(SorrelError::index(format!(
                "index '{}' is in a failed state: {}",
                self.name, message
            ))),
            IndexState::Dropped => Err(SorrelError::index(format!(
                "index '{}' has been dropped",
                self.name
            ))),
        }
    }

    fn ensure_online(&self) -> Result<()> {
        match &*self.state.read() {
            IndexState::Online => Ok(()),
            IndexState::Populating => Err(SorrelError::index(format!(
                "index '{}' is still populating",
                self.name
            ))),
            IndexState::Failed(message) => Err(SorrelError::index(format!(
                "index '{}' is in a failed state: {}",
                self.name, message
            ))),
            IndexState::Dropped => Err(SorrelError::index(format!(
                "index '{}' has been dropped",
                self.name
            ))),
        }
    }

    /// Append one more partition. Existing partitions are untouched, and
    /// entities already routed to them stay where they are.
    pub fn add_partition(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut partitions = self.partitions.write();
        let id = partitions.len();
        partitions.push(Arc::new(Partition::create(id, &self.path)));
        Ok(())
    }

    /// Upsert one entity document.
    ///
    /// The entity is removed from every partition first, then applied to
    /// the partition its id routes to; this stays correct when the
    /// partition count has grown since the entity was first indexed.
    pub fn write(&self, document: &EntityDocument, analyzer: &dyn crate::analysis::Analyzer) -> Result<()> {
        self.ensure_writable()?;
        let partitions = self.partitions.read();
        for partition in partitions.iter() {
            partition.remove(document.entity_id);
        }
        let slot = (document.entity_id % partitions.len() as u64) as usize;
        partitions[slot].apply(document, analyzer);
        Ok(())
    }

    /// Remove one entity's document from the index.
    pub fn remove(&self, entity_id: EntityId) -> Result<()> {
        self.ensure_writable()?;
        for partition in self.partitions.read().iter() {
            partition.remove(entity_id);
        }
        Ok(())
    }

    /// Acquire one searcher per partition for a query execution.
    pub fn searchers(&self) -> Result<Vec<PartitionSearcher>> {
        self.ensure_online()?;
        Ok(self.partitions.read().iter().map(|p| p.searcher()).collect())
    }

    /// Execute a ranked query against the committed index only.
    pub fn query(
        &self,
        fields: &[String],
        terms: &[String],
        skip: usize,
        limit: usize,
    ) -> Result<Vec<ScoreEntry>> {
        let searchers = self.searchers()?;
        Ok(search::execute_search(
            &searchers, None, None, fields, terms, skip, limit,
        ))
    }

    /// Persist every partition.
    pub fn flush(&self) -> Result<()> {
        self.ensure_writable()?;
        for partition in self.partitions.read().iter() {
            partition.flush()?;
        }
        Ok(())
    }

    /// Flush and close the index. Fails when searchers are outstanding.
    pub fn close(&self) -> Result<()> {
        if self.ensure_writable().is_ok() {
            self.flush()?;
        }
        for partition in self.partitions.read().iter() {
            partition.close()?;
        }
        Ok(())
    }

    /// Drop the index: terminal and irreversible. Removes every partition
    /// file and the index directory.
    pub fn drop_index(&self) -> Result<()> {
        {
            let partitions = self.partitions.read();
            let outstanding: usize = partitions.iter().map(|p| p.open_searchers()).sum();
            if outstanding > 0 {
                return Err(SorrelError::index(format!(
                    "cannot drop index '{}': {} searcher(s) still open",
                    self.name, outstanding
                )));
            }
        }
        *self.state.write() = IndexState::Dropped;
        for partition in self.partitions.read().iter() {
            partition.delete_files()?;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("dropped index '{}'", self.name);
        Ok(())
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

    fn fields() -> Vec<String> {
        vec!["body".to_string()]
    }

    #[test]
    fn test_writes_route_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = StandardAnalyzer::new();
        let index = PartitionedIndex::create("idx", dir.path(), 3).unwrap();
        index.set_online();

        for id in 0..9u64 {
            index.write(&doc(id, "shared corpus words"), &analyzer).unwrap();
        }
        assert_eq!(index.doc_count(), 9);
        assert_eq!(index.partition_count(), 3);

        let hits = index
            .query(&fields(), &["corpus".to_string()], 0, 100)
            .unwrap();
        assert_eq!(hits.len(), 9);
    }

    #[test]
    fn test_upsert_relocates_after_partition_growth() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = StandardAnalyzer::new();
        let index = PartitionedIndex::create("idx", dir.path(), 1).unwrap();
        index.set_online();

        index.write(&doc(5, "original text"), &analyzer).unwrap();
        index.add_partition().unwrap();
        index.write(&doc(5, "updated text"), &analyzer).unwrap();

        assert_eq!(index.doc_count(), 1);
        let hits = index
            .query(&fields(), &["updated".to_string()], 0, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        let stale = index
            .query(&fields(), &["original".to_string()], 0, 10)
            .unwrap();
        assert!(stale.is_empty());
    }

    #[test]
    fn test_failed_index_rejects_writes_and_queries() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = StandardAnalyzer::new();
        let index = PartitionedIndex::create("idx", dir.path(), 1).unwrap();
        index.set_online();

        index.mark_failed("boom");
        assert_eq!(index.population_failure().as_deref(), Some("boom"));

        assert!(index.write(&doc(1, "text"), &analyzer).is_err());
        assert!(index.query(&fields(), &["text".to_string()], 0, 10).is_err());

        // The first failure message wins.
        index.mark_failed("later");
        assert_eq!(index.population_failure().as_deref(), Some("boom"));

        // Drop remains available from the failed state.
        index.drop_index().unwrap();
        assert_eq!(index.state(), IndexState::Dropped);
    }

    #[test]
    fn test_flush_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = StandardAnalyzer::new();
        {
            let index = PartitionedIndex::create("idx", dir.path(), 2).unwrap();
            index.set_online();
            index.write(&doc(1, "durable data"), &analyzer).unwrap();
            index.write(&doc(2, "durable data"), &analyzer).unwrap();
            index.close().unwrap();
        }
        let reopened = PartitionedIndex::open("idx", dir.path()).unwrap();
        assert_eq!(reopened.state(), IndexState::Online);
        assert_eq!(reopened.partition_count(), 2);
        assert_eq!(reopened.doc_count(), 2);
    }
}
