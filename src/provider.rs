//! The full-text index provider.
//!
//! Orchestrates the life of every full-text index: schema validation into a
//! persisted descriptor, creation and population, opening after restart,
//! capability reporting, update routing through the consistency-appropriate
//! sink, and query dispatch to either the committed index or the calling
//! transaction's overlay reader.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::analysis::{Analyzer, AnalyzerInfo, AnalyzerRegistry};
use crate::codec::DocumentBuffer;
use crate::config::FulltextSettings;
use crate::data::{EntityId, PropertyValue};
use crate::error::{Result, SorrelError};
use crate::index::partitioned::PartitionedIndex;
use crate::overlay::OverlaySet;
use crate::schema::{
    self, EntityType, FulltextConfig, IndexCapability, IndexDescriptor, TokenId,
    SETTING_ANALYZER, SETTING_EVENTUALLY_CONSISTENT,
};
use crate::search::{QueryOptions, ScoredEntities};
use crate::sink::{AsyncUpdateSink, IndexUpdate, IndexUpdater, SyncUpdateSink, UpdateSink};
use crate::txn::{EntityModification, Transaction};

/// File holding the persisted descriptor inside each index directory.
const DESCRIPTOR_FILE: &str = "descriptor.json";
/// Partitions a new index starts with. The set can only grow afterwards.
const INITIAL_PARTITIONS: usize = 1;

/// One open full-text index: descriptor, analyzer instance, and the
/// partitioned index holding its data.
pub struct FulltextIndex {
    descriptor: Arc<IndexDescriptor>,
    analyzer: Arc<dyn Analyzer>,
    index: Arc<PartitionedIndex>,
}

impl std::fmt::Debug for FulltextIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulltextIndex")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl FulltextIndex {
    pub fn descriptor(&self) -> &Arc<IndexDescriptor> {
        &self.descriptor
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    pub fn partitioned(&self) -> &Arc<PartitionedIndex> {
        &self.index
    }

    fn updater(&self) -> IndexUpdater {
        IndexUpdater::new(Arc::clone(&self.index), Arc::clone(&self.analyzer))
    }
}

/// Creates, opens, updates, and queries full-text indexes.
pub struct FulltextIndexProvider {
    settings: FulltextSettings,
    registry: Arc<AnalyzerRegistry>,
    root: PathBuf,
    indexes: RwLock<AHashMap<String, Arc<FulltextIndex>>>,
    async_sink: Arc<AsyncUpdateSink>,
    sync_sink: Arc<SyncUpdateSink>,
}

impl std::fmt::Debug for FulltextIndexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FulltextIndexProvider")
            .field("root", &self.root)
            .field("indexes", &self.indexes.read().len())
            .finish()
    }
}

impl FulltextIndexProvider {
    /// Create a provider rooted at `root`. Index directories live directly
    /// underneath it.
    pub fn new(root: &Path, settings: FulltextSettings) -> Result<Self> {
        fs::create_dir_all(root)?;
        let queue_depth = settings.queue_depth;
        Ok(FulltextIndexProvider {
            settings,
            registry: Arc::new(AnalyzerRegistry::new()),
            root: root.to_path_buf(),
            indexes: RwLock::new(AHashMap::new()),
            async_sink: Arc::new(AsyncUpdateSink::new(queue_depth)),
            sync_sink: Arc::new(SyncUpdateSink::new()),
        })
    }

    pub fn registry(&self) -> &Arc<AnalyzerRegistry> {
        &self.registry
    }

    /// Every analyzer available for index configuration.
    pub fn list_available_analyzers(&self) -> Vec<AnalyzerInfo> {
        self.registry.list_available()
    }

    /// Validate a schema request into a descriptor.
    ///
    /// `config` is the free-form per-index configuration map; recognized
    /// keys are the analyzer name and the consistency mode, everything else
    /// is rejected as unknown.
    pub fn schema_for(
        &self,
        name: &str,
        entity_type: EntityType,
        tokens: Vec<TokenId>,
        config: &HashMap<String, String>,
        properties: Vec<String>,
    ) -> Result<IndexDescriptor> {
        for key in config.keys() {
            if key != SETTING_ANALYZER && key != SETTING_EVENTUALLY_CONSISTENT {
                return Err(SorrelError::schema(format!(
                    "unknown full-text index configuration key '{}'",
                    key
                )));
            }
        }
        let analyzer = config
            .get(SETTING_ANALYZER)
            .cloned()
            .unwrap_or_else(|| self.settings.default_analyzer.clone());
        let eventually_consistent = match config.get(SETTING_EVENTUALLY_CONSISTENT) {
            Some(value) => value.parse::<bool>().map_err(|_| {
                SorrelError::config(format!(
                    "invalid boolean '{}' for {}",
                    value, SETTING_EVENTUALLY_CONSISTENT
                ))
            })?,
            None => self.settings.eventually_consistent,
        };
        // An unknown analyzer must fail before the index reaches a created
        // state.
        self.registry.provider(&analyzer)?;
        IndexDescriptor::new(
            name,
            entity_type,
            tokens,
            properties,
            FulltextConfig {
                analyzer,
                eventually_consistent,
            },
        )
    }

    fn index_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// The open index entry for `name`.
    pub fn index(&self, name: &str) -> Result<Arc<FulltextIndex>> {
        self.indexes.read().get(name).map(Arc::clone).ok_or_else(|| {
            SorrelError::index(format!("no such full-text index: '{}'", name))
        })
    }

    fn sink_for(&self, descriptor: &IndexDescriptor) -> Arc<dyn UpdateSink> {
        if descriptor.config.eventually_consistent {
            Arc::clone(&self.async_sink) as Arc<dyn UpdateSink>
        } else {
            Arc::clone(&self.sync_sink) as Arc<dyn UpdateSink>
        }
    }

    /// Create an index for a validated descriptor. The index starts
    /// populating; it goes online when [`populate`](Self::populate)
    /// completes.
    pub fn create_index(&self, descriptor: IndexDescriptor) -> Result<()> {
        descriptor.validate()?;
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&descriptor.name) {
            return Err(SorrelError::schema(format!(
                "full-text index '{}' already exists",
                descriptor.name
            )));
        }
        let dir = self.index_dir(&descriptor.name);
        if dir.exists() {
            return Err(SorrelError::schema(format!(
                "index directory for '{}' already exists",
                descriptor.name
            )));
        }
        let analyzer = self.registry.analyzer(&descriptor.config.analyzer)?;
        let index = PartitionedIndex::create(&descriptor.name, &dir, INITIAL_PARTITIONS)?;
        fs::write(dir.join(DESCRIPTOR_FILE), serde_json::to_vec_pretty(&descriptor)?)?;
        debug!("created full-text index '{}'", descriptor.name);
        indexes.insert(
            descriptor.name.clone(),
            Arc::new(FulltextIndex {
                descriptor: Arc::new(descriptor),
                analyzer,
                index,
            }),
        );
        Ok(())
    }

    /// Build the index's initial content from a scan of existing entities
    /// and bring it online. Any failure leaves the index in the terminal
    /// failed state, carrying the causing message.
    pub fn populate<I>(&self, name: &str, source: I) -> Result<()>
    where
        I: IntoIterator<Item = (EntityId, Vec<(String, PropertyValue)>)>,
    {
        let entry = self.index(name)?;
        let entities: Vec<(EntityId, Vec<(String, PropertyValue)>)> =
            source.into_iter().collect();

        let population = entities.par_iter().try_for_each_init(
            DocumentBuffer::new,
            |buffer, (entity_id, properties)| {
                let values = align_values(&entry.descriptor.properties, properties);
                let document = buffer.encode(*entity_id, &entry.descriptor.properties, &values);
                entry.index.write(document, entry.analyzer.as_ref())
            },
        );
        if let Err(e) = population {
            entry.index.mark_failed(e.to_string());
            return Err(SorrelError::index(format!(
                "population of index '{}' failed: {}",
                name, e
            )));
        }

        schema::write_index_settings(&self.index_dir(name), &entry.descriptor.config)?;
        entry.index.flush()?;
        entry.index.set_online();
        debug!(
            "populated full-text index '{}' with {} entities",
            name,
            entities.len()
        );
        Ok(())
    }

    /// Open a previously created index from disk, using the persisted
    /// settings file as the configuration source.
    pub fn open_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(name) {
            return Ok(());
        }
        let dir = self.index_dir(name);
        let raw = fs::read(dir.join(DESCRIPTOR_FILE))?;
        let mut descriptor: IndexDescriptor = serde_json::from_slice(&raw)?;
        descriptor.config = schema::resolve_config(None, None, Some(&dir))?;
        descriptor.validate()?;

        let analyzer = self.registry.analyzer(&descriptor.config.analyzer)?;
        let index = PartitionedIndex::open(name, &dir)?;
        debug!("opened full-text index '{}'", name);
        indexes.insert(
            name.to_string(),
            Arc::new(FulltextIndex {
                descriptor: Arc::new(descriptor),
                analyzer,
                index,
            }),
        );
        Ok(())
    }

    /// Drop an index: terminal and irreversible.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let removed = self.indexes.write().remove(name);
        match removed {
            Some(entry) => entry.index.drop_index(),
            None => {
                let dir = self.index_dir(name);
                if !dir.exists() {
                    return Err(SorrelError::index(format!(
                        "no such full-text index: '{}'",
                        name
                    )));
                }
                fs::remove_dir_all(dir)?;
                Ok(())
            }
        }
    }

    /// Report the index's capability, resolving the configuration from the
    /// richest available source: the open index, falling back to the
    /// persisted settings on disk.
    pub fn capability(&self, name: &str) -> Result<IndexCapability> {
        if let Ok(entry) = self.index(name) {
            return Ok(entry.descriptor.capability());
        }
        let config = schema::resolve_config(None, None, Some(&self.index_dir(name)))?;
        Ok(IndexCapability {
            supports_ordering: false,
            supports_value_return: false,
            eventually_consistent: config.eventually_consistent,
        })
    }

    /// The failure message of a failed index, `None` while healthy.
    pub fn population_failure(&self, name: &str) -> Result<Option<String>> {
        Ok(self.index(name)?.index.population_failure())
    }

    /// Apply a committing transaction's write-set to every index it
    /// touches, routing through the sink chosen by each index's
    /// consistency mode. Updates are emitted in write-set order per index;
    /// no ordering holds across concurrently committing transactions.
    pub fn apply_transaction(&self, txn: &dyn Transaction) -> Result<()> {
        let indexes: Vec<Arc<FulltextIndex>> =
            self.indexes.read().values().map(Arc::clone).collect();
        for entry in indexes {
            let descriptor = &entry.descriptor;
            let mut buffer = DocumentBuffer::new();
            let mut updates: Vec<IndexUpdate> = Vec::new();
            txn.visit_write_set(descriptor.entity_type, &mut |m: &EntityModification| {
                if m.removed || !descriptor.matches_tokens(&m.tokens) {
                    updates.push(IndexUpdate::Remove(m.entity_id));
                    return Ok(());
                }
                let values: Vec<Option<PropertyValue>> = descriptor
                    .properties
                    .iter()
                    .map(|property| {
                        txn.property_value(descriptor.entity_type, m.entity_id, property)
                    })
                    .collect();
                let document = buffer.encode(m.entity_id, &descriptor.properties, &values);
                updates.push(IndexUpdate::Upsert(document.clone()));
                Ok(())
            })?;

            let sink = self.sink_for(descriptor);
            let updater = entry.updater();
            for update in updates {
                sink.enqueue(&updater, update)?;
            }
        }
        Ok(())
    }

    /// Execute a ranked free-text query.
    ///
    /// When the calling transaction has uncommitted changes and the index
    /// is not eventually consistent, the query goes through the
    /// transaction's overlay so its own writes are visible; otherwise it
    /// reads the committed index directly.
    pub fn query(
        &self,
        txn: &dyn Transaction,
        overlays: &mut OverlaySet,
        name: &str,
        query_text: &str,
    ) -> Result<ScoredEntities> {
        self.query_with(txn, overlays, name, query_text, QueryOptions::default())
    }

    /// [`query`](Self::query) with an explicit skip/limit constraint.
    pub fn query_with(
        &self,
        txn: &dyn Transaction,
        overlays: &mut OverlaySet,
        name: &str,
        query_text: &str,
        options: QueryOptions,
    ) -> Result<ScoredEntities> {
        let entry = self.index(name)?;
        let descriptor = &entry.descriptor;
        let terms = entry.analyzer.analyze(query_text);

        let use_overlay =
            txn.has_uncommitted_changes() && !descriptor.config.eventually_consistent;
        let hits = if use_overlay {
            overlays
                .overlay_for(descriptor, &entry.analyzer)
                .query(txn, &entry.index, &terms, options)?
        } else {
            entry
                .index
                .query(&descriptor.properties, &terms, options.skip, options.limit)?
        };
        Ok(ScoredEntities::new(hits))
    }

    /// Exact-match lookups are not applicable to a relevance index.
    pub fn query_exact(&self, name: &str, _property: &str, _value: &PropertyValue) -> Result<ScoredEntities> {
        self.index(name)?;
        Err(SorrelError::unsupported(
            "exact-match queries are not applicable to a full-text relevance index",
        ))
    }

    /// Ordered scans are not applicable to a relevance index.
    pub fn query_ordered(&self, name: &str, _property: &str) -> Result<ScoredEntities> {
        self.index(name)?;
        Err(SorrelError::unsupported(
            "ordered queries are not applicable to a full-text relevance index",
        ))
    }

    /// Distinct-value scans are not applicable to a relevance index.
    pub fn query_distinct_values(&self, name: &str, _property: &str) -> Result<ScoredEntities> {
        self.index(name)?;
        Err(SorrelError::unsupported(
            "distinct-value queries are not applicable to a full-text relevance index",
        ))
    }

    /// Block until every update scheduled so far has been applied. The only
    /// read-after-write guarantee for eventually consistent indexes.
    pub fn await_refresh(&self) {
        self.async_sink.await_drain();
    }

    /// Flush writer state of every eventually consistent index through the
    /// sink, then flush and close all open indexes.
    pub fn shutdown(&self) -> Result<()> {
        let indexes: Vec<Arc<FulltextIndex>> =
            self.indexes.read().values().map(Arc::clone).collect();
        for entry in &indexes {
            if entry.descriptor.config.eventually_consistent {
                self.async_sink.close_writer(&entry.updater())?;
            }
        }
        self.async_sink.await_drain();
        self.async_sink.shutdown();
        for entry in &indexes {
            entry.index.close()?;
        }
        self.indexes.write().clear();
        Ok(())
    }
}

fn align_values(
    properties: &[String],
    provided: &[(String, PropertyValue)],
) -> Vec<Option<PropertyValue>> {
    properties
        .iter()
        .map(|property| {
            provided
                .iter()
                .find(|(name, _)| name == property)
                .map(|(_, value)| value.clone())
        })
        .collect()
}
