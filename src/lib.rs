//! # Sorrel
//!
//! Transactional full-text indexing engine for graph data.
//!
//! Sorrel maintains inverted-index structures over node and relationship
//! property text, keeps them strictly or eventually consistent with the
//! primary store, and answers ranked free-text queries that also reflect
//! the uncommitted changes of the querying transaction.
//!
//! ## Features
//!
//! - Partitioned indexes with independently searchable, writable slices
//! - Bounded asynchronous update pipeline with an explicit drain for
//!   read-after-write on eventually consistent indexes
//! - Cross-partition statistics aggregation so scores are comparable
//!   across partitions and overlay readers
//! - Heap-based top-K collection and score-ordered streaming merges
//! - Per-transaction overlay readers for read-your-own-writes with stale
//!   hit suppression
//! - Pluggable text analyzers discovered through a registry

pub mod analysis;
pub mod codec;
pub mod collect;
pub mod config;
mod data;
mod error;
pub mod index;
pub mod merge;
pub mod overlay;
pub mod provider;
pub mod schema;
pub mod search;
pub mod sink;
pub mod stats;
pub mod txn;

// Re-exports for the public API
pub use analysis::{Analyzer, AnalyzerInfo, AnalyzerProvider, AnalyzerRegistry};
pub use codec::{DocumentBuffer, ENTITY_ID_FIELD, EntityDocument};
pub use collect::ScoreEntry;
pub use config::FulltextSettings;
pub use data::{EntityId, PropertyValue};
pub use error::{Result, SorrelError};
pub use index::{IndexState, PartitionedIndex};
pub use overlay::{OverlaySet, TransactionOverlay};
pub use provider::{FulltextIndex, FulltextIndexProvider};
pub use schema::{
    EntityType, FulltextConfig, IndexCapability, IndexDescriptor, TokenId,
};
pub use search::{QueryOptions, ScoredEntities};
pub use sink::{AsyncUpdateSink, IndexUpdate, IndexUpdater, SyncUpdateSink, UpdateSink};
pub use txn::{EntityModification, MemoryTransaction, Transaction, WriteSetVisitor};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
