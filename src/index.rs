//! The partitioned inverted index.
//!
//! One logical index is an ordered, append-only set of partitions. Each
//! partition is independently searchable and writable, backed by the
//! [`memory::MemoryIndex`] primitive and persisted as a snapshot file in a
//! length-prefixed JSON record format. The same primitive also backs the
//! disposable per-transaction overlay indexes.

pub mod memory;
pub mod partition;
pub mod partitioned;

pub use memory::MemoryIndex;
pub use partition::{Partition, PartitionSearcher};
pub use partitioned::{IndexState, PartitionedIndex};
