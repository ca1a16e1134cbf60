//! Boundary contracts towards the storage and transaction layer.
//!
//! The engine never talks to the record store directly. A committing or
//! querying transaction is represented by the [`Transaction`] trait, which
//! exposes exactly what the full-text core needs: a write-set revision
//! counter, a visitor-based iteration over the entities the transaction has
//! touched, and a read view that already reflects in-transaction edits.
//!
//! [`MemoryTransaction`] is a self-contained in-memory implementation used
//! by hosts without a storage engine and by this crate's tests.

use ahash::AHashMap;

use crate::data::{EntityId, PropertyValue};
use crate::error::Result;
use crate::schema::{EntityType, TokenId};

/// One entity touched by a transaction.
#[derive(Debug, Clone)]
pub struct EntityModification {
    pub entity_id: EntityId,
    pub entity_type: EntityType,
    /// The entity's token set *after* the transaction's changes.
    pub tokens: Vec<TokenId>,
    /// True when the entity was deleted in this transaction.
    pub removed: bool,
}

/// Visitor over a transaction's write-set.
pub trait WriteSetVisitor {
    fn visit(&mut self, modification: &EntityModification) -> Result<()>;
}

impl<F> WriteSetVisitor for F
where
    F: FnMut(&EntityModification) -> Result<()>,
{
    fn visit(&mut self, modification: &EntityModification) -> Result<()> {
        self(modification)
    }
}

/// The slice of a transaction the full-text core consumes.
pub trait Transaction {
    /// Revision counter of the transaction's write-set. Advances whenever
    /// the write-set changes; equality means "nothing new to index".
    fn revision(&self) -> u64;

    /// Whether the transaction has any uncommitted data changes.
    fn has_uncommitted_changes(&self) -> bool;

    /// Visit every entity of the given kind that this transaction created,
    /// modified, or removed. Always iterates the *entire current* write-set,
    /// not a delta.
    fn visit_write_set(
        &self,
        entity_type: EntityType,
        visitor: &mut dyn WriteSetVisitor,
    ) -> Result<()>;

    /// Current value of a property as seen by this transaction, reflecting
    /// its own uncommitted edits. `None` when absent.
    fn property_value(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        property: &str,
    ) -> Option<PropertyValue>;
}

#[derive(Debug, Clone, Default)]
struct EntityState {
    tokens: Vec<TokenId>,
    properties: AHashMap<String, PropertyValue>,
    removed: bool,
}

/// In-memory [`Transaction`] implementation.
///
/// Every mutation advances the revision counter, mirroring how the kernel's
/// transaction state invalidates cached index readers.
#[derive(Debug, Default)]
pub struct MemoryTransaction {
    revision: u64,
    entities: AHashMap<(EntityType, EntityId), EntityState>,
}

impl MemoryTransaction {
    pub fn new() -> Self {
        MemoryTransaction::default()
    }

    /// Create or replace an entity with the given tokens and properties.
    pub fn put_entity(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        tokens: Vec<TokenId>,
        properties: Vec<(String, PropertyValue)>,
    ) {
        let state = EntityState {
            tokens,
            properties: properties.into_iter().collect(),
            removed: false,
        };
        self.entities.insert((entity_type, entity_id), state);
        self.revision += 1;
    }

    /// Set one property on an already-tracked entity.
    pub fn set_property(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        property: &str,
        value: PropertyValue,
    ) {
        let state = self.entities.entry((entity_type, entity_id)).or_default();
        state.properties.insert(property.to_string(), value);
        self.revision += 1;
    }

    /// Replace the token set of an already-tracked entity. Removing the
    /// last matching token takes the entity out of any index that filtered
    /// on it, while keeping the modification visible to overlays.
    pub fn set_tokens(&mut self, entity_type: EntityType, entity_id: EntityId, tokens: Vec<TokenId>) {
        let state = self.entities.entry((entity_type, entity_id)).or_default();
        state.tokens = tokens;
        self.revision += 1;
    }

    /// Delete an entity in this transaction.
    pub fn delete_entity(&mut self, entity_type: EntityType, entity_id: EntityId) {
        let state = self.entities.entry((entity_type, entity_id)).or_default();
        state.removed = true;
        state.properties.clear();
        self.revision += 1;
    }
}

impl Transaction for MemoryTransaction {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn has_uncommitted_changes(&self) -> bool {
        !self.entities.is_empty()
    }

    fn visit_write_set(
        &self,
        entity_type: EntityType,
        visitor: &mut dyn WriteSetVisitor,
    ) -> Result<()> {
        for ((kind, entity_id), state) in &self.entities {
            if *kind != entity_type {
                continue;
            }
            let modification = EntityModification {
                entity_id: *entity_id,
                entity_type: *kind,
                tokens: state.tokens.clone(),
                removed: state.removed,
            };
            visitor.visit(&modification)?;
        }
        Ok(())
    }

    fn property_value(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        property: &str,
    ) -> Option<PropertyValue> {
        self.entities
            .get(&(entity_type, entity_id))
            .filter(|state| !state.removed)
            .and_then(|state| state.properties.get(property))
            .cloned()
    }
}
