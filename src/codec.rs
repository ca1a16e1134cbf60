//! Conversion between graph entities and engine-native documents.
//!
//! This module is the only place that knows the internal identifier field
//! convention: every document carries the owning entity's id twice, once as
//! an exact-match term and once as a numeric value, under the reserved
//! [`ENTITY_ID_FIELD`] name. Property values become indexed text fields;
//! values that are not text are silently skipped, because a full-text index
//! only supports text.

use crate::data::{EntityId, PropertyValue};
use crate::error::{Result, SorrelError};

/// Reserved field name holding the entity identifier inside documents.
/// Schema validation refuses to index a property with this name.
pub const ENTITY_ID_FIELD: &str = "__sorrel__internal__id__";

/// The engine-native representation of one entity's indexable state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDocument {
    /// Numeric form of the identifier field.
    pub entity_id: EntityId,
    /// Exact-match term form of the identifier field.
    pub id_term: String,
    /// One `(property name, text)` pair per non-null textual property.
    pub fields: Vec<(String, String)>,
}

impl EntityDocument {
    /// Extract the entity id back out of a document's identifier field.
    pub fn decode_entity_id(id_term: &str) -> Result<EntityId> {
        id_term.parse::<EntityId>().map_err(|_| {
            SorrelError::invalid_argument(format!(
                "document identifier term '{}' is not an entity id",
                id_term
            ))
        })
    }
}

/// Caller-owned scratch buffer for document assembly.
///
/// Reusing one buffer across a batch avoids re-allocating the field list per
/// entity. The field list is fully cleared before each encode, so no state
/// leaks between distinct entities.
#[derive(Debug, Default)]
pub struct DocumentBuffer {
    document: EntityDocument,
}

impl Default for EntityDocument {
    fn default() -> Self {
        EntityDocument {
            entity_id: 0,
            id_term: String::new(),
            fields: Vec::new(),
        }
    }
}

impl DocumentBuffer {
    pub fn new() -> Self {
        DocumentBuffer::default()
    }

    /// Encode one entity into the buffer and return the assembled document.
    ///
    /// `properties` and `values` are aligned: `values[i]` is the value of
    /// `properties[i]`, or `None` when the entity has no such property.
    pub fn encode(
        &mut self,
        entity_id: EntityId,
        properties: &[String],
        values: &[Option<PropertyValue>],
    ) -> &EntityDocument {
        let document = &mut self.document;
        document.fields.clear();
        document.entity_id = entity_id;
        document.id_term.clear();
        document.id_term.push_str(&entity_id.to_string());

        for (property, value) in properties.iter().zip(values) {
            if let Some(value) = value
                && let Some(text) = value.as_text()
            {
                document.fields.push((property.clone(), text.to_string()));
            }
        }
        &self.document
    }
}
