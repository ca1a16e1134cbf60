//! Index descriptors, capabilities, and persisted per-index settings.
//!
//! An [`IndexDescriptor`] identifies one logical index: entity type, token
//! filters, property list, and a [`FulltextConfig`] naming the analyzer and
//! consistency mode. The descriptor is immutable once the index is online
//! and is persisted inside the index directory, alongside a flat
//! `key=value` settings file that survives even when the owning schema
//! record is rebuilt. [`resolve_config`] re-reads the configuration from
//! the richest source available at the call site, falling back to that
//! settings file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::ENTITY_ID_FIELD;
use crate::error::{Result, SorrelError};

/// A label or relationship-type id, as resolved by the schema layer.
pub type TokenId = u32;

/// Settings key naming the index's analyzer.
pub const SETTING_ANALYZER: &str = "fulltext.analyzer";
/// Settings key holding the index's consistency mode.
pub const SETTING_EVENTUALLY_CONSISTENT: &str = "fulltext.eventually_consistent";

/// Settings file inside each index directory, written when population
/// completes and read back at index open.
const SETTINGS_FILE: &str = "fulltext-index.properties";

/// Which kind of entity an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Node,
    Relationship,
}

/// Per-index full-text configuration, attached to every descriptor from
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulltextConfig {
    /// Name of the analyzer, resolved through the registry.
    pub analyzer: String,
    /// Whether updates are applied asynchronously through the update sink.
    pub eventually_consistent: bool,
}

/// Identity of one logical full-text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub entity_type: EntityType,
    /// Label or relationship-type filters; an entity carrying any of them
    /// belongs to the index.
    pub tokens: Vec<TokenId>,
    /// Ordered list of indexed property names.
    pub properties: Vec<String>,
    pub config: FulltextConfig,
}

impl IndexDescriptor {
    /// Build and validate a descriptor.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        tokens: Vec<TokenId>,
        properties: Vec<String>,
        config: FulltextConfig,
    ) -> Result<Self> {
        let descriptor = IndexDescriptor {
            name: name.into(),
            entity_type,
            tokens,
            properties,
            config,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check the descriptor invariants: token and property lists are
    /// non-empty and the reserved identifier field is not indexed.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(SorrelError::schema(format!(
                "full-text index '{}' must cover at least one label or relationship type",
                self.name
            )));
        }
        if self.properties.is_empty() {
            return Err(SorrelError::schema(format!(
                "full-text index '{}' must index at least one property",
                self.name
            )));
        }
        if self.properties.iter().any(|p| p == ENTITY_ID_FIELD) {
            return Err(SorrelError::schema(format!(
                "property name '{}' is reserved for internal use",
                ENTITY_ID_FIELD
            )));
        }
        Ok(())
    }

    /// Whether an entity with the given token set belongs to this index.
    pub fn matches_tokens(&self, tokens: &[TokenId]) -> bool {
        tokens.iter().any(|token| self.tokens.contains(token))
    }

    /// The index's capability, as reported to the schema layer.
    pub fn capability(&self) -> IndexCapability {
        IndexCapability {
            supports_ordering: false,
            supports_value_return: false,
            eventually_consistent: self.config.eventually_consistent,
        }
    }
}

/// What an index can and cannot do, consumed by the query planner.
/// Relevance indexes return ranked ids only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCapability {
    pub supports_ordering: bool,
    pub supports_value_return: bool,
    pub eventually_consistent: bool,
}

/// Persist an index's settings as flat `key=value` lines.
pub fn write_index_settings(dir: &Path, config: &FulltextConfig) -> Result<()> {
    let contents = format!(
        "{}={}\n{}={}\n",
        SETTING_ANALYZER, config.analyzer, SETTING_EVENTUALLY_CONSISTENT, config.eventually_consistent
    );
    fs::write(dir.join(SETTINGS_FILE), contents)?;
    Ok(())
}

/// Read an index's settings file back into a [`FulltextConfig`].
///
/// Unrecognized keys and comment lines are skipped, so the file stays
/// readable when later versions add informational keys.
pub fn read_index_settings(dir: &Path) -> Result<FulltextConfig> {
    let path = dir.join(SETTINGS_FILE);
    let contents = fs::read_to_string(&path)?;
    let mut analyzer: Option<String> = None;
    let mut eventually_consistent: Option<bool> = None;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            SETTING_ANALYZER => analyzer = Some(value.trim().to_string()),
            SETTING_EVENTUALLY_CONSISTENT => {
                let value = value.trim();
                eventually_consistent = Some(value.parse::<bool>().map_err(|_| {
                    SorrelError::config(format!(
                        "invalid boolean '{}' for {} in {}",
                        value,
                        SETTING_EVENTUALLY_CONSISTENT,
                        path.display()
                    ))
                })?);
            }
            _ => {}
        }
    }
    let analyzer = analyzer.ok_or_else(|| {
        SorrelError::config(format!("{} is missing {}", path.display(), SETTING_ANALYZER))
    })?;
    let eventually_consistent = eventually_consistent.ok_or_else(|| {
        SorrelError::config(format!(
            "{} is missing {}",
            path.display(),
            SETTING_EVENTUALLY_CONSISTENT
        ))
    })?;
    Ok(FulltextConfig {
        analyzer,
        eventually_consistent,
    })
}

/// Resolve an index's configuration from the richest source available.
///
/// At different lifecycle points different amounts of context exist:
/// during creation the descriptor carries the configuration, while the
/// index is open its accessor does, and during recovery only the persisted
/// settings file remains. Sources are tried in that order; the first one
/// present wins.
pub fn resolve_config(
    descriptor: Option<&FulltextConfig>,
    accessor: Option<&FulltextConfig>,
    dir: Option<&Path>,
) -> Result<FulltextConfig> {
    if let Some(config) = descriptor.or(accessor) {
        return Ok(config.clone());
    }
    if let Some(dir) = dir {
        return read_index_settings(dir);
    }
    Err(SorrelError::config(
        "no source available to resolve the index configuration",
    ))
}
