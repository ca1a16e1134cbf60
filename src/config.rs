//! Engine-wide settings.
//!
//! [`FulltextSettings`] carries the defaults new indexes inherit (analyzer
//! and consistency mode) and the queue depth bound of the asynchronous
//! update sink. Per-index choices live in the index's own
//! [`FulltextConfig`](crate::schema::FulltextConfig) and override these.

use crate::error::{Result, SorrelError};

/// Smallest accepted update queue depth.
pub const MIN_QUEUE_DEPTH: usize = 1;
/// Largest accepted update queue depth.
pub const MAX_QUEUE_DEPTH: usize = 50_000_000;

const DEFAULT_ANALYZER: &str = "standard";
const DEFAULT_QUEUE_DEPTH: usize = 10_000;

/// Settings shared by every index a provider owns.
#[derive(Debug, Clone)]
pub struct FulltextSettings {
    /// Analyzer used by indexes that do not name one.
    pub default_analyzer: String,
    /// Consistency mode used by indexes that do not choose one.
    pub eventually_consistent: bool,
    /// Bound on outstanding updates in the asynchronous sink.
    pub queue_depth: usize,
}

impl Default for FulltextSettings {
    fn default() -> Self {
        FulltextSettings {
            default_analyzer: DEFAULT_ANALYZER.to_string(),
            eventually_consistent: false,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl FulltextSettings {
    pub fn builder() -> FulltextSettingsBuilder {
        FulltextSettingsBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct FulltextSettingsBuilder {
    default_analyzer: Option<String>,
    eventually_consistent: Option<bool>,
    queue_depth: Option<usize>,
}

impl FulltextSettingsBuilder {
    pub fn default_analyzer(mut self, name: impl Into<String>) -> Self {
        self.default_analyzer = Some(name.into());
        self
    }

    pub fn eventually_consistent(mut self, eventually_consistent: bool) -> Self {
        self.eventually_consistent = Some(eventually_consistent);
        self
    }

    pub fn queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = Some(queue_depth);
        self
    }

    pub fn build(self) -> Result<FulltextSettings> {
        let defaults = FulltextSettings::default();
        let queue_depth = self.queue_depth.unwrap_or(defaults.queue_depth);
        if !(MIN_QUEUE_DEPTH..=MAX_QUEUE_DEPTH).contains(&queue_depth) {
            return Err(SorrelError::config(format!(
                "update queue depth {} is outside [{}, {}]",
                queue_depth, MIN_QUEUE_DEPTH, MAX_QUEUE_DEPTH
            )));
        }
        Ok(FulltextSettings {
            default_analyzer: self
                .default_analyzer
                .unwrap_or(defaults.default_analyzer),
            eventually_consistent: self
                .eventually_consistent
                .unwrap_or(defaults.eventually_consistent),
            queue_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict_with_standard_analyzer() {
        let settings = FulltextSettings::default();
        assert_eq!(settings.default_analyzer, "standard");
        assert!(!settings.eventually_consistent);
        assert_eq!(settings.queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let settings = FulltextSettings::builder()
            .default_analyzer("english")
            .eventually_consistent(true)
            .queue_depth(64)
            .build()
            .unwrap();
        assert_eq!(settings.default_analyzer, "english");
        assert!(settings.eventually_consistent);
        assert_eq!(settings.queue_depth, 64);
    }

    #[test]
    fn test_queue_depth_range_is_enforced() {
        assert!(FulltextSettings::builder().queue_depth(0).build().is_err());
        assert!(
            FulltextSettings::builder()
                .queue_depth(MAX_QUEUE_DEPTH + 1)
                .build()
                .is_err()
        );
        assert!(
            FulltextSettings::builder()
                .queue_depth(MIN_QUEUE_DEPTH)
                .build()
                .is_ok()
        );
        assert!(
            FulltextSettings::builder()
                .queue_depth(MAX_QUEUE_DEPTH)
                .build()
                .is_ok()
        );
    }
}
