//! Analyzer discovery by name.
//!
//! Analyzers are pluggable: each ships an [`AnalyzerProvider`] describing
//! itself and able to build instances. The registry keeps a lazily populated
//! name → provider cache. A cache miss triggers a full reload of every
//! discoverable provider (the built-in table plus anything registered at
//! runtime) followed by one retry; a name still missing after the reload is
//! a configuration error and is not retried further.

use std::sync::Arc;

use ahash::AHashMap;
use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::analysis::analyzer::{
    Analyzer, ENGLISH_STOP_WORDS, EnglishAnalyzer, KeywordAnalyzer, SimpleAnalyzer,
    StandardAnalyzer, StandardFoldingAnalyzer, WhitespaceAnalyzer,
};
use crate::error::{Result, SorrelError};

/// A named analyzer plugin.
pub trait AnalyzerProvider: Send + Sync {
    /// The name indexes refer to this analyzer by.
    fn name(&self) -> &str;

    /// Human-readable description, surfaced by the analyzer listing.
    fn description(&self) -> &str;

    /// The stop words this analyzer discards, empty when none.
    fn stop_words(&self) -> &[&str];

    /// Build an analyzer instance.
    fn build(&self) -> Result<Arc<dyn Analyzer>>;
}

struct BuiltinProvider {
    name: &'static str,
    description: &'static str,
    stop_words: &'static [&'static str],
    factory: fn() -> Arc<dyn Analyzer>,
}

impl AnalyzerProvider for BuiltinProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn stop_words(&self) -> &[&str] {
        self.stop_words
    }

    fn build(&self) -> Result<Arc<dyn Analyzer>> {
        Ok((self.factory)())
    }
}

lazy_static! {
    static ref BUILTIN_PROVIDERS: Vec<Arc<dyn AnalyzerProvider>> = vec![
        Arc::new(BuiltinProvider {
            name: "standard",
            description: "Unicode word segmentation, lowercased, with English stop words removed.",
            stop_words: ENGLISH_STOP_WORDS,
            factory: || Arc::new(StandardAnalyzer::new()),
        }),
        Arc::new(BuiltinProvider {
            name: "simple",
            description: "Alphabetic runs, lowercased. Keeps stop words.",
            stop_words: &[],
            factory: || Arc::new(SimpleAnalyzer::new()),
        }),
        Arc::new(BuiltinProvider {
            name: "whitespace",
            description: "Whitespace-separated tokens, kept verbatim.",
            stop_words: &[],
            factory: || Arc::new(WhitespaceAnalyzer::new()),
        }),
        Arc::new(BuiltinProvider {
            name: "keyword",
            description: "The entire input as one exact-match token.",
            stop_words: &[],
            factory: || Arc::new(KeywordAnalyzer::new()),
        }),
        Arc::new(BuiltinProvider {
            name: "standard-folding",
            description: "Standard analysis with Unicode accent folding.",
            stop_words: ENGLISH_STOP_WORDS,
            factory: || Arc::new(StandardFoldingAnalyzer::new()),
        }),
        Arc::new(BuiltinProvider {
            name: "english",
            description: "Standard analysis with light English suffix stripping.",
            stop_words: ENGLISH_STOP_WORDS,
            factory: || Arc::new(EnglishAnalyzer::new()),
        }),
    ];
}

/// Description of one available analyzer, for the listing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerInfo {
    pub name: String,
    pub description: String,
    pub stop_words: Vec<String>,
}

/// Thread-safe name → provider cache with reload-on-miss.
pub struct AnalyzerRegistry {
    registered: RwLock<Vec<Arc<dyn AnalyzerProvider>>>,
    cache: RwLock<AHashMap<String, Arc<dyn AnalyzerProvider>>>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        AnalyzerRegistry::new()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl AnalyzerRegistry {
    /// Create an empty registry. The cache fills on first use.
    pub fn new() -> Self {
        AnalyzerRegistry {
            registered: RwLock::new(Vec::new()),
            cache: RwLock::new(AHashMap::new()),
        }
    }

    /// Register an additional provider at runtime. Becomes visible on the
    /// next cache reload, i.e. the next miss.
    pub fn register(&self, provider: Arc<dyn AnalyzerProvider>) {
        self.registered.write().push(provider);
    }

    /// Rebuild the cache from every discoverable provider. Concurrent
    /// reloads race benignly: each writes a complete, consistent table.
    fn reload(&self) {
        let mut table = AHashMap::new();
        for provider in BUILTIN_PROVIDERS.iter() {
            table.insert(provider.name().to_string(), Arc::clone(provider));
        }
        for provider in self.registered.read().iter() {
            table.insert(provider.name().to_string(), Arc::clone(provider));
        }
        *self.cache.write() = table;
    }

    /// Look up a provider by name, reloading once on a miss.
    pub fn provider(&self, name: &str) -> Result<Arc<dyn AnalyzerProvider>> {
        if let Some(provider) = self.cache.read().get(name) {
            return Ok(Arc::clone(provider));
        }
        self.reload();
        self.cache.read().get(name).map(Arc::clone).ok_or_else(|| {
            SorrelError::config(format!("could not find full-text analyzer '{}'", name))
        })
    }

    /// Build an analyzer instance by name.
    pub fn analyzer(&self, name: &str) -> Result<Arc<dyn Analyzer>> {
        self.provider(name)?.build()
    }

    /// Every available analyzer with its description and stop words.
    pub fn list_available(&self) -> Vec<AnalyzerInfo> {
        self.reload();
        let cache = self.cache.read();
        let mut infos: Vec<AnalyzerInfo> = cache
            .values()
            .map(|provider| AnalyzerInfo {
                name: provider.name().to_string(),
                description: provider.description().to_string(),
                stop_words: provider.stop_words().iter().map(|s| s.to_string()).collect(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
