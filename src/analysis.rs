//! Text analysis for full-text indexing and querying.
//!
//! The analysis pipeline turns property text into index terms:
//!
//! ```text
//! Text → Tokenizer → Token Filters → Terms
//! ```
//!
//! The same analyzer instance is used at index time and at query time, so
//! that query terms meet the terms the index actually contains. Analyzers
//! are discovered by name through the [`registry::AnalyzerRegistry`].

pub mod analyzer;
pub mod registry;

// Re-exports
pub use analyzer::{
    Analyzer, EnglishAnalyzer, KeywordAnalyzer, SimpleAnalyzer, StandardAnalyzer,
    StandardFoldingAnalyzer, WhitespaceAnalyzer,
};
pub use registry::{AnalyzerInfo, AnalyzerProvider, AnalyzerRegistry};
