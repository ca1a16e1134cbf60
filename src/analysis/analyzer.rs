//! Built-in analyzers.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::UnicodeSegmentation;

/// English stop words dropped by the standard analyzer family.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A tokenizer/filter chain applied to property text and query strings.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Break `text` into index terms.
    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Unicode word segmentation, lowercasing, English stop-word removal.
#[derive(Debug, Default)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(|word| word.to_lowercase())
            .filter(|term| !ENGLISH_STOP_WORDS.contains(&term.as_str()))
            .collect()
    }
}

/// Alphabetic runs, lowercased. No stop-word removal.
#[derive(Debug, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    pub fn new() -> Self {
        SimpleAnalyzer
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphabetic())
            .filter(|run| !run.is_empty())
            .map(|run| run.to_lowercase())
            .collect()
    }
}

/// Whitespace-separated tokens, kept verbatim.
#[derive(Debug, Default)]
pub struct WhitespaceAnalyzer;

impl WhitespaceAnalyzer {
    pub fn new() -> Self {
        WhitespaceAnalyzer
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }
}

/// The whole input as a single exact-match token.
#[derive(Debug, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        }
    }
}

/// Standard analysis plus accent folding: terms are decomposed (NFD) and
/// combining marks stripped, so "résumé" and "resume" index identically.
#[derive(Debug, Default)]
pub struct StandardFoldingAnalyzer {
    inner: StandardAnalyzer,
}

impl StandardFoldingAnalyzer {
    pub fn new() -> Self {
        StandardFoldingAnalyzer::default()
    }

    fn fold(term: &str) -> String {
        term.nfd().filter(|c| !is_combining_mark(*c)).collect()
    }
}

impl Analyzer for StandardFoldingAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        self.inner
            .analyze(text)
            .iter()
            .map(|term| Self::fold(term))
            .collect()
    }
}

/// Standard analysis plus light English suffix stripping.
#[derive(Debug, Default)]
pub struct EnglishAnalyzer {
    inner: StandardAnalyzer,
}

impl EnglishAnalyzer {
    pub fn new() -> Self {
        EnglishAnalyzer::default()
    }

    // Minimal S-stemmer; enough to conflate regular plurals without a
    // dictionary.
    fn stem(term: &str) -> String {
        if term.len() > 3 {
            if let Some(base) = term.strip_suffix("ies") {
                return format!("{}y", base);
            }
            if let Some(base) = term.strip_suffix("es")
                && base.len() > 2
            {
                return base.to_string();
            }
            if let Some(base) = term.strip_suffix('s')
                && !base.ends_with('s')
            {
                return base.to_string();
            }
        }
        term.to_string()
    }
}

impl Analyzer for EnglishAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        self.inner
            .analyze(text)
            .iter()
            .map(|term| Self::stem(term))
            .collect()
    }
}
