use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::sentence::Word;
use super::target::{parse_alignment, TableError, TargetPhrase};

/// Candidate supply for phrase-based decoding.
pub trait PhraseSource: Send + Sync {
    /// Target phrases for a source span, in any order.
    fn lookup(&self, source: &[Word]) -> Vec<Arc<TargetPhrase>>;

    /// Number of translation scores on every target phrase.
    fn num_scores(&self) -> usize;

    /// Longest source side.
    fn max_source_len(&self) -> usize;

    fn cleanup_after_sentence(&self, _sentence_id: u64) {}
}

/// One line of a phrase table.
#[derive(Debug, Clone, Deserialize)]
pub struct PhraseEntry {
    pub source: String,
    pub target: String,
    pub scores: Vec<f32>,
    #[serde(default)]
    pub alignment: Option<String>,
}

impl PhraseEntry {
    pub fn new(source: &str, target: &str, scores: &[f32]) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            scores: scores.to_vec(),
            alignment: None,
        }
    }
}

/// In-memory phrase table keyed by source words.
#[derive(Debug, Default)]
pub struct PhraseTable {
    entries: HashMap<Vec<Word>, Vec<Arc<TargetPhrase>>>,
    num_scores: usize,
    max_source_len: usize,
}

impl PhraseTable {
    /// Builds the table; every entry must carry the same number of scores.
    pub fn from_entries(entries: impl IntoIterator<Item = PhraseEntry>) -> Result<Self, TableError> {
        let mut table = PhraseTable::default();
        let mut expected: Option<usize> = None;
        for entry in entries {
            let source: Vec<Word> = entry.source.split_whitespace().map(Word::from).collect();
            if source.is_empty() {
                return Err(TableError::EmptySource);
            }
            let n = *expected.get_or_insert(entry.scores.len());
            if entry.scores.len() != n {
                return Err(TableError::ScoreCount {
                    phrase: entry.source,
                    expected: n,
                    found: entry.scores.len(),
                });
            }
            let alignment = match &entry.alignment {
                Some(a) => parse_alignment(a)?,
                None => Vec::new(),
            };
            let target = TargetPhrase::from_words(entry.target.split_whitespace(), entry.scores)
                .with_alignment(alignment);
            table.max_source_len = table.max_source_len.max(source.len());
            table
                .entries
                .entry(source)
                .or_default()
                .push(Arc::new(target));
        }
        table.num_scores = expected.unwrap_or(0);
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PhraseSource for PhraseTable {
    fn lookup(&self, source: &[Word]) -> Vec<Arc<TargetPhrase>> {
        self.entries.get(source).cloned().unwrap_or_default()
    }

    fn num_scores(&self) -> usize {
        self.num_scores
    }

    fn max_source_len(&self) -> usize {
        self.max_source_len
    }
}
