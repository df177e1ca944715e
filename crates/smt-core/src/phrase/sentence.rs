use std::sync::Arc;

use crate::coverage::{Coverage, Range};

pub type Word = Arc<str>;

/// A tokenized source sentence with its reordering walls.
///
/// A wall at boundary `b` (between positions `b - 1` and `b`) requires every
/// position before `b` to be translated before any position at or after it.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub id: u64,
    words: Vec<Word>,
    walls: Vec<usize>,
}

impl Sentence {
    pub fn new(id: u64, text: &str) -> Self {
        Self::from_words(id, text.split_whitespace().map(Word::from).collect())
    }

    pub fn from_words(id: u64, words: Vec<Word>) -> Self {
        Self {
            id,
            words,
            walls: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn word(&self, pos: usize) -> &Word {
        &self.words[pos]
    }

    pub fn span(&self, range: &Range) -> &[Word] {
        &self.words[range.start..=range.end]
    }

    pub fn walls(&self) -> &[usize] {
        &self.walls
    }

    /// Adds a wall at each boundary; boundaries outside `1..len` are ignored.
    pub fn add_walls(&mut self, boundaries: impl IntoIterator<Item = usize>) {
        let len = self.len();
        self.walls
            .extend(boundaries.into_iter().filter(|&b| b > 0 && b < len));
        self.walls.sort_unstable();
        self.walls.dedup();
    }

    /// Walls around every punctuation-only token.
    pub fn set_monotone_at_punctuation(&mut self) {
        let puncts: Vec<usize> = self
            .words
            .iter()
            .enumerate()
            .filter(|(_, w)| is_punctuation(w))
            .flat_map(|(i, _)| [i, i + 1])
            .collect();
        self.add_walls(puncts);
    }

    /// True when translating `range` next from `coverage` would leave a gap
    /// before a wall that the range crosses or lies beyond.
    pub fn crosses_wall(&self, coverage: &Coverage, range: &Range) -> bool {
        if self.walls.is_empty() {
            return false;
        }
        let gap = coverage
            .extend(range)
            .first_gap()
            .unwrap_or(coverage.len());
        self.walls.iter().any(|&w| w <= range.end && gap < w)
    }
}

fn is_punctuation(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_punctuation())
}
