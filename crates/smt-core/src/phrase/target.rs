use super::sentence::Word;

/// One symbol on the target side of a phrase or rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetToken {
    Word(Word),
    /// Placeholder for the n-th nonterminal of the rule's source side.
    Slot(usize),
}

/// A target fragment with its translation-model scores.
///
/// `alignment` holds `(source offset, target token index)` pairs relative to
/// the phrase or rule, terminals only.
#[derive(Debug, Clone)]
pub struct TargetPhrase {
    tokens: Vec<TargetToken>,
    scores: Vec<f32>,
    alignment: Vec<(usize, usize)>,
    unknown: bool,
}

impl TargetPhrase {
    pub fn new(tokens: Vec<TargetToken>, scores: Vec<f32>) -> Self {
        Self {
            tokens,
            scores,
            alignment: Vec::new(),
            unknown: false,
        }
    }

    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>, scores: Vec<f32>) -> Self {
        Self::new(
            words
                .into_iter()
                .map(|w| TargetToken::Word(Word::from(w)))
                .collect(),
            scores,
        )
    }

    /// Pass-through translation for a word with no candidates, or an empty
    /// one when unknown words are dropped.
    pub fn unknown(word: Option<Word>, num_scores: usize) -> Self {
        let tokens: Vec<TargetToken> = word.into_iter().map(TargetToken::Word).collect();
        let alignment = if tokens.is_empty() { vec![] } else { vec![(0, 0)] };
        Self {
            tokens,
            scores: vec![0.0; num_scores],
            alignment,
            unknown: true,
        }
    }

    pub fn with_alignment(mut self, alignment: Vec<(usize, usize)>) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn tokens(&self) -> &[TargetToken] {
        &self.tokens
    }

    pub fn words(&self) -> impl Iterator<Item = &Word> + '_ {
        self.tokens.iter().filter_map(|t| match t {
            TargetToken::Word(w) => Some(w),
            TargetToken::Slot(_) => None,
        })
    }

    pub fn num_words(&self) -> usize {
        self.words().count()
    }

    pub fn num_slots(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, TargetToken::Slot(_)))
            .count()
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn alignment(&self) -> &[(usize, usize)] {
        &self.alignment
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    /// Space-joined target side, slots written as `[n]` (1-based).
    pub fn render(&self) -> String {
        self.tokens
            .iter()
            .map(|t| match t {
                TargetToken::Word(w) => w.to_string(),
                TargetToken::Slot(i) => format!("[{}]", i + 1),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid alignment point: {0:?}")]
    Alignment(String),
    #[error("entry {phrase:?} has {found} scores, expected {expected}")]
    ScoreCount {
        phrase: String,
        expected: usize,
        found: usize,
    },
    #[error("entry has an empty source side")]
    EmptySource,
}

/// Parses `"0-0 1-2"` into `(source, target)` pairs.
pub fn parse_alignment(text: &str) -> Result<Vec<(usize, usize)>, TableError> {
    text.split_whitespace()
        .map(|point| {
            let (s, t) = point
                .split_once('-')
                .ok_or_else(|| TableError::Alignment(point.to_string()))?;
            let s = s
                .parse()
                .map_err(|_| TableError::Alignment(point.to_string()))?;
            let t = t
                .parse()
                .map_err(|_| TableError::Alignment(point.to_string()))?;
            Ok((s, t))
        })
        .collect()
}
