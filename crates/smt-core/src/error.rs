use std::fmt;

use crate::settings::SettingsError;

/// Which sorted input list a monotonicity violation was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortedList {
    Predecessors,
    Candidates,
    Rules,
    Slot(usize),
    Frontier,
}

impl fmt::Display for SortedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortedList::Predecessors => f.write_str("predecessor list"),
            SortedList::Candidates => f.write_str("candidate list"),
            SortedList::Rules => f.write_str("rule list"),
            SortedList::Slot(i) => write!(f, "nonterminal slot {i}"),
            SortedList::Frontier => f.write_str("frontier pop order"),
        }
    }
}

/// Internal-consistency failures that abort decoding of a sentence.
///
/// Filtered conditions (distortion limit, reordering walls, maximum rule
/// span) never surface here.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{list} not sorted at {span}: {first} before {second}")]
    NonMonotonic {
        list: SortedList,
        span: String,
        first: f32,
        second: f32,
    },
    #[error("coverage of {len} positions exceeds the maximum of {max}")]
    CoverageTooLong { len: usize, max: usize },
    #[error("stale node reference (index {index}, generation {generation})")]
    StaleNode { index: u32, generation: u32 },
    #[error("expansion of a node that is not a live representative at {span}")]
    DeadPredecessor { span: String },
    #[error("score is not a number at {span}")]
    InvalidScore { span: String },
    #[error("sorted list of length {len} exceeds the frontier coordinate width")]
    FrontierOverflow { len: usize },
    #[error("decoding cancelled")]
    Cancelled,
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

pub type DecodeResult<T> = Result<T, DecodeError>;
