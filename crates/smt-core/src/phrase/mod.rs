//! Source sentences, target phrases and the candidate supply.

mod candidate;
mod collection;
mod sentence;
mod table;
mod target;

pub use candidate::Candidate;
pub use collection::CandidateCollection;
pub use sentence::{Sentence, Word};
pub use table::{PhraseEntry, PhraseSource, PhraseTable};
pub use target::{parse_alignment, TableError, TargetPhrase, TargetToken};
