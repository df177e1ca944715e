use crate::context::{CancelToken, SearchContext};
use crate::model::{Distortion, Feature, UnknownWordPenalty};
use crate::output::{self, Translation};
use crate::phrase::{PhraseEntry, PhraseTable, Sentence};
use crate::search::{decode_phrase, SearchResult};
use crate::settings::Settings;

/// Literal score table for "das haus ist" covering every contiguous span.
///
/// Single words sum to -3.0, beating every multi-word segmentation:
/// `[das haus][ist]` -3.5, `[das][haus ist]` -3.8, `[das haus ist]` -4.0.
pub const THREE_WORDS: &[(&str, &str, f32)] = &[
    ("das", "the", -1.0),
    ("haus", "house", -1.5),
    ("ist", "is", -0.5),
    ("das haus", "the building", -3.0),
    ("haus ist", "home is", -2.8),
    ("das haus ist", "it is the house", -4.0),
];

pub fn table(entries: &[(&str, &str, f32)]) -> PhraseTable {
    PhraseTable::from_entries(
        entries
            .iter()
            .map(|(s, t, score)| PhraseEntry::new(s, t, &[*score])),
    )
    .unwrap()
}

/// Unlimited reordering, n-best arcs kept.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.search.max_distortion = -1;
    settings.nbest.size = 10;
    settings
}

/// One translation score, linear distortion and a heavy unknown-word
/// penalty, all with unit weights except the penalty.
pub fn test_context(settings: Settings) -> SearchContext {
    SearchContext::with_weights(
        settings,
        1,
        vec![
            Feature::stateful(Distortion),
            Feature::stateless(UnknownWordPenalty::new(1.0)),
        ],
        vec![1.0, 1.0, -100.0],
    )
    .unwrap()
}

pub fn decode(ctx: &SearchContext, table: &PhraseTable, text: &str) -> SearchResult {
    decode_phrase(ctx, &Sentence::new(0, text), table, &CancelToken::new()).unwrap()
}

pub fn best_text(result: &SearchResult) -> String {
    output::best_translation(result)
        .unwrap()
        .map(|t| t.text())
        .unwrap_or_default()
}

pub fn nbest(result: &SearchResult, n: usize, distinct: bool) -> Vec<Translation> {
    output::nbest(result, n, distinct).unwrap()
}
