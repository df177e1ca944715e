use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::SearchContext;
use crate::coverage::Range;

use super::candidate::Candidate;
use super::sentence::Sentence;
use super::table::PhraseSource;
use super::target::TargetPhrase;

/// Sorted candidates for every span of one sentence.
///
/// Lists are ordered by estimate, best first, ties kept in table order, and
/// cut to `table_limit`. Words with no single-word candidate get a
/// pass-through (or, in drop mode, an empty) translation.
pub struct CandidateCollection {
    /// `spans[start][len - 1]`
    spans: Vec<Vec<Vec<Arc<Candidate>>>>,
    max_len: usize,
}

impl CandidateCollection {
    pub fn collect(ctx: &SearchContext, sentence: &Sentence, source: &dyn PhraseSource) -> Self {
        let settings = &ctx.settings().search;
        let n = sentence.len();
        let max_len = settings.max_phrase_length.min(source.max_source_len()).max(1);
        let mut spans = Vec::with_capacity(n);
        let mut total = 0usize;

        for start in 0..n {
            let mut by_len = Vec::with_capacity(max_len);
            for len in 1..=max_len.min(n - start) {
                let range = Range::new(start, start + len - 1);
                let mut list: Vec<Arc<Candidate>> = source
                    .lookup(sentence.span(&range))
                    .into_iter()
                    .map(|target| Arc::new(Candidate::new(ctx, sentence, range, target)))
                    .collect();
                sort_candidates(&mut list);
                list.truncate(settings.table_limit);
                total += list.len();
                by_len.push(list);
            }
            if by_len.first().map_or(true, Vec::is_empty) {
                let unknown = unknown_target(ctx, sentence, start, source.num_scores());
                trace!(pos = start, word = %sentence.word(start), "unknown word");
                let candidate = Candidate::new(ctx, sentence, Range::single(start), unknown);
                if by_len.is_empty() {
                    by_len.push(Vec::new());
                }
                by_len[0].push(Arc::new(candidate));
                total += 1;
            }
            spans.push(by_len);
        }
        debug!(words = n, candidates = total, "collected candidates");
        Self { spans, max_len }
    }

    pub fn get(&self, range: &Range) -> &[Arc<Candidate>] {
        let len = range.num_words();
        if len > self.max_len {
            return &[];
        }
        self.spans
            .get(range.start)
            .and_then(|by_len| by_len.get(len - 1))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Best candidate estimate for a span.
    pub fn best_estimate(&self, range: &Range) -> Option<f32> {
        self.get(range).first().map(|c| c.estimate)
    }
}

fn sort_candidates(list: &mut [Arc<Candidate>]) {
    list.sort_by(|a, b| b.estimate.total_cmp(&a.estimate));
}

fn unknown_target(
    ctx: &SearchContext,
    sentence: &Sentence,
    pos: usize,
    num_scores: usize,
) -> Arc<TargetPhrase> {
    let word = sentence.word(pos);
    let keep = !ctx.settings().unknown.drop || word.chars().any(|c| c.is_ascii_digit());
    Arc::new(TargetPhrase::unknown(keep.then(|| word.clone()), num_scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feature, UnknownWordPenalty, WordPenalty};
    use crate::phrase::{PhraseEntry, PhraseTable};
    use crate::settings::Settings;

    fn ctx(settings: Settings) -> SearchContext {
        SearchContext::with_weights(
            settings,
            1,
            vec![
                Feature::stateless(WordPenalty),
                Feature::stateless(UnknownWordPenalty::new(1.0)),
            ],
            vec![1.0, 0.0, -100.0],
        )
        .unwrap()
    }

    fn table() -> PhraseTable {
        PhraseTable::from_entries([
            PhraseEntry::new("das", "the", &[-1.0]),
            PhraseEntry::new("das", "that", &[-0.5]),
            PhraseEntry::new("das", "this", &[-2.0]),
            PhraseEntry::new("das haus", "the house", &[-1.2]),
        ])
        .unwrap()
    }

    #[test]
    fn sorted_and_limited() {
        let mut settings = Settings::default();
        settings.search.table_limit = 2;
        let ctx = ctx(settings);
        let s = Sentence::new(0, "das haus");
        let coll = CandidateCollection::collect(&ctx, &s, &table());
        let das: Vec<String> = coll
            .get(&Range::single(0))
            .iter()
            .map(|c| c.target.render())
            .collect();
        assert_eq!(das, vec!["that", "the"]);
        assert_eq!(coll.get(&Range::new(0, 1)).len(), 1);
        assert_eq!(coll.best_estimate(&Range::single(0)), Some(-0.5));
    }

    #[test]
    fn unknown_word_pass_through() {
        let ctx = ctx(Settings::default());
        let s = Sentence::new(0, "das haus");
        let coll = CandidateCollection::collect(&ctx, &s, &table());
        let haus = coll.get(&Range::single(1));
        assert_eq!(haus.len(), 1);
        assert!(haus[0].target.is_unknown());
        assert_eq!(haus[0].target.render(), "haus");
        assert!((haus[0].score - -100.0).abs() < 1e-6);
    }

    #[test]
    fn drop_unknown_keeps_numbers() {
        let mut settings = Settings::default();
        settings.unknown.drop = true;
        let ctx = ctx(settings);
        let s = Sentence::new(0, "das haus 42");
        let coll = CandidateCollection::collect(&ctx, &s, &table());
        assert_eq!(coll.get(&Range::single(1))[0].target.num_words(), 0);
        assert_eq!(coll.get(&Range::single(2))[0].target.render(), "42");
    }

    #[test]
    fn spans_beyond_max_length_are_empty() {
        let mut settings = Settings::default();
        settings.search.max_phrase_length = 1;
        let ctx = ctx(settings);
        let s = Sentence::new(0, "das haus");
        let coll = CandidateCollection::collect(&ctx, &s, &table());
        assert_eq!(coll.max_len(), 1);
        assert!(coll.get(&Range::new(0, 1)).is_empty());
    }
}
