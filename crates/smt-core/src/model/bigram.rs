use std::collections::HashMap;
use std::sync::Arc;

use crate::phrase::{Sentence, TargetPhrase, TargetToken, Word};

use super::{
    ChartExtension, FeatureFunction, FeatureState, PhraseExtension, StateRef, StatefulFeature,
};

pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";

const DEFAULT_OOV: f32 = -100.0;

/// Backoff bigram model over log10 probabilities.
///
/// Phrase mode scores `<s>` at sentence start and `</s>` once coverage is
/// complete. Chart mode scores the words it sees; the first word of a
/// sub-derivation is rescored once its left context is known.
pub struct BigramLanguageModel {
    unigrams: HashMap<Word, (f32, f32)>,
    bigrams: HashMap<Word, HashMap<Word, f32>>,
    oov: f32,
}

/// Last emitted word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct History(Word);

/// Leftmost and rightmost words of a chart derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Boundary(Option<(Word, Word)>);

impl BigramLanguageModel {
    /// `unigrams` are `(word, log10 prob, log10 backoff)`, `bigrams` are
    /// `(previous, word, log10 prob)`.
    pub fn from_entries<'a>(
        unigrams: impl IntoIterator<Item = (&'a str, f32, f32)>,
        bigrams: impl IntoIterator<Item = (&'a str, &'a str, f32)>,
    ) -> Self {
        let mut unigrams: HashMap<Word, (f32, f32)> = unigrams
            .into_iter()
            .map(|(w, p, b)| (Word::from(w), (p, b)))
            .collect();
        // sentence start is context only
        unigrams.entry(Word::from(BOS)).or_insert((0.0, 0.0));
        let mut table: HashMap<Word, HashMap<Word, f32>> = HashMap::new();
        for (prev, word, p) in bigrams {
            table
                .entry(Word::from(prev))
                .or_default()
                .insert(Word::from(word), p);
        }
        Self {
            unigrams,
            bigrams: table,
            oov: DEFAULT_OOV,
        }
    }

    pub fn with_oov(mut self, oov: f32) -> Self {
        self.oov = oov;
        self
    }

    pub fn unigram(&self, word: &str) -> f32 {
        self.unigrams.get(word).map_or(self.oov, |&(p, _)| p)
    }

    /// log10 P(word | prev) with backoff.
    pub fn bigram(&self, prev: &str, word: &str) -> f32 {
        if let Some(&p) = self.bigrams.get(prev).and_then(|m| m.get(word)) {
            return p;
        }
        let backoff = self.unigrams.get(prev).map_or(0.0, |&(_, b)| b);
        backoff + self.unigram(word)
    }

    /// Scores `words` after `prev`, returning the total and the last word.
    fn score_run<'w>(
        &self,
        mut prev: Option<&'w Word>,
        words: impl Iterator<Item = &'w Word>,
    ) -> (f32, Option<&'w Word>) {
        let mut total = 0.0;
        for w in words {
            total += match prev {
                Some(p) => self.bigram(p, w),
                None => self.unigram(w),
            };
            prev = Some(w);
        }
        (total, prev)
    }
}

impl FeatureFunction for BigramLanguageModel {
    fn name(&self) -> &str {
        "LM"
    }
}

impl StatefulFeature for BigramLanguageModel {
    fn empty_state(&self, _sentence: &Sentence) -> StateRef {
        Arc::new(History(Word::from(BOS)))
    }

    fn estimate(&self, target: &TargetPhrase, out: &mut [f32]) {
        let mut total = 0.0;
        let mut run: Vec<&Word> = Vec::new();
        for token in target.tokens() {
            match token {
                TargetToken::Word(w) => run.push(w),
                TargetToken::Slot(_) => total += self.score_run(None, run.drain(..)).0,
            }
        }
        total += self.score_run(None, run.into_iter()).0;
        out[0] = total;
    }

    fn evaluate_phrase(
        &self,
        ext: &PhraseExtension<'_>,
        prev: &dyn FeatureState,
        out: &mut [f32],
    ) -> StateRef {
        let bos = Word::from(BOS);
        let history = prev
            .as_any()
            .downcast_ref::<History>()
            .map_or(&bos, |h| &h.0);
        let (mut total, last) = self.score_run(Some(history), ext.target.words());
        let last = last.cloned().unwrap_or_else(|| history.clone());
        if ext.coverage.is_complete() {
            total += self.bigram(&last, EOS);
        }
        out[0] = total;
        Arc::new(History(last))
    }

    fn evaluate_chart(
        &self,
        ext: &ChartExtension<'_>,
        children: &[&dyn FeatureState],
        out: &mut [f32],
    ) -> StateRef {
        let mut total = 0.0;
        let mut first: Option<Word> = None;
        let mut prev: Option<Word> = None;
        for token in ext.target.tokens() {
            match token {
                TargetToken::Word(w) => {
                    total += match &prev {
                        Some(p) => self.bigram(p, w),
                        None => self.unigram(w),
                    };
                    first.get_or_insert_with(|| w.clone());
                    prev = Some(w.clone());
                }
                TargetToken::Slot(i) => {
                    let child = children
                        .get(*i)
                        .and_then(|c| c.as_any().downcast_ref::<Boundary>())
                        .and_then(|b| b.0.as_ref());
                    let Some((child_first, child_last)) = child else {
                        continue;
                    };
                    if let Some(p) = &prev {
                        // the child scored its first word without context
                        total += self.bigram(p, child_first) - self.unigram(child_first);
                    }
                    first.get_or_insert_with(|| child_first.clone());
                    prev = Some(child_last.clone());
                }
            }
        }
        out[0] = total;
        Arc::new(Boundary(first.zip(prev)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{Coverage, Range};

    fn lm() -> BigramLanguageModel {
        BigramLanguageModel::from_entries(
            [
                ("the", -1.0, -0.5),
                ("house", -2.0, -0.3),
                ("small", -2.5, 0.0),
                (EOS, -1.5, 0.0),
            ],
            [
                (BOS, "the", -0.2),
                ("the", "house", -0.7),
                ("house", EOS, -0.1),
            ],
        )
        .with_oov(-10.0)
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn backoff() {
        let lm = lm();
        assert!(close(lm.bigram("the", "house"), -0.7));
        // backoff("house") + unigram("small")
        assert!(close(lm.bigram("house", "small"), -2.8));
        assert!(close(lm.bigram("zzz", "the"), -1.0));
        assert!(close(lm.unigram("zzz"), -10.0));
        assert!(close(lm.unigram(BOS), 0.0));
    }

    #[test]
    fn phrase_mode_adds_sentence_markers() {
        let lm = lm();
        let sentence = Sentence::new(0, "das haus");
        let start = lm.empty_state(&sentence);
        let target = TargetPhrase::from_words(["the", "house"], vec![]);
        let range = Range::new(0, 1);
        let coverage = Coverage::new(2).unwrap().extend(&range);
        let ext = PhraseExtension {
            sentence: &sentence,
            range,
            target: &target,
            coverage: &coverage,
        };
        let mut out = [0.0];
        let state = lm.evaluate_phrase(&ext, start.as_ref(), &mut out);
        assert!(close(out[0], -0.2 - 0.7 - 0.1));
        let expected: StateRef = Arc::new(History(Word::from("house")));
        assert!(state.eq_state(expected.as_ref()));

        let mut est = [0.0];
        lm.estimate(&target, &mut est);
        assert!(close(est[0], -1.0 - 0.7));
    }

    #[test]
    fn chart_mode_rescores_child_boundary() {
        let lm = lm();
        let sentence = Sentence::new(0, "haus das");
        let house = TargetPhrase::from_words(["house"], vec![]);
        let mut out = [0.0];
        let leaf = lm.evaluate_chart(
            &ChartExtension {
                sentence: &sentence,
                span: Range::single(0),
                target: &house,
            },
            &[],
            &mut out,
        );
        assert!(close(out[0], -2.0));

        let rule = TargetPhrase::new(
            vec![TargetToken::Word(Word::from("the")), TargetToken::Slot(0)],
            vec![],
        );
        let parent = lm.evaluate_chart(
            &ChartExtension {
                sentence: &sentence,
                span: Range::new(0, 1),
                target: &rule,
            },
            &[leaf.as_ref()],
            &mut out,
        );
        // unigram(the) + bigram(the, house) - unigram(house)
        assert!(close(out[0], -1.0 - 0.7 + 2.0));
        let expected: StateRef = Arc::new(Boundary(Some((Word::from("the"), Word::from("house")))));
        assert!(parent.eq_state(expected.as_ref()));

        let mut est = [0.0];
        lm.estimate(&rule, &mut est);
        assert!(close(est[0], -1.0));
    }
}
