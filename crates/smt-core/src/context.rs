//! Per-run search context: settings, models and weights.
//!
//! One `SearchContext` is built per decode run and shared read-only by every
//! sentence, so it must stay `Sync`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DecodeError, DecodeResult};
use crate::model::{
    ChartExtension, Feature, PhraseExtension, ScoreBreakdown, ScoreLayout, StateRef,
    StatefulFeature, WeightError, Weights,
};
use crate::phrase::{Sentence, TargetPhrase, Word};
use crate::settings::Settings;

pub struct SearchContext {
    settings: Settings,
    features: Vec<Feature>,
    layout: ScoreLayout,
    weights: Weights,
}

/// Isolation scores of a target fragment.
#[derive(Debug, Clone)]
pub struct TargetScore {
    pub breakdown: ScoreBreakdown,
    /// Weighted translation and stateless scores.
    pub score: f32,
    /// `score` plus the stateful models' context-free estimates.
    pub estimate: f32,
}

impl SearchContext {
    /// Builds the context, looking up each producer's weights by name.
    pub fn new(
        settings: Settings,
        num_translation_scores: usize,
        features: Vec<Feature>,
        weights: impl FnMut(&str) -> Option<Vec<f32>>,
    ) -> Result<Self, WeightError> {
        let layout = ScoreLayout::new(num_translation_scores, &features);
        let weights = Weights::from_producers(&layout, weights)?;
        Ok(Self {
            settings,
            features,
            layout,
            weights,
        })
    }

    pub fn with_weights(
        settings: Settings,
        num_translation_scores: usize,
        features: Vec<Feature>,
        weights: Vec<f32>,
    ) -> Result<Self, WeightError> {
        let layout = ScoreLayout::new(num_translation_scores, &features);
        if weights.len() != layout.len() {
            return Err(WeightError::Length {
                name: "weight vector".to_string(),
                expected: layout.len(),
                found: weights.len(),
            });
        }
        Ok(Self {
            settings,
            features,
            layout,
            weights: Weights::new(weights),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &ScoreLayout {
        &self.layout
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn num_translation_scores(&self) -> usize {
        self.layout.translation().len()
    }

    pub fn score_target(&self, source: &[Word], target: &TargetPhrase) -> TargetScore {
        let mut breakdown = ScoreBreakdown::zeros(self.layout.len());
        let tm = self.layout.translation();
        let n = tm.len().min(target.scores().len());
        breakdown
            .slice_mut(tm.start..tm.start + n)
            .copy_from_slice(&target.scores()[..n]);

        let mut estimates = ScoreBreakdown::zeros(self.layout.len());
        for (i, feature) in self.features.iter().enumerate() {
            let slice = self.layout.feature(i);
            match feature {
                Feature::Stateless(f) => {
                    f.evaluate_in_isolation(source, target, breakdown.slice_mut(slice))
                }
                Feature::Stateful(f) => f.estimate(target, estimates.slice_mut(slice)),
            }
        }
        let score = breakdown.weighted(&self.weights);
        let estimate = score + estimates.weighted(&self.weights);
        TargetScore {
            breakdown,
            score,
            estimate,
        }
    }

    pub fn empty_states(&self, sentence: &Sentence) -> Box<[StateRef]> {
        self.stateful()
            .map(|(_, f)| f.empty_state(sentence))
            .collect()
    }

    /// Scores a phrase extension; adds the stateful scores to `breakdown` and
    /// returns their weighted sum with the successor states.
    pub fn evaluate_phrase(
        &self,
        ext: &PhraseExtension<'_>,
        prev: &[StateRef],
        breakdown: &mut ScoreBreakdown,
    ) -> (f32, Box<[StateRef]>) {
        let mut delta = 0.0;
        let states = self
            .stateful()
            .zip(prev)
            .map(|((i, f), state)| {
                let slice = self.layout.feature(i);
                let mut out = vec![0.0; slice.len()];
                let next = f.evaluate_phrase(ext, state.as_ref(), &mut out);
                delta += self.weights.dot(slice.clone(), &out);
                add_into(breakdown.slice_mut(slice), &out);
                next
            })
            .collect();
        (delta, states)
    }

    /// Chart analogue of [`SearchContext::evaluate_phrase`]; `children` holds
    /// each nonterminal's state vector.
    pub fn evaluate_chart(
        &self,
        ext: &ChartExtension<'_>,
        children: &[&[StateRef]],
        breakdown: &mut ScoreBreakdown,
    ) -> (f32, Box<[StateRef]>) {
        let mut delta = 0.0;
        let states = self
            .stateful()
            .enumerate()
            .map(|(k, (i, f))| {
                let slice = self.layout.feature(i);
                let child_states: Vec<_> = children.iter().map(|c| c[k].as_ref()).collect();
                let mut out = vec![0.0; slice.len()];
                let next = f.evaluate_chart(ext, &child_states, &mut out);
                delta += self.weights.dot(slice.clone(), &out);
                add_into(breakdown.slice_mut(slice), &out);
                next
            })
            .collect();
        (delta, states)
    }

    /// Forwards the end-of-sentence hook to every model.
    pub fn cleanup_after_sentence(&self, sentence_id: u64) {
        for f in &self.features {
            f.cleanup_after_sentence(sentence_id);
        }
    }

    fn stateful(&self) -> impl Iterator<Item = (usize, &dyn StatefulFeature)> + '_ {
        self.features
            .iter()
            .enumerate()
            .filter_map(|(i, f)| match f {
                Feature::Stateful(f) => Some((i, f.as_ref())),
                Feature::Stateless(_) => None,
            })
    }
}

fn add_into(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

/// Cooperative cancellation flag, checked between stacks and chart cells.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> DecodeResult<()> {
        if self.is_cancelled() {
            Err(DecodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BigramLanguageModel, Distortion, WordPenalty, TRANSLATION_MODEL};

    fn context() -> SearchContext {
        let lm = BigramLanguageModel::from_entries(
            [("the", -1.0, 0.0), ("house", -2.0, 0.0)],
            Vec::<(&str, &str, f32)>::new(),
        );
        SearchContext::new(
            Settings::default(),
            1,
            vec![
                Feature::stateless(WordPenalty),
                Feature::stateful(Distortion),
                Feature::stateful(lm),
            ],
            |name| match name {
                TRANSLATION_MODEL => Some(vec![1.0]),
                "WordPenalty" => Some(vec![0.5]),
                _ => Some(vec![1.0]),
            },
        )
        .unwrap()
    }

    #[test]
    fn isolation_scores_and_estimate() {
        let ctx = context();
        let target = TargetPhrase::from_words(["the", "house"], vec![-0.5]);
        let ts = ctx.score_target(&[Word::from("das"), Word::from("haus")], &target);
        assert_eq!(ts.breakdown.values(), &[-0.5, -2.0, 0.0, 0.0]);
        // -0.5 + 0.5 * -2
        assert!((ts.score - -1.5).abs() < 1e-6);
        // lm estimate: unigram(the) + backoff(the) + unigram(house)
        assert!((ts.estimate - (-1.5 - 3.0)).abs() < 1e-6);
    }

    #[test]
    fn wrong_weight_vector_length() {
        let err = SearchContext::with_weights(
            Settings::default(),
            1,
            vec![Feature::stateless(WordPenalty)],
            vec![1.0],
        )
        .err()
        .unwrap();
        assert!(matches!(err, WeightError::Length { expected: 2, found: 1, .. }));
    }

    #[test]
    fn empty_states_per_stateful_model() {
        let ctx = context();
        let s = Sentence::new(0, "das haus");
        assert_eq!(ctx.empty_states(&s).len(), 2);
    }

    #[test]
    fn cancel_token() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        let other = token.clone();
        other.cancel();
        assert!(matches!(token.check(), Err(DecodeError::Cancelled)));
    }
}
