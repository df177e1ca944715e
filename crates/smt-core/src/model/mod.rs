//! Scoring contract between the search and its models.
//!
//! A model is either stateless (scored once per candidate, in isolation) or
//! stateful (scored per extension, carrying an opaque [`FeatureState`] that
//! takes part in recombination). Scores are log-domain, higher is better.

mod bigram;
mod distortion;
mod penalty;

pub use bigram::BigramLanguageModel;
pub use distortion::Distortion;
pub use penalty::{PhrasePenalty, UnknownWordPenalty, WordPenalty};

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Range as Slice};
use std::sync::Arc;

use serde::Serialize;

use crate::coverage::{Coverage, Range};
use crate::phrase::{Sentence, TargetPhrase, Word};

/// Opaque per-model state; two derivations recombine only if every stateful
/// model reports equal states.
pub trait FeatureState: fmt::Debug + Send + Sync + 'static {
    fn hash_state(&self) -> u64;
    fn eq_state(&self, other: &dyn FeatureState) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T> FeatureState for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn hash_state(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash(&mut h);
        h.finish()
    }

    fn eq_state(&self, other: &dyn FeatureState) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type StateRef = Arc<dyn FeatureState>;

pub trait FeatureFunction: Send + Sync {
    fn name(&self) -> &str;

    fn num_scores(&self) -> usize {
        1
    }

    /// Releases per-sentence caches.
    fn cleanup_after_sentence(&self, _sentence_id: u64) {}
}

pub trait StatelessFeature: FeatureFunction {
    fn evaluate_in_isolation(&self, source: &[Word], target: &TargetPhrase, out: &mut [f32]);
}

/// A phrase appended to a phrase-based derivation.
pub struct PhraseExtension<'a> {
    pub sentence: &'a Sentence,
    pub range: Range,
    pub target: &'a TargetPhrase,
    /// Coverage after the extension.
    pub coverage: &'a Coverage,
}

/// A rule applied over a chart span.
pub struct ChartExtension<'a> {
    pub sentence: &'a Sentence,
    pub span: Range,
    pub target: &'a TargetPhrase,
}

pub trait StatefulFeature: FeatureFunction {
    fn empty_state(&self, sentence: &Sentence) -> StateRef;

    /// Context-free estimate of the target's score, used only to order and
    /// prune the search.
    fn estimate(&self, _target: &TargetPhrase, _out: &mut [f32]) {}

    fn evaluate_phrase(
        &self,
        ext: &PhraseExtension<'_>,
        prev: &dyn FeatureState,
        out: &mut [f32],
    ) -> StateRef;

    /// `children` are indexed by the rule's nonterminal order, matching
    /// [`crate::phrase::TargetToken::Slot`].
    fn evaluate_chart(
        &self,
        ext: &ChartExtension<'_>,
        children: &[&dyn FeatureState],
        out: &mut [f32],
    ) -> StateRef;
}

pub enum Feature {
    Stateless(Box<dyn StatelessFeature>),
    Stateful(Box<dyn StatefulFeature>),
}

impl Feature {
    pub fn stateless(f: impl StatelessFeature + 'static) -> Self {
        Feature::Stateless(Box::new(f))
    }

    pub fn stateful(f: impl StatefulFeature + 'static) -> Self {
        Feature::Stateful(Box::new(f))
    }

    pub fn name(&self) -> &str {
        match self {
            Feature::Stateless(f) => f.name(),
            Feature::Stateful(f) => f.name(),
        }
    }

    pub fn num_scores(&self) -> usize {
        match self {
            Feature::Stateless(f) => f.num_scores(),
            Feature::Stateful(f) => f.num_scores(),
        }
    }

    pub fn cleanup_after_sentence(&self, sentence_id: u64) {
        match self {
            Feature::Stateless(f) => f.cleanup_after_sentence(sentence_id),
            Feature::Stateful(f) => f.cleanup_after_sentence(sentence_id),
        }
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Stateless(_) => write!(f, "Stateless({})", self.name()),
            Feature::Stateful(_) => write!(f, "Stateful({})", self.name()),
        }
    }
}

/// Name of the producer owning the candidates' own translation scores.
pub const TRANSLATION_MODEL: &str = "TranslationModel";

#[derive(Debug, Clone, Serialize)]
pub struct Producer {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

/// Assigns each producer a slice of the dense score vector: translation
/// scores first, then every feature in order.
#[derive(Debug, Clone)]
pub struct ScoreLayout {
    producers: Vec<Producer>,
    len: usize,
}

impl ScoreLayout {
    pub fn new(num_translation_scores: usize, features: &[Feature]) -> Self {
        let mut producers = Vec::with_capacity(features.len() + 1);
        let mut offset = 0;
        let mut push = |name: &str, len: usize| {
            producers.push(Producer {
                name: name.to_string(),
                offset,
                len,
            });
            offset += len;
        };
        push(TRANSLATION_MODEL, num_translation_scores);
        for f in features {
            push(f.name(), f.num_scores());
        }
        Self {
            producers,
            len: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn producers(&self) -> &[Producer] {
        &self.producers
    }

    pub fn translation(&self) -> Slice<usize> {
        self.slice(0)
    }

    /// Slice of the `index`-th feature.
    pub fn feature(&self, index: usize) -> Slice<usize> {
        self.slice(index + 1)
    }

    fn slice(&self, producer: usize) -> Slice<usize> {
        let p = &self.producers[producer];
        p.offset..p.offset + p.len
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeightError {
    #[error("no weights given for {0}")]
    Missing(String),
    #[error("{name} expects {expected} weights, got {found}")]
    Length {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Dense weight vector aligned with a [`ScoreLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct Weights(Vec<f32>);

impl Weights {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Builds the vector producer by producer from `lookup(name)`.
    pub fn from_producers(
        layout: &ScoreLayout,
        mut lookup: impl FnMut(&str) -> Option<Vec<f32>>,
    ) -> Result<Self, WeightError> {
        let mut values = Vec::with_capacity(layout.len());
        for p in layout.producers() {
            if p.len == 0 {
                continue;
            }
            let w = lookup(&p.name).ok_or_else(|| WeightError::Missing(p.name.clone()))?;
            if w.len() != p.len {
                return Err(WeightError::Length {
                    name: p.name.clone(),
                    expected: p.len,
                    found: w.len(),
                });
            }
            values.extend(w);
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Weighted sum of `values`, which occupy `slice` of the layout.
    pub fn dot(&self, slice: Slice<usize>, values: &[f32]) -> f32 {
        self.0[slice].iter().zip(values).map(|(w, v)| w * v).sum()
    }
}

/// Unweighted per-producer scores of a candidate or derivation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown(Vec<f32>);

impl ScoreBreakdown {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn slice_mut(&mut self, slice: Slice<usize>) -> &mut [f32] {
        &mut self.0[slice]
    }

    pub fn add_assign(&mut self, other: &ScoreBreakdown) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a += b;
        }
    }

    pub fn sub_assign(&mut self, other: &ScoreBreakdown) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a -= b;
        }
    }

    pub fn weighted(&self, weights: &Weights) -> f32 {
        weights.dot(0..self.0.len(), &self.0)
    }
}

impl Add<&ScoreBreakdown> for &ScoreBreakdown {
    type Output = ScoreBreakdown;

    fn add(self, rhs: &ScoreBreakdown) -> ScoreBreakdown {
        let mut out = self.clone();
        out.add_assign(rhs);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct LastWord(&'static str);

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Position(usize);

    #[test]
    fn state_equality_is_typed() {
        let a: StateRef = Arc::new(LastWord("haus"));
        let b: StateRef = Arc::new(LastWord("haus"));
        let c: StateRef = Arc::new(LastWord("baum"));
        let d: StateRef = Arc::new(Position(0));
        assert!(a.eq_state(b.as_ref()));
        assert_eq!(a.hash_state(), b.hash_state());
        assert!(!a.eq_state(c.as_ref()));
        assert!(!a.eq_state(d.as_ref()));
    }

    fn features() -> Vec<Feature> {
        vec![
            Feature::stateless(WordPenalty),
            Feature::stateful(Distortion),
            Feature::stateless(PhrasePenalty),
        ]
    }

    #[test]
    fn layout_offsets() {
        let layout = ScoreLayout::new(2, &features());
        assert_eq!(layout.len(), 5);
        assert_eq!(layout.translation(), 0..2);
        assert_eq!(layout.feature(0), 2..3);
        assert_eq!(layout.feature(2), 4..5);
        assert_eq!(layout.producers()[2].name, "Distortion");
    }

    #[test]
    fn weights_by_producer() {
        let layout = ScoreLayout::new(2, &features());
        let w = Weights::from_producers(&layout, |name| match name {
            TRANSLATION_MODEL => Some(vec![0.2, 0.3]),
            _ => Some(vec![1.0]),
        })
        .unwrap();
        assert_eq!(w.as_slice(), &[0.2, 0.3, 1.0, 1.0, 1.0]);

        let err = Weights::from_producers(&layout, |_| Some(vec![1.0, 1.0])).unwrap_err();
        assert!(matches!(err, WeightError::Length { .. }));

        let err = Weights::from_producers(&layout, |_| None).unwrap_err();
        assert!(err.to_string().contains(TRANSLATION_MODEL));
    }

    #[test]
    fn breakdown_arithmetic() {
        let w = Weights::new(vec![1.0, 2.0]);
        let mut a = ScoreBreakdown::zeros(2);
        a.slice_mut(1..2)[0] = -1.5;
        let b = ScoreBreakdown(vec![0.5, 0.5]);
        let sum = &a + &b;
        assert_eq!(sum.values(), &[0.5, -1.0]);
        assert!((sum.weighted(&w) - -1.5).abs() < 1e-6);
        let mut back = sum.clone();
        back.sub_assign(&b);
        assert_eq!(back, a);
    }
}
