use crate::phrase::{TargetPhrase, Word};

use super::{FeatureFunction, StatelessFeature};

/// Minus one per target word.
pub struct WordPenalty;

impl FeatureFunction for WordPenalty {
    fn name(&self) -> &str {
        "WordPenalty"
    }
}

impl StatelessFeature for WordPenalty {
    fn evaluate_in_isolation(&self, _source: &[Word], target: &TargetPhrase, out: &mut [f32]) {
        out[0] = -(target.num_words() as f32);
    }
}

/// One per applied phrase or rule.
pub struct PhrasePenalty;

impl FeatureFunction for PhrasePenalty {
    fn name(&self) -> &str {
        "PhrasePenalty"
    }
}

impl StatelessFeature for PhrasePenalty {
    fn evaluate_in_isolation(&self, _source: &[Word], _target: &TargetPhrase, out: &mut [f32]) {
        out[0] = 1.0;
    }
}

/// Fires with a fixed value on pass-through candidates for unknown words.
pub struct UnknownWordPenalty {
    value: f32,
}

impl UnknownWordPenalty {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl FeatureFunction for UnknownWordPenalty {
    fn name(&self) -> &str {
        "UnknownWordPenalty"
    }
}

impl StatelessFeature for UnknownWordPenalty {
    fn evaluate_in_isolation(&self, _source: &[Word], target: &TargetPhrase, out: &mut [f32]) {
        out[0] = if target.is_unknown() { self.value } else { 0.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalties() {
        let src = [Word::from("das"), Word::from("haus")];
        let t = TargetPhrase::from_words(["the", "house"], vec![]);
        let mut out = [0.0];

        WordPenalty.evaluate_in_isolation(&src, &t, &mut out);
        assert_eq!(out, [-2.0]);
        PhrasePenalty.evaluate_in_isolation(&src, &t, &mut out);
        assert_eq!(out, [1.0]);

        let unk = UnknownWordPenalty::new(1.0);
        unk.evaluate_in_isolation(&src, &t, &mut out);
        assert_eq!(out, [0.0]);
        let pass = TargetPhrase::unknown(Some(Word::from("haus")), 0);
        unk.evaluate_in_isolation(&src[1..], &pass, &mut out);
        assert_eq!(out, [1.0]);
    }
}
