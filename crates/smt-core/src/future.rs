//! Future-cost table: an optimistic score for translating the rest of a
//! sentence, used only to order and prune the search.

use std::collections::HashMap;

use crate::coverage::{Coverage, Range};
use crate::phrase::CandidateCollection;

pub struct FutureCostTable {
    len: usize,
    /// `best[start * len + end]`
    best: Vec<f32>,
    cache: HashMap<u64, f32>,
}

impl FutureCostTable {
    /// Fills every span bottom-up from the best single candidate and the
    /// best split into two sub-spans.
    pub fn build(len: usize, candidates: &CandidateCollection) -> Self {
        let mut best = vec![f32::NEG_INFINITY; len * len];
        for width in 1..=len {
            for start in 0..=len - width {
                let end = start + width - 1;
                let mut score = candidates
                    .best_estimate(&Range::new(start, end))
                    .unwrap_or(f32::NEG_INFINITY);
                for split in start..end {
                    let joined = best[start * len + split] + best[(split + 1) * len + end];
                    if joined > score {
                        score = joined;
                    }
                }
                best[start * len + end] = score;
            }
        }
        Self {
            len,
            best,
            cache: HashMap::new(),
        }
    }

    pub fn span(&self, range: &Range) -> f32 {
        self.best[range.start * self.len + range.end]
    }

    /// Sum of the best scores of every uncovered run.
    pub fn estimate(&mut self, coverage: &Coverage) -> f32 {
        if !coverage.has_exact_compact_id() {
            return self.compute(coverage);
        }
        let key = coverage.compact_id();
        if let Some(&score) = self.cache.get(&key) {
            return score;
        }
        let score = self.compute(coverage);
        self.cache.insert(key, score);
        score
    }

    fn compute(&self, coverage: &Coverage) -> f32 {
        coverage.gaps().iter().map(|g| self.span(g)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SearchContext;
    use crate::phrase::{PhraseEntry, PhraseTable, Sentence};
    use crate::settings::Settings;

    fn table_for(entries: &[(&str, &str, f32)], text: &str) -> FutureCostTable {
        let ctx = SearchContext::with_weights(Settings::default(), 1, vec![], vec![1.0]).unwrap();
        let table = PhraseTable::from_entries(
            entries
                .iter()
                .map(|(s, t, score)| PhraseEntry::new(s, t, &[*score])),
        )
        .unwrap();
        let sentence = Sentence::new(0, text);
        let coll = CandidateCollection::collect(&ctx, &sentence, &table);
        FutureCostTable::build(sentence.len(), &coll)
    }

    #[test]
    fn best_of_phrase_and_split() {
        let fc = table_for(
            &[
                ("a", "x", -1.0),
                ("b", "y", -2.0),
                ("c", "z", -1.5),
                ("a b", "xy", -2.5),
                ("b c", "yz", -4.0),
            ],
            "a b c",
        );
        assert_eq!(fc.span(&Range::new(0, 1)), -2.5);
        // split beats the phrase
        assert_eq!(fc.span(&Range::new(1, 2)), -3.5);
        assert_eq!(fc.span(&Range::new(0, 2)), -4.0);
    }

    #[test]
    fn estimate_sums_gaps_and_caches() {
        let mut fc = table_for(
            &[("a", "x", -1.0), ("b", "y", -2.0), ("c", "z", -1.5)],
            "a b c",
        );
        let cov = Coverage::new(3).unwrap().extend(&Range::single(1));
        assert_eq!(fc.estimate(&cov), -2.5);
        assert_eq!(fc.estimate(&cov), -2.5);
        assert_eq!(fc.cache.len(), 1);
        let full = cov.extend(&Range::single(0)).extend(&Range::single(2));
        assert_eq!(fc.estimate(&full), 0.0);
    }
}
