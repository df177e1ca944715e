//! Source spans and coverage bitmaps.

use std::fmt;

use serde::Serialize;

use crate::error::{DecodeError, DecodeResult};

/// Longest sentence a coverage bitmap may describe.
pub const MAX_COVERAGE_LEN: usize = u16::MAX as usize;

/// Width of the window after the first gap encoded by [`Coverage::compact_id`].
const COMPACT_WINDOW: usize = 32;

/// Inclusive source span `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted range {start}..{end}");
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    pub fn num_words(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` starts right after this range ends.
    pub fn is_adjacent_to(&self, other: &Range) -> bool {
        self.end + 1 == other.start
    }

    /// Reordering distance of translating `self` right after `prev`.
    ///
    /// With no previous range the distance is measured from the sentence
    /// start.
    pub fn distortion_from(&self, prev: Option<&Range>) -> usize {
        match prev {
            None => self.start,
            Some(p) => (p.end as i64 + 1 - self.start as i64).unsigned_abs() as usize,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

/// Bitmap of translated source positions.
///
/// Coverage values are never mutated after construction; [`Coverage::extend`]
/// returns a new bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coverage {
    words: Box<[u64]>,
    len: usize,
    covered: usize,
}

impl Coverage {
    pub fn new(len: usize) -> DecodeResult<Self> {
        if len > MAX_COVERAGE_LEN {
            return Err(DecodeError::CoverageTooLong {
                len,
                max: MAX_COVERAGE_LEN,
            });
        }
        Ok(Self {
            words: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
            len,
            covered: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn covered(&self, pos: usize) -> bool {
        pos < self.len && self.words[pos / 64] & (1 << (pos % 64)) != 0
    }

    pub fn num_covered(&self) -> usize {
        self.covered
    }

    pub fn num_uncovered(&self) -> usize {
        self.len - self.covered
    }

    pub fn is_complete(&self) -> bool {
        self.covered == self.len
    }

    /// True when no position of `range` is covered yet.
    pub fn is_free(&self, range: &Range) -> bool {
        range.end < self.len && (range.start..=range.end).all(|p| !self.covered(p))
    }

    /// A copy of this bitmap with `range` marked as covered.
    pub fn extend(&self, range: &Range) -> Coverage {
        debug_assert!(self.is_free(range), "{range} overlaps {self}");
        let mut next = self.clone();
        for pos in range.start..=range.end {
            let mask = 1u64 << (pos % 64);
            let word = &mut next.words[pos / 64];
            if *word & mask == 0 {
                *word |= mask;
                next.covered += 1;
            }
        }
        next
    }

    pub fn first_gap(&self) -> Option<usize> {
        (0..self.len).find(|&p| !self.covered(p))
    }

    pub fn last_covered(&self) -> Option<usize> {
        (0..self.len).rev().find(|&p| self.covered(p))
    }

    /// Maximal runs of uncovered positions, left to right.
    pub fn gaps(&self) -> Vec<Range> {
        let mut runs = Vec::new();
        let mut start = None;
        for pos in 0..self.len {
            match (self.covered(pos), start) {
                (false, None) => start = Some(pos),
                (true, Some(s)) => {
                    runs.push(Range::new(s, pos - 1));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            runs.push(Range::new(s, self.len - 1));
        }
        runs
    }

    /// Integer key: first gap in the high half, the bits of the window after
    /// it in the low half.
    ///
    /// Two bitmaps share a key only if they agree up to the first gap and on
    /// the next 32 positions; the key is exact whenever
    /// [`Coverage::has_exact_compact_id`] holds.
    pub fn compact_id(&self) -> u64 {
        let gap = self.first_gap().unwrap_or(self.len);
        let mut window = 0u64;
        for (bit, pos) in (gap + 1..self.len).take(COMPACT_WINDOW).enumerate() {
            if self.covered(pos) {
                window |= 1 << bit;
            }
        }
        ((gap as u64) << COMPACT_WINDOW) | window
    }

    /// True when every covered position after the first gap lies inside the
    /// window encoded by [`Coverage::compact_id`].
    pub fn has_exact_compact_id(&self) -> bool {
        match (self.first_gap(), self.last_covered()) {
            (Some(gap), Some(last)) => last <= gap + COMPACT_WINDOW,
            _ => true,
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..self.len {
            f.write_str(if self.covered(pos) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn range_basics() {
        let r = Range::new(2, 4);
        assert_eq!(r.num_words(), 3);
        assert!(r.contains(3));
        assert!(!r.contains(5));
        assert!(r.overlaps(&Range::new(4, 6)));
        assert!(!r.overlaps(&Range::new(5, 6)));
        assert!(r.is_adjacent_to(&Range::new(5, 5)));
        assert_eq!(r.to_string(), "[2..4]");
    }

    #[test]
    fn distortion_distance() {
        assert_eq!(Range::new(3, 4).distortion_from(None), 3);
        // monotone continuation
        assert_eq!(Range::new(2, 3).distortion_from(Some(&Range::new(0, 1))), 0);
        // jump back over two words
        assert_eq!(Range::new(0, 0).distortion_from(Some(&Range::new(2, 3))), 4);
        assert_eq!(Range::new(4, 4).distortion_from(Some(&Range::new(0, 0))), 3);
    }

    #[test]
    fn too_long_is_an_error() {
        assert!(Coverage::new(MAX_COVERAGE_LEN).is_ok());
        let err = Coverage::new(MAX_COVERAGE_LEN + 1).unwrap_err();
        assert!(matches!(err, DecodeError::CoverageTooLong { .. }));
    }

    #[test]
    fn extend_is_copy_on_write() {
        let base = Coverage::new(5).unwrap();
        let next = base.extend(&Range::new(1, 2));
        assert_eq!(base.num_covered(), 0);
        assert_eq!(next.num_covered(), 2);
        assert_eq!(next.to_string(), "01100");
        assert_eq!(next.first_gap(), Some(0));
        assert_eq!(next.last_covered(), Some(2));
        assert_eq!(next.gaps(), vec![Range::single(0), Range::new(3, 4)]);
        assert!(!next.is_free(&Range::new(2, 3)));
        assert!(next.is_free(&Range::new(3, 4)));
        assert!(!next.is_free(&Range::new(4, 5)));
    }

    #[test]
    fn complete_coverage() {
        let c = Coverage::new(3).unwrap().extend(&Range::new(0, 2));
        assert!(c.is_complete());
        assert_eq!(c.first_gap(), None);
        assert!(c.gaps().is_empty());
        assert_eq!(c.compact_id(), 3 << 32);
    }

    #[test]
    fn empty_sentence_is_complete() {
        let c = Coverage::new(0).unwrap();
        assert!(c.is_complete());
        assert!(c.is_empty());
        assert_eq!(c.compact_id(), 0);
    }

    #[test]
    fn compact_id_encodes_gap_and_window() {
        let c = Coverage::new(6)
            .unwrap()
            .extend(&Range::single(0))
            .extend(&Range::single(3));
        // first gap 1, window starts at 2: bit for position 3 is bit 1
        assert_eq!(c.compact_id(), (1 << 32) | 0b10);
        assert!(c.has_exact_compact_id());
    }

    #[test]
    fn compact_id_is_lossy_beyond_window() {
        let n = 40;
        let a = Coverage::new(n).unwrap().extend(&Range::single(38));
        let b = Coverage::new(n).unwrap().extend(&Range::single(39));
        assert_eq!(a.compact_id(), b.compact_id());
        assert!(!a.has_exact_compact_id());
        assert_ne!(a, b);
    }

    fn arb_ranges(len: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((0..len, 0..3usize), 0..len)
    }

    proptest! {
        #[test]
        fn extend_is_pure_and_monotone(ranges in arb_ranges(12)) {
            let mut cov = Coverage::new(12).unwrap();
            for (start, width) in ranges {
                let range = Range::new(start, (start + width).min(11));
                if !cov.is_free(&range) {
                    continue;
                }
                let a = cov.extend(&range);
                let b = cov.extend(&range);
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.compact_id(), b.compact_id());
                prop_assert_eq!(a.num_covered(), cov.num_covered() + range.num_words());
                for pos in 0..12 {
                    if cov.covered(pos) {
                        prop_assert!(a.covered(pos));
                    }
                }
                let gaps: usize = a.gaps().iter().map(Range::num_words).sum();
                prop_assert_eq!(gaps, a.num_uncovered());
                cov = a;
            }
        }
    }
}
