use std::sync::Arc;

use crate::context::SearchContext;
use crate::coverage::Range;
use crate::model::ScoreBreakdown;

use super::sentence::Sentence;
use super::target::TargetPhrase;

/// A scored translation of one source span.
///
/// Shared read-only by every derivation that applies it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub range: Range,
    pub target: Arc<TargetPhrase>,
    pub breakdown: ScoreBreakdown,
    /// Weighted isolation score.
    pub score: f32,
    /// Sort key: `score` plus stateful estimates.
    pub estimate: f32,
}

impl Candidate {
    pub fn new(
        ctx: &SearchContext,
        sentence: &Sentence,
        range: Range,
        target: Arc<TargetPhrase>,
    ) -> Self {
        let scored = ctx.score_target(sentence.span(&range), &target);
        Self {
            range,
            target,
            breakdown: scored.breakdown,
            score: scored.score,
            estimate: scored.estimate,
        }
    }
}
