use std::sync::Arc;

use crate::coverage::Range;
use crate::phrase::Sentence;

use super::{
    ChartExtension, FeatureFunction, FeatureState, PhraseExtension, StateRef, StatefulFeature,
};

/// Linear reordering cost: minus the jump from the end of the previously
/// translated phrase to the start of the next one.
pub struct Distortion;

/// End of the last translated range, `None` at sentence start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LastEnd(Option<usize>);

impl FeatureFunction for Distortion {
    fn name(&self) -> &str {
        "Distortion"
    }
}

impl StatefulFeature for Distortion {
    fn empty_state(&self, _sentence: &Sentence) -> StateRef {
        Arc::new(LastEnd(None))
    }

    fn evaluate_phrase(
        &self,
        ext: &PhraseExtension<'_>,
        prev: &dyn FeatureState,
        out: &mut [f32],
    ) -> StateRef {
        let prev_end = prev
            .as_any()
            .downcast_ref::<LastEnd>()
            .and_then(|s| s.0);
        let distance = ext
            .range
            .distortion_from(prev_end.map(Range::single).as_ref());
        out[0] = -(distance as f32);
        Arc::new(LastEnd(Some(ext.range.end)))
    }

    /// Reordering in grammar mode is captured by the rules themselves.
    fn evaluate_chart(
        &self,
        _ext: &ChartExtension<'_>,
        _children: &[&dyn FeatureState],
        _out: &mut [f32],
    ) -> StateRef {
        Arc::new(LastEnd(None))
    }
}
