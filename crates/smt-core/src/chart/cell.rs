//! Chart cells: the derivations of one source span, grouped by label.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::coverage::Range;
use crate::error::DecodeResult;
use crate::search::{AddOutcome, Arena, Bucket, NodeId};
use crate::settings::SearchSettings;

use super::grammar::Label;

pub struct ChartCell {
    span: Range,
    stack_size: usize,
    beam_width: f32,
    keep_arcs: bool,
    buckets: BTreeMap<Label, Bucket>,
    /// Members of each label best score first, filled by [`ChartCell::finish`].
    sorted: BTreeMap<Label, Arc<[NodeId]>>,
}

impl ChartCell {
    pub fn new(span: Range, settings: &SearchSettings, keep_arcs: bool) -> Self {
        Self {
            span,
            stack_size: settings.stack_size,
            beam_width: settings.beam_width,
            keep_arcs,
            buckets: BTreeMap::new(),
            sorted: BTreeMap::new(),
        }
    }

    /// Empty cell with the same limits, used to stage the unary pass.
    pub fn staging(&self) -> Self {
        Self {
            span: self.span,
            stack_size: self.stack_size,
            beam_width: self.beam_width,
            keep_arcs: self.keep_arcs,
            buckets: BTreeMap::new(),
            sorted: BTreeMap::new(),
        }
    }

    pub fn span(&self) -> Range {
        self.span
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Bucket::is_empty)
    }

    pub fn add(&mut self, arena: &mut Arena, label: &Label, id: NodeId) -> DecodeResult<AddOutcome> {
        let (stack_size, beam_width, keep_arcs) = (self.stack_size, self.beam_width, self.keep_arcs);
        self.buckets
            .entry(label.clone())
            .or_insert_with(|| Bucket::new(stack_size, beam_width, keep_arcs))
            .add(arena, id)
    }

    /// Moves every member of `staged` in, label by label.
    pub fn absorb(&mut self, arena: &mut Arena, staged: ChartCell) -> DecodeResult<()> {
        for (label, bucket) in staged.buckets {
            for &id in bucket.members() {
                self.add(arena, &label, id)?;
            }
        }
        Ok(())
    }

    pub fn prune(&mut self, arena: &mut Arena) -> DecodeResult<usize> {
        let mut removed = 0;
        for bucket in self.buckets.values_mut() {
            removed += bucket.prune(arena)?;
        }
        Ok(removed)
    }

    /// Freezes the sorted member lists read by larger spans.
    pub fn finish(&mut self, arena: &Arena) -> DecodeResult<()> {
        self.sorted.clear();
        for (label, bucket) in &self.buckets {
            if bucket.is_empty() {
                continue;
            }
            self.sorted
                .insert(label.clone(), bucket.sorted_by_score(arena)?.into());
        }
        debug!(
            span = %self.span,
            labels = self.sorted.len(),
            size = self.len(),
            "cell closed"
        );
        Ok(())
    }

    /// Labels with at least one member, in label order.
    pub fn labels(&self) -> impl Iterator<Item = &Label> + '_ {
        self.sorted.keys()
    }

    /// Members of `label` best score first; empty before [`ChartCell::finish`].
    pub fn members(&self, label: &Label) -> Option<Arc<[NodeId]>> {
        self.sorted.get(label).cloned()
    }

    /// Members of every label (or only `label`), best score first.
    pub fn ranked(&self, arena: &Arena, label: Option<&Label>) -> DecodeResult<Vec<NodeId>> {
        let mut ids: Vec<(NodeId, f32, u64)> = Vec::new();
        for (l, bucket) in &self.buckets {
            if label.is_some_and(|wanted| wanted != l) {
                continue;
            }
            for &id in bucket.members() {
                let node = arena.get(id)?;
                ids.push((id, node.score, node.seq));
            }
        }
        ids.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        Ok(ids.into_iter().map(|(id, _, _)| id).collect())
    }
}
