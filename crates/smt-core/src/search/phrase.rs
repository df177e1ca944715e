//! Phrase-based search: stacks by number of covered words, each filled by
//! cube pruning over the edges leading into it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, debug_span, trace};

use crate::context::{CancelToken, SearchContext};
use crate::coverage::{Coverage, Range};
use crate::error::{DecodeError, DecodeResult, SortedList};
use crate::future::FutureCostTable;
use crate::model::{PhraseExtension, ScoreBreakdown};
use crate::phrase::{CandidateCollection, PhraseSource, Sentence};

use super::arena::{Arena, Node, NodeId, NodeKind, NodeStatus};
use super::frontier::{check_sorted, CubeSource, Frontier};
use super::stack::Stack;
use super::SearchResult;

/// Predecessors sharing one coverage, all extended by the candidates of one
/// source range.
pub(crate) struct Edge {
    preds: Arc<[NodeId]>,
    range: Range,
    /// Coverage after the extension.
    coverage: Coverage,
    /// Future cost of `coverage`; constant over the whole cube.
    future: f32,
}

/// Decodes one sentence with the phrase-based search.
pub fn decode_phrase(
    ctx: &SearchContext,
    sentence: &Sentence,
    source: &dyn PhraseSource,
    cancel: &CancelToken,
) -> DecodeResult<SearchResult> {
    let _span = debug_span!("decode_phrase", sentence = sentence.id, words = sentence.len())
        .entered();
    let settings = &ctx.settings().search;
    let mut sentence = sentence.clone();
    if settings.monotone_at_punctuation {
        sentence.set_monotone_at_punctuation();
    }
    let n = sentence.len();
    let candidates = CandidateCollection::collect(ctx, &sentence, source);
    let mut future = FutureCostTable::build(n, &candidates);
    let keep_arcs = ctx.settings().nbest.size > 0;

    let mut arena = Arena::new();
    let mut stacks: Vec<Stack> = (0..=n)
        .map(|k| Stack::new(k, settings, keep_arcs))
        .collect();
    let mut pending: Vec<Vec<Edge>> = (0..=n).map(|_| Vec::new()).collect();

    let empty = Coverage::new(n)?;
    let initial_future = future.estimate(&empty);
    let initial = arena.alloc(Node::new(
        NodeKind::Initial { coverage: empty },
        Vec::new(),
        0.0,
        initial_future,
        ScoreBreakdown::zeros(ctx.layout().len()),
        ctx.empty_states(&sentence),
    ));
    stacks[0].add(&mut arena, initial)?;

    let mut pops = 0;
    for k in 0..=n {
        cancel.check()?;
        let _stack = debug_span!("stack", k).entered();
        if k > 0 {
            let edges = std::mem::take(&mut pending[k]);
            let mut expansion = Expansion {
                ctx,
                sentence: &sentence,
                candidates: &candidates,
                arena: &mut arena,
                stack: &mut stacks[k],
                pops: HashMap::new(),
            };
            pops += expansion.run(edges)?;
            stacks[k].prune(&mut arena)?;
        }
        if k < n {
            for edge in create_edges(ctx, &sentence, &candidates, &mut future, &arena, &stacks[k])? {
                let target = edge.coverage.num_covered();
                pending[target].push(edge);
            }
        }
    }

    let roots = stacks[n].by_score(&arena)?;
    debug!(
        nodes = arena.len(),
        pops,
        complete = roots.len(),
        "phrase search done"
    );
    ctx.cleanup_after_sentence(sentence.id);
    source.cleanup_after_sentence(sentence.id);
    Ok(SearchResult {
        sentence,
        arena,
        roots,
        pops,
    })
}

/// True when extending `coverage` by `range` still allows every gap to be
/// reached within the distortion limit.
pub(crate) fn distortion_allows(coverage: &Coverage, range: &Range, limit: Option<usize>) -> bool {
    let Some(limit) = limit else {
        return true;
    };
    let Some(gap) = coverage.first_gap() else {
        return false;
    };
    if range.start == gap {
        return true;
    }
    Range::single(gap).distortion_from(Some(range)) <= limit
}

fn create_edges(
    ctx: &SearchContext,
    sentence: &Sentence,
    candidates: &CandidateCollection,
    future: &mut FutureCostTable,
    arena: &Arena,
    stack: &Stack,
) -> DecodeResult<Vec<Edge>> {
    let limit = ctx.settings().search.distortion_limit();
    let n = sentence.len();
    let mut edges = Vec::new();

    for container in stack.containers(arena)? {
        let coverage = &container.coverage;
        let Some(first_gap) = coverage.first_gap() else {
            continue;
        };
        let scores: Vec<f32> = container
            .nodes
            .iter()
            .take(2)
            .map(|&id| arena.get(id).map(|node| node.score))
            .collect::<DecodeResult<_>>()?;
        check_sorted(SortedList::Predecessors, || coverage.to_string(), &scores)?;
        let all: Arc<[NodeId]> = container.nodes.into();

        for start in first_gap..n {
            if coverage.covered(start) {
                continue;
            }
            for end in start..n.min(start + candidates.max_len()) {
                if coverage.covered(end) {
                    break;
                }
                let range = Range::new(start, end);
                let list = candidates.get(&range);
                if list.is_empty()
                    || !distortion_allows(coverage, &range, limit)
                    || sentence.crosses_wall(coverage, &range)
                {
                    continue;
                }
                let estimates: Vec<f32> = list.iter().take(2).map(|c| c.estimate).collect();
                check_sorted(SortedList::Candidates, || range.to_string(), &estimates)?;

                let preds = match limit {
                    None => all.clone(),
                    Some(max) => {
                        let mut kept = Vec::with_capacity(all.len());
                        for &id in all.iter() {
                            let prev = arena.get(id)?.range();
                            if range.distortion_from(prev.as_ref()) <= max {
                                kept.push(id);
                            }
                        }
                        if kept.is_empty() {
                            continue;
                        }
                        kept.into()
                    }
                };
                let next = coverage.extend(&range);
                let estimate = future.estimate(&next);
                trace!(from = %coverage, range = %range, preds = preds.len(), "edge");
                edges.push(Edge {
                    preds,
                    range,
                    coverage: next,
                    future: estimate,
                });
            }
        }
    }
    Ok(edges)
}

/// Fills one stack from the edges leading into it.
struct Expansion<'s> {
    ctx: &'s SearchContext,
    sentence: &'s Sentence,
    candidates: &'s CandidateCollection,
    arena: &'s mut Arena,
    stack: &'s mut Stack,
    /// Pops per destination coverage, for the diversity pass.
    pops: HashMap<Coverage, usize>,
}

impl Expansion<'_> {
    fn run(&mut self, edges: Vec<Edge>) -> DecodeResult<usize> {
        let ctx = self.ctx;
        let settings = &ctx.settings().search;
        let mut frontier = Frontier::new();
        for edge in edges {
            let dims = [edge.preds.len(), self.candidates.get(&edge.range).len()];
            frontier.add_cube(&*self, edge, &dims)?;
        }
        let cubes = frontier.num_cubes();
        let mut pops = frontier.run(self, settings.pop_limit)?;

        let diversity = settings.diversity;
        if diversity > 0 {
            for (coverage, mut group) in frontier.into_groups(|edge| edge.coverage.clone()) {
                let done = self.pops.get(&coverage).copied().unwrap_or(0);
                if done < diversity {
                    pops += group.run(self, diversity - done)?;
                }
            }
        }
        debug!(cubes, pops, size = self.stack.len(), "stack expanded");
        Ok(pops)
    }
}

impl CubeSource for Expansion<'_> {
    type Cube = Edge;

    fn speculative(&self, edge: &Edge, coords: &[u32]) -> DecodeResult<f32> {
        let pred = self.arena.get(edge.preds[coords[0] as usize])?;
        let candidate = &self.candidates.get(&edge.range)[coords[1] as usize];
        Ok(pred.score + candidate.estimate + edge.future)
    }

    fn materialize(&mut self, edge: &Edge, coords: &[u32]) -> DecodeResult<()> {
        let pred_id = edge.preds[coords[0] as usize];
        let candidate = self.candidates.get(&edge.range)[coords[1] as usize].clone();
        let pred = self.arena.get(pred_id)?;
        if pred.status != NodeStatus::Representative {
            return Err(DecodeError::DeadPredecessor {
                span: self.describe(edge),
            });
        }

        let ext = PhraseExtension {
            sentence: self.sentence,
            range: edge.range,
            target: &candidate.target,
            coverage: &edge.coverage,
        };
        let mut breakdown = &pred.breakdown + &candidate.breakdown;
        let (delta, states) = self.ctx.evaluate_phrase(&ext, &pred.states, &mut breakdown);
        let score = pred.score + candidate.score + delta;
        if score.is_nan() {
            return Err(DecodeError::InvalidScore {
                span: self.describe(edge),
            });
        }

        let node = Node::new(
            NodeKind::Phrase {
                candidate,
                coverage: edge.coverage.clone(),
            },
            vec![pred_id],
            score,
            score + edge.future,
            breakdown,
            states,
        );
        let id = self.arena.alloc(node);
        let outcome = self.stack.add(self.arena, id)?;
        trace!(node = id.index(), pred = pred_id.index(), score, ?outcome, "hypothesis");
        *self.pops.entry(edge.coverage.clone()).or_default() += 1;
        Ok(())
    }

    fn describe(&self, edge: &Edge) -> String {
        format!("{} -> {}", edge.range, edge.coverage)
    }
}
