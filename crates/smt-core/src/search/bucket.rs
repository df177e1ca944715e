//! Recombination table with beam and histogram pruning.
//!
//! A bucket holds the live representatives of one stack (phrase mode) or one
//! chart-cell label. Every arriving node is first checked against the beam,
//! then recombined with an equivalent representative if there is one, and
//! finally admitted subject to the size limit.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::trace;

use crate::error::DecodeResult;

use super::arena::{better_score, rank_cmp, score_cmp, Arena, Node, NodeId, NodeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Recombined; the new node became the representative.
    ReplacedExisting,
    /// Recombined into an existing, better representative.
    Merged,
    /// Outside the beam or worse than every member of a full bucket.
    Rejected,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BucketStats {
    pub added: usize,
    pub recombined: usize,
    pub rejected: usize,
    pub evicted: usize,
}

pub struct Bucket {
    max_size: usize,
    beam_width: f32,
    keep_arcs: bool,
    members: Vec<NodeId>,
    index: HashMap<u64, Vec<NodeId>>,
    best: f32,
    stats: BucketStats,
}

impl Bucket {
    /// `max_size` 0 means unbounded. With `keep_arcs` recombined losers are
    /// kept as arcs of the winner for k-best extraction. Otherwise a losing
    /// newcomer is freed and a displaced member is marked discarded.
    pub fn new(max_size: usize, beam_width: f32, keep_arcs: bool) -> Self {
        Self {
            max_size,
            beam_width,
            keep_arcs,
            members: Vec::new(),
            index: HashMap::new(),
            best: f32::NEG_INFINITY,
            stats: BucketStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn best_score(&self) -> f32 {
        self.best
    }

    pub fn stats(&self) -> BucketStats {
        self.stats
    }

    fn threshold(&self) -> f32 {
        self.best - self.beam_width
    }

    pub fn add(&mut self, arena: &mut Arena, id: NodeId) -> DecodeResult<AddOutcome> {
        let (future, hash) = {
            let node = arena.get(id)?;
            (node.future_score, node.recombination_hash())
        };
        if future < self.threshold() {
            return self.reject(arena, id);
        }

        let existing = match self.index.get(&hash) {
            Some(ids) => {
                let node = arena.get(id)?;
                let mut found = None;
                for &other in ids {
                    if arena.get(other)?.recombines_with(node) {
                        found = Some(other);
                        break;
                    }
                }
                found
            }
            None => None,
        };
        if let Some(other) = existing {
            return self.recombine(arena, hash, id, other);
        }

        if self.max_size > 0 && self.members.len() >= self.max_size {
            let worst = self.worst(arena)?;
            let node = arena.get(id)?;
            if rank_cmp(node, arena.get(worst)?).is_gt() {
                return self.reject(arena, id);
            }
            self.evict(arena, worst)?;
        }

        self.members.push(id);
        self.index.entry(hash).or_default().push(id);
        self.best = self.best.max(future);
        self.stats.added += 1;
        Ok(AddOutcome::Added)
    }

    fn reject(&mut self, arena: &mut Arena, id: NodeId) -> DecodeResult<AddOutcome> {
        arena.recycle(id)?;
        self.stats.rejected += 1;
        Ok(AddOutcome::Rejected)
    }

    fn recombine(
        &mut self,
        arena: &mut Arena,
        hash: u64,
        new: NodeId,
        old: NodeId,
    ) -> DecodeResult<AddOutcome> {
        self.stats.recombined += 1;
        let new_wins = better_score(arena.get(new)?, arena.get(old)?);
        let (winner, loser) = if new_wins { (new, old) } else { (old, new) };
        trace!(winner = winner.index(), loser = loser.index(), "recombined");

        if new_wins {
            replace(&mut self.members, old, new);
            if let Some(ids) = self.index.get_mut(&hash) {
                replace(ids, old, new);
            }
            let future = arena.get(new)?.future_score;
            self.best = self.best.max(future);
        }

        if self.keep_arcs {
            let loser_node = arena.get_mut(loser)?;
            loser_node.status = NodeStatus::DominatedArc;
            let mut moved = std::mem::take(&mut loser_node.arcs);
            let winner_node = arena.get_mut(winner)?;
            winner_node.arcs.push(loser);
            winner_node.arcs.append(&mut moved);
        } else if new_wins {
            // a displaced member may already be the child of a staged node
            arena.get_mut(loser)?.status = NodeStatus::Discarded;
        } else {
            arena.recycle(loser)?;
        }

        Ok(if new_wins {
            AddOutcome::ReplacedExisting
        } else {
            AddOutcome::Merged
        })
    }

    fn worst(&self, arena: &Arena) -> DecodeResult<NodeId> {
        let mut worst = self.members[0];
        for &id in &self.members[1..] {
            if rank_cmp(arena.get(id)?, arena.get(worst)?).is_gt() {
                worst = id;
            }
        }
        Ok(worst)
    }

    fn evict(&mut self, arena: &mut Arena, id: NodeId) -> DecodeResult<()> {
        let node = arena.get_mut(id)?;
        node.status = NodeStatus::Discarded;
        let hash = node.recombination_hash();
        self.members.retain(|&m| m != id);
        if let Some(ids) = self.index.get_mut(&hash) {
            ids.retain(|&m| m != id);
            if ids.is_empty() {
                self.index.remove(&hash);
            }
        }
        self.stats.evicted += 1;
        Ok(())
    }

    /// Keeps the best `max_size` members inside the beam; the rest are
    /// marked discarded. Returns the number removed.
    pub fn prune(&mut self, arena: &mut Arena) -> DecodeResult<usize> {
        let sorted = self.sorted(arena)?;
        let threshold = self.threshold();
        let mut removed = 0;
        for (rank, id) in sorted.into_iter().enumerate() {
            let outside = arena.get(id)?.future_score < threshold;
            if outside || (self.max_size > 0 && rank >= self.max_size) {
                self.evict(arena, id)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Members best first by future score.
    pub fn sorted(&self, arena: &Arena) -> DecodeResult<Vec<NodeId>> {
        self.sorted_by(arena, rank_cmp)
    }

    /// Members best first by score, the order the frontier expects.
    pub fn sorted_by_score(&self, arena: &Arena) -> DecodeResult<Vec<NodeId>> {
        self.sorted_by(arena, score_cmp)
    }

    fn sorted_by(
        &self,
        arena: &Arena,
        cmp: fn(&Node, &Node) -> Ordering,
    ) -> DecodeResult<Vec<NodeId>> {
        let mut nodes = Vec::with_capacity(self.members.len());
        for &id in &self.members {
            nodes.push((id, arena.get(id)?));
        }
        nodes.sort_by(|a, b| cmp(a.1, b.1));
        Ok(nodes.into_iter().map(|(id, _)| id).collect())
    }

    /// Moves every member of `other` into this bucket.
    pub fn absorb(&mut self, arena: &mut Arena, other: Bucket) -> DecodeResult<()> {
        for id in other.members {
            self.add(arena, id)?;
        }
        Ok(())
    }
}

fn replace(ids: &mut [NodeId], old: NodeId, new: NodeId) {
    if let Some(slot) = ids.iter_mut().find(|m| **m == old) {
        *slot = new;
    }
}
