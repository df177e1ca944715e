//! Per-sentence storage for derivation nodes.
//!
//! Nodes reference each other by [`NodeId`]. An id carries the generation of
//! its slot, so an id that outlives a recycled node is detected instead of
//! silently reading its replacement.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::chart::{Label, RuleCandidate};
use crate::coverage::{Coverage, Range};
use crate::error::{DecodeError, DecodeResult};
use crate::model::{ScoreBreakdown, StateRef};
use crate::phrase::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Empty hypothesis at sentence start (phrase mode).
    Initial { coverage: Coverage },
    Phrase {
        candidate: Arc<Candidate>,
        coverage: Coverage,
    },
    Chart {
        rule: Arc<RuleCandidate>,
        span: Range,
        /// Built by the unary closure pass.
        unary: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Representative,
    DominatedArc,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Creation order within the sentence; breaks score ties.
    pub seq: u64,
    /// Predecessor (phrase) or one child per nonterminal (chart).
    pub tails: Vec<NodeId>,
    pub kind: NodeKind,
    pub score: f32,
    /// `score` plus the future-cost estimate of what remains untranslated.
    pub future_score: f32,
    pub breakdown: ScoreBreakdown,
    pub states: Box<[StateRef]>,
    pub status: NodeStatus,
    /// Dominated nodes recombined into this one.
    pub arcs: Vec<NodeId>,
}

impl Node {
    pub fn new(
        kind: NodeKind,
        tails: Vec<NodeId>,
        score: f32,
        future_score: f32,
        breakdown: ScoreBreakdown,
        states: Box<[StateRef]>,
    ) -> Self {
        Self {
            seq: 0,
            tails,
            kind,
            score,
            future_score,
            breakdown,
            states,
            status: NodeStatus::Representative,
            arcs: Vec::new(),
        }
    }

    pub fn coverage(&self) -> Option<&Coverage> {
        match &self.kind {
            NodeKind::Initial { coverage } | NodeKind::Phrase { coverage, .. } => Some(coverage),
            NodeKind::Chart { .. } => None,
        }
    }

    pub fn label(&self) -> Option<&Label> {
        match &self.kind {
            NodeKind::Chart { rule, .. } => Some(&rule.rule.lhs),
            _ => None,
        }
    }

    /// Source range translated by this node itself.
    pub fn range(&self) -> Option<Range> {
        match &self.kind {
            NodeKind::Initial { .. } => None,
            NodeKind::Phrase { candidate, .. } => Some(candidate.range),
            NodeKind::Chart { span, .. } => Some(*span),
        }
    }

    /// Hash of the recombination key.
    pub fn recombination_hash(&self) -> u64 {
        let mut h = std::collections::hash_map::DefaultHasher::new();
        match &self.kind {
            NodeKind::Initial { coverage } | NodeKind::Phrase { coverage, .. } => {
                coverage.hash(&mut h)
            }
            NodeKind::Chart { rule, .. } => rule.rule.lhs.hash(&mut h),
        }
        for s in self.states.iter() {
            h.write_u64(s.hash_state());
        }
        h.finish()
    }

    /// True when no downstream decision can tell the two nodes apart.
    pub fn recombines_with(&self, other: &Node) -> bool {
        let same_kind = match (&self.kind, &other.kind) {
            (NodeKind::Initial { coverage: a }, NodeKind::Initial { coverage: b }) => a == b,
            (NodeKind::Phrase { coverage: a, .. }, NodeKind::Phrase { coverage: b, .. }) => a == b,
            (NodeKind::Chart { rule: ra, .. }, NodeKind::Chart { rule: rb, .. }) => {
                ra.rule.lhs == rb.rule.lhs
            }
            _ => false,
        };
        same_kind
            && self.states.len() == other.states.len()
            && self
                .states
                .iter()
                .zip(other.states.iter())
                .all(|(a, b)| a.eq_state(b.as_ref()))
    }
}

/// Higher score first, earlier node on ties. Orders recombination and the
/// sorted lists fed to the frontier.
pub fn score_cmp(a: &Node, b: &Node) -> std::cmp::Ordering {
    b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq))
}

pub fn better_score(a: &Node, b: &Node) -> bool {
    score_cmp(a, b).is_lt()
}

/// Higher future score first, earlier node on ties. Orders pruning.
pub fn rank_cmp(a: &Node, b: &Node) -> std::cmp::Ordering {
    b.future_score
        .total_cmp(&a.future_score)
        .then(a.seq.cmp(&b.seq))
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_seq: u64,
    live: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `node`, stamping its creation sequence number.
    pub fn alloc(&mut self, mut node: Node) -> NodeId {
        node.seq = self.next_seq;
        self.next_seq += 1;
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: NodeId) -> DecodeResult<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(DecodeError::StaleNode {
                index: id.index,
                generation: id.generation,
            })
    }

    pub fn get_mut(&mut self, id: NodeId) -> DecodeResult<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(DecodeError::StaleNode {
                index: id.index,
                generation: id.generation,
            })
    }

    /// Frees a node nothing refers to yet; its id becomes stale.
    pub fn recycle(&mut self, id: NodeId) -> DecodeResult<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation && s.node.is_some())
            .ok_or(DecodeError::StaleNode {
                index: id.index,
                generation: id.generation,
            })?;
        let node = slot.node.take().ok_or(DecodeError::StaleNode {
            index: id.index,
            generation: id.generation,
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Ok(node)
    }

    /// Releases every node at once; all outstanding ids become stale.
    pub fn reset(&mut self) {
        self.free.clear();
        for (i, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(i as u32);
        }
        self.next_seq = 0;
        self.live = 0;
    }

    /// Number of stored nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Every stored node in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        let mut nodes: Vec<(NodeId, &Node)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.node.as_ref().map(|n| {
                    (
                        NodeId {
                            index: i as u32,
                            generation: s.generation,
                        },
                        n,
                    )
                })
            })
            .collect();
        nodes.sort_by_key(|(_, n)| n.seq);
        nodes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(score: f32) -> Node {
        Node::new(
            NodeKind::Initial {
                coverage: Coverage::new(2).unwrap(),
            },
            vec![],
            score,
            score,
            ScoreBreakdown::zeros(0),
            Box::new([]),
        )
    }

    #[test]
    fn alloc_stamps_sequence() {
        let mut arena = Arena::new();
        let a = arena.alloc(node(1.0));
        let b = arena.alloc(node(2.0));
        assert_eq!(arena.get(a).unwrap().seq, 0);
        assert_eq!(arena.get(b).unwrap().seq, 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn recycled_id_is_stale() {
        let mut arena = Arena::new();
        let a = arena.alloc(node(1.0));
        arena.recycle(a).unwrap();
        assert!(matches!(arena.get(a), Err(DecodeError::StaleNode { .. })));
        assert!(arena.recycle(a).is_err());

        let b = arena.alloc(node(2.0));
        assert_eq!(b.index(), a.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_err());
        assert_eq!(arena.get(b).unwrap().score, 2.0);
    }

    #[test]
    fn reset_invalidates_everything() {
        let mut arena = Arena::new();
        let ids: Vec<NodeId> = (0..3).map(|i| arena.alloc(node(i as f32))).collect();
        arena.reset();
        assert!(arena.is_empty());
        for id in ids {
            assert!(arena.get(id).is_err());
        }
        let fresh = arena.alloc(node(0.0));
        assert_eq!(arena.get(fresh).unwrap().seq, 0);
        assert_eq!(fresh.index(), 0);
    }

    #[test]
    fn ordering_helpers_break_ties_by_sequence() {
        let mut arena = Arena::new();
        let a = arena.alloc(node(1.0));
        let b = arena.alloc(node(1.0));
        let c = arena.alloc(node(3.0));
        let (na, nb, nc) = (
            arena.get(a).unwrap(),
            arena.get(b).unwrap(),
            arena.get(c).unwrap(),
        );
        assert!(better_score(na, nb));
        assert!(!better_score(nb, na));
        assert!(better_score(nc, na));
        let mut v = vec![nb, nc, na];
        v.sort_by(|x, y| rank_cmp(x, y));
        let seqs: Vec<u64> = v.iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![2, 0, 1]);
    }

    #[test]
    fn iter_in_creation_order() {
        let mut arena = Arena::new();
        let a = arena.alloc(node(0.0));
        let _b = arena.alloc(node(0.0));
        arena.recycle(a).unwrap();
        let _c = arena.alloc(node(0.0));
        let seqs: Vec<u64> = arena.iter().map(|(_, n)| n.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }
}
