//! Lazy k-best extraction over the recombination arcs of a finished search.
//!
//! Every stored node is a vertex whose incoming edges are the node itself
//! and the arcs recombined into it. A derivation picks one edge per vertex
//! and, for each tail, one ranked derivation of that tail. Ranked lists are
//! grown on demand: a vertex's next derivation is found by bumping one tail
//! rank of the derivation returned before it.
//!
//! Extraction and rendering recurse once per derivation level (per phrase in
//! phrase mode), so very long sentences want a thread with a large stack.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::trace;

use crate::error::{DecodeError, DecodeResult};
use crate::output;
use crate::search::{Arena, NodeId, SearchResult};

/// One full derivation: the node applied at the top and the derivations of
/// its tails, in tail order.
#[derive(Debug, Clone)]
pub struct Derivation {
    pub node: NodeId,
    pub children: Vec<Derivation>,
    pub score: f32,
}

impl Derivation {
    /// The derivation that follows representatives only.
    pub fn best(result: &SearchResult) -> DecodeResult<Option<Derivation>> {
        result
            .best()
            .map(|id| Self::along_representatives(&result.arena, id))
            .transpose()
    }

    fn along_representatives(arena: &Arena, id: NodeId) -> DecodeResult<Derivation> {
        let node = arena.get(id)?;
        let children = node
            .tails
            .iter()
            .map(|&tail| Self::along_representatives(arena, tail))
            .collect::<DecodeResult<_>>()?;
        Ok(Derivation {
            node: id,
            children,
            score: node.score,
        })
    }

    /// Nodes of the derivation, top first.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut out = vec![self.node];
        for child in &self.children {
            out.extend(child.nodes());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Vertex {
    /// Joins every top-level representative.
    Root,
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Edge {
    /// Chooses one top-level representative.
    Root(NodeId),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct Hyp {
    edge: Edge,
    ranks: Box<[usize]>,
    score: f32,
}

struct Queued {
    hyp: Hyp,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hyp
            .score
            .total_cmp(&other.hyp.score)
            .then(other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct VertexState {
    derived: Vec<Hyp>,
    queue: BinaryHeap<Queued>,
    seen: HashSet<(Edge, Box<[usize]>)>,
    /// Last derived hypothesis whose successors are not queued yet.
    unexpanded: Option<Hyp>,
    next_seq: u64,
}

impl VertexState {
    fn push(&mut self, hyp: Hyp) {
        self.queue.push(Queued {
            hyp,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }
}

/// Hands out derivations of a search result best first.
pub struct KBestExtractor<'r> {
    result: &'r SearchResult,
    vertices: HashMap<Vertex, VertexState>,
    rank: usize,
    distinct: bool,
    outputs: HashSet<String>,
}

impl<'r> KBestExtractor<'r> {
    /// With `distinct`, derivations whose target string was already returned
    /// are skipped.
    pub fn new(result: &'r SearchResult, distinct: bool) -> Self {
        Self {
            result,
            vertices: HashMap::new(),
            rank: 0,
            distinct,
            outputs: HashSet::new(),
        }
    }

    pub fn next_derivation(&mut self) -> DecodeResult<Option<Derivation>> {
        if self.result.roots.is_empty() {
            return Ok(None);
        }
        loop {
            let k = self.rank;
            if !self.kth(Vertex::Root, k)? {
                return Ok(None);
            }
            self.rank += 1;
            let derivation = self.build(Vertex::Root, k)?;
            if self.distinct {
                let text = output::render_text(&self.result.arena, &derivation)?;
                if !self.outputs.insert(text) {
                    trace!(rank = k, "duplicate output skipped");
                    continue;
                }
            }
            return Ok(Some(derivation));
        }
    }

    /// Up to `n` derivations, best first.
    pub fn take(mut self, n: usize) -> DecodeResult<Vec<Derivation>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.next_derivation()? {
                Some(d) => out.push(d),
                None => break,
            }
        }
        Ok(out)
    }

    fn arena(&self) -> &'r Arena {
        &self.result.arena
    }

    fn incoming(&self, vertex: Vertex) -> DecodeResult<Vec<Edge>> {
        match vertex {
            Vertex::Root => Ok(self.result.roots.iter().map(|&r| Edge::Root(r)).collect()),
            Vertex::Node(id) => {
                let node = self.arena().get(id)?;
                let mut edges = Vec::with_capacity(node.arcs.len() + 1);
                edges.push(Edge::Node(id));
                edges.extend(node.arcs.iter().map(|&a| Edge::Node(a)));
                Ok(edges)
            }
        }
    }

    /// Score the edge was built with, and its tail vertices.
    fn edge_parts(&self, edge: Edge) -> DecodeResult<(f32, Vec<NodeId>)> {
        match edge {
            Edge::Root(r) => Ok((self.arena().get(r)?.score, vec![r])),
            Edge::Node(e) => {
                let node = self.arena().get(e)?;
                Ok((node.score, node.tails.clone()))
            }
        }
    }

    /// Edge score with each tail's best derivation swapped for the ranked one.
    fn score(&self, edge: Edge, ranks: &[usize]) -> DecodeResult<f32> {
        let (mut score, tails) = self.edge_parts(edge)?;
        for (&tail, &rank) in tails.iter().zip(ranks) {
            let sub = self.derived(Vertex::Node(tail), rank)?.score;
            score += sub - self.arena().get(tail)?.score;
        }
        Ok(score)
    }

    fn derived(&self, vertex: Vertex, k: usize) -> DecodeResult<&Hyp> {
        self.vertices
            .get(&vertex)
            .and_then(|v| v.derived.get(k))
            .ok_or_else(|| missing(vertex))
    }

    fn init(&mut self, vertex: Vertex) -> DecodeResult<()> {
        let mut state = VertexState::default();
        for edge in self.incoming(vertex)? {
            let (_, tails) = self.edge_parts(edge)?;
            let mut complete = true;
            for &tail in &tails {
                complete &= self.kth(Vertex::Node(tail), 0)?;
            }
            if !complete {
                continue;
            }
            let ranks: Box<[usize]> = vec![0; tails.len()].into_boxed_slice();
            let score = self.score(edge, &ranks)?;
            state.seen.insert((edge, ranks.clone()));
            state.push(Hyp { edge, ranks, score });
        }
        self.vertices.insert(vertex, state);
        Ok(())
    }

    /// Makes sure the vertex has a derivation of rank `k` if one exists.
    fn kth(&mut self, vertex: Vertex, k: usize) -> DecodeResult<bool> {
        if !self.vertices.contains_key(&vertex) {
            self.init(vertex)?;
        }
        loop {
            let state = self.state_mut(vertex)?;
            if state.derived.len() > k {
                return Ok(true);
            }
            if let Some(last) = state.unexpanded.take() {
                self.push_successors(vertex, &last)?;
            }
            let state = self.state_mut(vertex)?;
            let Some(next) = state.queue.pop() else {
                return Ok(false);
            };
            state.derived.push(next.hyp.clone());
            state.unexpanded = Some(next.hyp);
        }
    }

    fn push_successors(&mut self, vertex: Vertex, hyp: &Hyp) -> DecodeResult<()> {
        let (_, tails) = self.edge_parts(hyp.edge)?;
        for (i, &tail) in tails.iter().enumerate() {
            let mut ranks = hyp.ranks.clone();
            ranks[i] += 1;
            if self.state_mut(vertex)?.seen.contains(&(hyp.edge, ranks.clone())) {
                continue;
            }
            if !self.kth(Vertex::Node(tail), ranks[i])? {
                continue;
            }
            let score = self.score(hyp.edge, &ranks)?;
            let state = self.state_mut(vertex)?;
            state.seen.insert((hyp.edge, ranks.clone()));
            state.push(Hyp {
                edge: hyp.edge,
                ranks,
                score,
            });
        }
        Ok(())
    }

    fn state_mut(&mut self, vertex: Vertex) -> DecodeResult<&mut VertexState> {
        self.vertices
            .get_mut(&vertex)
            .ok_or_else(|| missing(vertex))
    }

    fn build(&self, vertex: Vertex, k: usize) -> DecodeResult<Derivation> {
        let hyp = self.derived(vertex, k)?;
        match hyp.edge {
            Edge::Root(r) => {
                let mut top = self.build(Vertex::Node(r), hyp.ranks[0])?;
                top.score = hyp.score;
                Ok(top)
            }
            Edge::Node(e) => {
                let tails = &self.arena().get(e)?.tails;
                let children = tails
                    .iter()
                    .zip(hyp.ranks.iter())
                    .map(|(&tail, &rank)| self.build(Vertex::Node(tail), rank))
                    .collect::<DecodeResult<_>>()?;
                Ok(Derivation {
                    node: e,
                    children,
                    score: hyp.score,
                })
            }
        }
    }
}

fn missing(vertex: Vertex) -> DecodeError {
    match vertex {
        Vertex::Node(id) => DecodeError::DeadPredecessor {
            span: format!("k-best vertex {}", id.index()),
        },
        Vertex::Root => DecodeError::DeadPredecessor {
            span: "k-best root".to_string(),
        },
    }
}
