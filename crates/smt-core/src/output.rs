//! Rendering of derivations: target text, score breakdowns, word
//! alignment, phrase segmentation, n-best lines and the search graph.

use std::fmt;

use serde::Serialize;

use crate::coverage::Range;
use crate::error::{DecodeError, DecodeResult};
use crate::kbest::{Derivation, KBestExtractor};
use crate::model::{ScoreBreakdown, ScoreLayout};
use crate::phrase::{TargetToken, Word};
use crate::search::{Arena, NodeKind, NodeStatus, SearchResult};

/// A source span together with the target words it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} |{}-{}|", self.text, self.start, self.end)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub sentence_id: u64,
    pub words: Vec<String>,
    pub score: f32,
    pub breakdown: ScoreBreakdown,
    /// `(source position, target position)` pairs.
    pub alignment: Vec<(usize, usize)>,
    /// Phrases in target order (phrase-based search only).
    pub segments: Vec<Segment>,
}

impl Translation {
    pub fn from_derivation(result: &SearchResult, derivation: &Derivation) -> DecodeResult<Self> {
        let arena = &result.arena;
        let mut rendered = Rendered::default();
        rendered.walk(arena, derivation)?;
        Ok(Self {
            sentence_id: result.sentence.id,
            words: rendered.words.iter().map(|w| w.to_string()).collect(),
            score: derivation.score,
            breakdown: breakdown(arena, derivation)?,
            alignment: rendered.alignment,
            segments: rendered.segments,
        })
    }

    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    /// `"0-0 1-2"` style alignment.
    pub fn alignment_text(&self) -> String {
        self.alignment
            .iter()
            .map(|(s, t)| format!("{s}-{t}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `"the house |0-1| is |2-2|"` style segmentation.
    pub fn segmentation_text(&self) -> String {
        self.segments
            .iter()
            .map(Segment::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `id ||| text ||| name= s.. ||| total`
    pub fn nbest_line(&self, layout: &ScoreLayout) -> String {
        let values = self.breakdown.values();
        let mut features = Vec::new();
        for p in layout.producers() {
            if p.len == 0 {
                continue;
            }
            let scores: Vec<String> = values[p.offset..p.offset + p.len]
                .iter()
                .map(|v| v.to_string())
                .collect();
            features.push(format!("{}= {}", p.name, scores.join(" ")));
        }
        format!(
            "{} ||| {} ||| {} ||| {}",
            self.sentence_id,
            self.text(),
            features.join(" "),
            self.score
        )
    }
}

/// The best translation, or `None` when no derivation covers the sentence.
pub fn best_translation(result: &SearchResult) -> DecodeResult<Option<Translation>> {
    Derivation::best(result)?
        .map(|d| Translation::from_derivation(result, &d))
        .transpose()
}

/// Up to `n` translations, best first.
pub fn nbest(result: &SearchResult, n: usize, distinct: bool) -> DecodeResult<Vec<Translation>> {
    KBestExtractor::new(result, distinct)
        .take(n)?
        .iter()
        .map(|d| Translation::from_derivation(result, d))
        .collect()
}

/// Target string of a derivation.
pub fn render_text(arena: &Arena, derivation: &Derivation) -> DecodeResult<String> {
    let mut rendered = Rendered::default();
    rendered.walk(arena, derivation)?;
    Ok(rendered
        .words
        .iter()
        .map(|w| w.as_ref())
        .collect::<Vec<&str>>()
        .join(" "))
}

/// Per-producer scores: each node's own breakdown, with every tail's
/// contribution swapped for the sub-derivation actually used.
pub fn breakdown(arena: &Arena, derivation: &Derivation) -> DecodeResult<ScoreBreakdown> {
    let node = arena.get(derivation.node)?;
    let mut total = node.breakdown.clone();
    for (child, &tail) in derivation.children.iter().zip(&node.tails) {
        total.add_assign(&breakdown(arena, child)?);
        total.sub_assign(&arena.get(tail)?.breakdown);
    }
    Ok(total)
}

#[derive(Default)]
struct Rendered {
    words: Vec<Word>,
    alignment: Vec<(usize, usize)>,
    segments: Vec<Segment>,
}

impl Rendered {
    fn walk(&mut self, arena: &Arena, d: &Derivation) -> DecodeResult<()> {
        let node = arena.get(d.node)?;
        match &node.kind {
            NodeKind::Initial { .. } => Ok(()),
            NodeKind::Phrase { candidate, .. } => {
                for child in &d.children {
                    self.walk(arena, child)?;
                }
                let offset = self.words.len();
                let range = candidate.range;
                self.words.extend(candidate.target.words().cloned());
                for &(s, t) in candidate.target.alignment() {
                    self.alignment.push((range.start + s, offset + t));
                }
                self.segments.push(Segment {
                    text: candidate.target.render(),
                    start: range.start,
                    end: range.end,
                });
                Ok(())
            }
            NodeKind::Chart { rule, span, .. } => {
                let rule = &rule.rule;
                let source_positions = self.source_positions(arena, d, &rule.source, *span)?;
                let mut target_positions = Vec::with_capacity(rule.target.tokens().len());
                for token in rule.target.tokens() {
                    match token {
                        TargetToken::Word(w) => {
                            target_positions.push(Some(self.words.len()));
                            self.words.push(w.clone());
                        }
                        TargetToken::Slot(i) => {
                            target_positions.push(None);
                            let child = d.children.get(*i).ok_or_else(|| {
                                DecodeError::DeadPredecessor {
                                    span: format!("{span} slot {}", i + 1),
                                }
                            })?;
                            self.walk(arena, child)?;
                        }
                    }
                }
                for &(s, t) in rule.target.alignment() {
                    if let (Some(Some(sp)), Some(Some(tp))) =
                        (source_positions.get(s), target_positions.get(t))
                    {
                        self.alignment.push((*sp, *tp));
                    }
                }
                Ok(())
            }
        }
    }

    /// Absolute source position of every terminal of a rule's source side.
    fn source_positions(
        &self,
        arena: &Arena,
        d: &Derivation,
        source: &[crate::chart::Symbol],
        span: Range,
    ) -> DecodeResult<Vec<Option<usize>>> {
        let mut positions = Vec::with_capacity(source.len());
        let mut pos = span.start;
        let mut nonterminal = 0;
        for symbol in source {
            if symbol.is_terminal() {
                positions.push(Some(pos));
                pos += 1;
            } else {
                positions.push(None);
                if let Some(child) = d.children.get(nonterminal) {
                    if let Some(r) = arena.get(child.node)?.range() {
                        pos = r.end + 1;
                    }
                }
                nonterminal += 1;
            }
        }
        Ok(positions)
    }
}

/// One stored node of the search graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: u32,
    pub seq: u64,
    pub status: NodeStatus,
    pub tails: Vec<u32>,
    pub arcs: Vec<u32>,
    pub score: f32,
    pub future_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchGraph {
    pub sentence_id: u64,
    pub roots: Vec<u32>,
    pub nodes: Vec<GraphNode>,
}

/// Every stored node with its back-pointers and recombination arcs, in
/// creation order.
pub fn search_graph(result: &SearchResult) -> SearchGraph {
    let nodes = result
        .arena
        .iter()
        .map(|(id, node)| {
            let target = match &node.kind {
                NodeKind::Initial { .. } => None,
                NodeKind::Phrase { candidate, .. } => Some(candidate.target.render()),
                NodeKind::Chart { rule, .. } => Some(rule.rule.target.render()),
            };
            GraphNode {
                id: id.index(),
                seq: node.seq,
                status: node.status,
                tails: node.tails.iter().map(|t| t.index()).collect(),
                arcs: node.arcs.iter().map(|a| a.index()).collect(),
                score: node.score,
                future_score: node.future_score,
                coverage: node.coverage().map(|c| c.to_string()),
                span: node.range(),
                label: node.label().map(|l| l.to_string()),
                target,
            }
        })
        .collect();
    SearchGraph {
        sentence_id: result.sentence.id,
        roots: result.roots.iter().map(|r| r.index()).collect(),
        nodes,
    }
}
