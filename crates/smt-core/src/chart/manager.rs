//! Grammar-based search: spans by increasing width, each cell filled by
//! N-dimensional cube pruning over the completed rules of the span, then a
//! unary closure pass.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, debug_span, trace};

use crate::context::{CancelToken, SearchContext};
use crate::coverage::Range;
use crate::error::{DecodeError, DecodeResult, SortedList};
use crate::model::{ChartExtension, StateRef};
use crate::phrase::{Sentence, TargetPhrase};
use crate::search::{
    check_sorted, Arena, CubeSource, Frontier, Node, NodeId, NodeKind, NodeStatus, SearchResult,
};

use super::active::{ActiveChart, DottedRule};
use super::cell::ChartCell;
use super::grammar::{Grammar, Label, Rule, RuleCandidate, Symbol, TrieId};

/// A completed rule match over one span: the sorted rules sharing a source
/// side and the sorted members bound to each nonterminal.
pub(crate) struct Application {
    rules: Arc<[Arc<RuleCandidate>]>,
    slots: Vec<Arc<[NodeId]>>,
    unary: bool,
}

/// Decodes one sentence with the grammar-based search. Grammars are tried
/// in order; each limits the width of the spans its rules may cover.
pub fn decode_chart(
    ctx: &SearchContext,
    sentence: &Sentence,
    grammars: &[Grammar],
    cancel: &CancelToken,
) -> DecodeResult<SearchResult> {
    let _span = debug_span!("decode_chart", sentence = sentence.id, words = sentence.len())
        .entered();
    let n = sentence.len();
    let mut chart = Chart {
        ctx,
        sentence,
        grammars,
        arena: Arena::new(),
        cells: (0..n * n).map(|_| None).collect(),
        active: ActiveChart::new(n),
        rule_lists: HashMap::new(),
        keep_arcs: ctx.settings().nbest.size > 0,
        pops: 0,
    };
    let unknown = chart.unknown_rules();

    for width in 1..=n {
        for start in 0..=n - width {
            cancel.check()?;
            let span = Range::new(start, start + width - 1);
            let extra = if width == 1 { unknown[start].clone() } else { None };
            chart.process(span, extra)?;
        }
    }

    let roots = match chart.cell(&Range::new(0, n.saturating_sub(1))) {
        Some(top) if n > 0 => {
            let goal = ctx.settings().chart.goal_label.as_deref().map(Label::from);
            top.ranked(&chart.arena, goal.as_ref())?
        }
        _ => Vec::new(),
    };
    debug!(
        nodes = chart.arena.len(),
        pops = chart.pops,
        complete = roots.len(),
        "chart search done"
    );
    ctx.cleanup_after_sentence(sentence.id);
    Ok(SearchResult {
        sentence: sentence.clone(),
        arena: chart.arena,
        roots,
        pops: chart.pops,
    })
}

struct Chart<'a> {
    ctx: &'a SearchContext,
    sentence: &'a Sentence,
    grammars: &'a [Grammar],
    arena: Arena,
    /// `cells[start * n + end]`, filled as spans are processed.
    cells: Vec<Option<ChartCell>>,
    active: ActiveChart,
    /// Scored and sorted rules per trie node, shared by every span.
    rule_lists: HashMap<(usize, TrieId), Arc<[Arc<RuleCandidate>]>>,
    keep_arcs: bool,
    pops: usize,
}

impl Chart<'_> {
    fn cell(&self, span: &Range) -> Option<&ChartCell> {
        self.cells
            .get(span.start * self.sentence.len() + span.end)?
            .as_ref()
    }

    /// Pass-through rules for words no grammar has a terminal rule for.
    fn unknown_rules(&self) -> Vec<Option<Arc<[Arc<RuleCandidate>]>>> {
        let settings = self.ctx.settings();
        let num_scores = self.grammars.first().map_or(0, Grammar::num_scores);
        let lhs = Label::from(settings.chart.default_label.as_str());
        self.sentence
            .words()
            .iter()
            .map(|word| {
                let symbol = Symbol::Terminal(word.clone());
                let known = self.grammars.iter().any(|g| {
                    g.child(Grammar::ROOT, &symbol)
                        .is_some_and(|node| !g.rules(node).is_empty())
                });
                if known {
                    return None;
                }
                let keep = !settings.unknown.drop || word.chars().any(|c| c.is_ascii_digit());
                let rule = Rule {
                    lhs: lhs.clone(),
                    source: vec![symbol],
                    target: Arc::new(TargetPhrase::unknown(keep.then(|| word.clone()), num_scores)),
                };
                trace!(word = %word, "unknown word");
                let candidate = Arc::new(RuleCandidate::new(self.ctx, Arc::new(rule)));
                Some(Arc::from(vec![candidate]))
            })
            .collect()
    }

    fn rules_at(&mut self, grammar: usize, node: TrieId) -> Arc<[Arc<RuleCandidate>]> {
        if let Some(list) = self.rule_lists.get(&(grammar, node)) {
            return list.clone();
        }
        let mut list: Vec<Arc<RuleCandidate>> = self.grammars[grammar]
            .rules(node)
            .iter()
            .map(|rule| Arc::new(RuleCandidate::new(self.ctx, rule.clone())))
            .collect();
        list.sort_by(|a, b| b.estimate.total_cmp(&a.estimate));
        list.truncate(self.ctx.settings().chart.rule_limit);
        let list: Arc<[Arc<RuleCandidate>]> = list.into();
        self.rule_lists.insert((grammar, node), list.clone());
        list
    }

    /// Sorted members bound to each nonterminal of a dotted rule.
    fn slot_lists(&self, dotted: &DottedRule) -> Option<Vec<Arc<[NodeId]>>> {
        dotted
            .slots
            .iter()
            .map(|(range, label)| self.cell(range)?.members(label))
            .collect()
    }

    fn process(
        &mut self,
        span: Range,
        unknown: Option<Arc<[Arc<RuleCandidate>]>>,
    ) -> DecodeResult<()> {
        let _span = debug_span!("cell", span = %span).entered();
        let ctx = self.ctx;
        let width = span.num_words();
        let n = self.sentence.len();

        let cells = &self.cells;
        let dotted = self.active.extend(self.grammars, self.sentence, span, |sub| {
            cells[sub.start * n + sub.end]
                .as_ref()
                .map(|c| c.labels().collect())
                .unwrap_or_default()
        });

        let mut applications = Vec::new();
        for d in &dotted {
            let grammar = &self.grammars[d.grammar];
            if !grammar.allows_width(width) || grammar.rules(d.node).is_empty() {
                continue;
            }
            let Some(slots) = self.slot_lists(d) else {
                continue;
            };
            applications.push(Application {
                rules: self.rules_at(d.grammar, d.node),
                slots,
                unary: false,
            });
        }
        if let Some(rules) = unknown {
            applications.push(Application {
                rules,
                slots: Vec::new(),
                unary: false,
            });
        }

        let mut cell = ChartCell::new(span, &ctx.settings().search, self.keep_arcs);
        self.pops += self.expand(span, &mut cell, applications)?;
        cell.prune(&mut self.arena)?;
        cell.finish(&self.arena)?;

        let unary = self.unary_applications(span, &cell);
        if !unary.is_empty() {
            let mut staged = cell.staging();
            self.pops += self.expand(span, &mut staged, unary)?;
            cell.absorb(&mut self.arena, staged)?;
            cell.prune(&mut self.arena)?;
            cell.finish(&self.arena)?;
        }

        self.active.add_cell(self.grammars, span, cell.labels());
        self.cells[span.start * n + span.end] = Some(cell);
        Ok(())
    }

    /// Rules whose whole source side is one nonterminal over this span.
    fn unary_applications(&mut self, span: Range, cell: &ChartCell) -> Vec<Application> {
        let width = span.num_words();
        let mut out = Vec::new();
        for g in 0..self.grammars.len() {
            if !self.grammars[g].allows_width(width) {
                continue;
            }
            for label in cell.labels() {
                let symbol = Symbol::NonTerminal(label.clone());
                let Some(node) = self.grammars[g].child(Grammar::ROOT, &symbol) else {
                    continue;
                };
                if self.grammars[g].rules(node).is_empty() {
                    continue;
                }
                let Some(members) = cell.members(label) else {
                    continue;
                };
                out.push(Application {
                    rules: self.rules_at(g, node),
                    slots: vec![members],
                    unary: true,
                });
            }
        }
        out
    }

    fn expand(
        &mut self,
        span: Range,
        cell: &mut ChartCell,
        applications: Vec<Application>,
    ) -> DecodeResult<usize> {
        let mut expansion = CellExpansion {
            ctx: self.ctx,
            sentence: self.sentence,
            span,
            arena: &mut self.arena,
            cell,
        };
        let mut frontier = Frontier::new();
        for app in applications {
            expansion.check(&app)?;
            let mut dims = Vec::with_capacity(app.slots.len() + 1);
            dims.push(app.rules.len());
            dims.extend(app.slots.iter().map(|s| s.len()));
            frontier.add_cube(&expansion, app, &dims)?;
        }
        let cubes = frontier.num_cubes();
        let pops = frontier.run(&mut expansion, self.ctx.settings().search.pop_limit)?;
        debug!(cubes, pops, "cell expanded");
        Ok(pops)
    }
}

/// Fills one chart cell (or its unary staging cell).
struct CellExpansion<'s> {
    ctx: &'s SearchContext,
    sentence: &'s Sentence,
    span: Range,
    arena: &'s mut Arena,
    cell: &'s mut ChartCell,
}

impl CellExpansion<'_> {
    /// Verifies the head of every sorted list of an application.
    fn check(&self, app: &Application) -> DecodeResult<()> {
        let describe = || self.span.to_string();
        let estimates: Vec<f32> = app.rules.iter().take(2).map(|r| r.estimate).collect();
        check_sorted(SortedList::Rules, describe, &estimates)?;
        for (i, slot) in app.slots.iter().enumerate() {
            let scores: Vec<f32> = slot
                .iter()
                .take(2)
                .map(|&id| self.arena.get(id).map(|node| node.score))
                .collect::<DecodeResult<_>>()?;
            check_sorted(SortedList::Slot(i), describe, &scores)?;
        }
        Ok(())
    }
}

impl CubeSource for CellExpansion<'_> {
    type Cube = Application;

    fn speculative(&self, app: &Application, coords: &[u32]) -> DecodeResult<f32> {
        let mut score = app.rules[coords[0] as usize].estimate;
        for (slot, &c) in app.slots.iter().zip(&coords[1..]) {
            score += self.arena.get(slot[c as usize])?.score;
        }
        Ok(score)
    }

    fn materialize(&mut self, app: &Application, coords: &[u32]) -> DecodeResult<()> {
        let rule = app.rules[coords[0] as usize].clone();
        let tails: Vec<NodeId> = app
            .slots
            .iter()
            .zip(&coords[1..])
            .map(|(slot, &c)| slot[c as usize])
            .collect();

        let mut breakdown = rule.breakdown.clone();
        let mut score = rule.score;
        let mut child_states: Vec<&[StateRef]> = Vec::with_capacity(tails.len());
        for &tail in &tails {
            let child = self.arena.get(tail)?;
            if child.status != NodeStatus::Representative {
                return Err(DecodeError::DeadPredecessor {
                    span: self.describe(app),
                });
            }
            breakdown.add_assign(&child.breakdown);
            score += child.score;
            child_states.push(&child.states);
        }
        let ext = ChartExtension {
            sentence: self.sentence,
            span: self.span,
            target: &rule.rule.target,
        };
        let (delta, states) = self.ctx.evaluate_chart(&ext, &child_states, &mut breakdown);
        score += delta;
        if score.is_nan() {
            return Err(DecodeError::InvalidScore {
                span: self.describe(app),
            });
        }

        let label = rule.rule.lhs.clone();
        let node = Node::new(
            NodeKind::Chart {
                rule,
                span: self.span,
                unary: app.unary,
            },
            tails,
            score,
            score,
            breakdown,
            states,
        );
        let id = self.arena.alloc(node);
        let outcome = self.cell.add(self.arena, &label, id)?;
        trace!(node = id.index(), label = %label, score, ?outcome, "chart node");
        Ok(())
    }

    fn describe(&self, app: &Application) -> String {
        match app.rules.first() {
            Some(r) => format!("{} {}", self.span, r.rule.lhs),
            None => self.span.to_string(),
        }
    }
}
