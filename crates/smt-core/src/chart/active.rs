//! Active chart: partially matched rules per source span.
//!
//! A dotted rule has consumed the source symbols of some span `[start,
//! end]`, each nonterminal bound to a complete chart cell below it. Spans are
//! visited by increasing width, so every cell a dotted rule needs is final
//! by the time it is extended.

use crate::coverage::Range;
use crate::phrase::Sentence;

use super::grammar::{Grammar, Label, Symbol, TrieId};

#[derive(Debug, Clone, PartialEq)]
pub struct DottedRule {
    /// Index into the grammar list.
    pub grammar: usize,
    pub node: TrieId,
    /// Span and label bound to each nonterminal so far, in source order.
    pub slots: Vec<(Range, Label)>,
}

impl DottedRule {
    fn extended(&self, node: TrieId, slot: Option<(Range, Label)>) -> Self {
        let mut slots = self.slots.clone();
        slots.extend(slot);
        Self {
            grammar: self.grammar,
            node,
            slots,
        }
    }
}

pub struct ActiveChart {
    len: usize,
    /// `items[start * len + end]`: dotted rules covering exactly that span.
    items: Vec<Vec<DottedRule>>,
}

impl ActiveChart {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            items: (0..len * len).map(|_| Vec::new()).collect(),
        }
    }

    pub fn covering(&self, span: &Range) -> &[DottedRule] {
        &self.items[span.start * self.len + span.end]
    }

    /// Builds the dotted rules covering exactly `span` from those covering
    /// a proper prefix of it, and returns them. `labels(sub)` lists the
    /// labels of the finished cell over `sub`.
    ///
    /// Dotted rules starting with a nonterminal over the whole span come
    /// from [`ActiveChart::add_cell`] once that cell is finished.
    pub fn extend<'l>(
        &mut self,
        grammars: &[Grammar],
        sentence: &Sentence,
        span: Range,
        labels: impl Fn(Range) -> Vec<&'l Label>,
    ) -> Vec<DottedRule> {
        let width = span.num_words();
        let last = Symbol::Terminal(sentence.word(span.end).clone());
        let mut out = Vec::new();

        if width == 1 {
            for (g, grammar) in grammars.iter().enumerate() {
                if let Some(node) = grammar.child(Grammar::ROOT, &last) {
                    out.push(DottedRule {
                        grammar: g,
                        node,
                        slots: Vec::new(),
                    });
                }
            }
        }

        for mid in span.start..span.end {
            let prefix = Range::new(span.start, mid);
            let rest = Range::new(mid + 1, span.end);
            let rest_labels = labels(rest);
            for item in self.covering(&prefix) {
                let grammar = &grammars[item.grammar];
                if !grammar.allows_width(width) {
                    continue;
                }
                if mid + 1 == span.end {
                    if let Some(node) = grammar.child(item.node, &last) {
                        out.push(item.extended(node, None));
                    }
                }
                for &label in &rest_labels {
                    let symbol = Symbol::NonTerminal(label.clone());
                    if let Some(node) = grammar.child(item.node, &symbol) {
                        out.push(item.extended(node, Some((rest, label.clone()))));
                    }
                }
            }
        }

        self.items[span.start * self.len + span.end].extend(out.iter().cloned());
        out
    }

    /// Starts dotted rules with a nonterminal bound to the finished cell over
    /// `span`. Only prefixes that can still grow are kept.
    pub fn add_cell<'l>(
        &mut self,
        grammars: &[Grammar],
        span: Range,
        labels: impl IntoIterator<Item = &'l Label>,
    ) {
        if span.end + 1 >= self.len {
            return;
        }
        let width = span.num_words();
        let labels: Vec<&Label> = labels.into_iter().collect();
        let bucket = &mut self.items[span.start * self.len + span.end];
        for (g, grammar) in grammars.iter().enumerate() {
            if !grammar.allows_width(width + 1) {
                continue;
            }
            for &label in &labels {
                let symbol = Symbol::NonTerminal(label.clone());
                if let Some(node) = grammar.child(Grammar::ROOT, &symbol) {
                    bucket.push(DottedRule {
                        grammar: g,
                        node,
                        slots: vec![(span, label.clone())],
                    });
                }
            }
        }
    }
}
