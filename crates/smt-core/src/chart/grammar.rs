//! Synchronous grammar rules and the prefix trie they are looked up in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::context::SearchContext;
use crate::model::ScoreBreakdown;
use crate::phrase::{parse_alignment, TableError, TargetPhrase, TargetToken, Word};

/// Nonterminal name, e.g. `X` or `S`.
pub type Label = Arc<str>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Terminal(Word),
    NonTerminal(Label),
}

impl Symbol {
    /// `[X]` is a nonterminal, anything else a terminal.
    pub fn parse(token: &str) -> Symbol {
        match token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            Some(label) if !label.is_empty() => Symbol::NonTerminal(Label::from(label)),
            _ => Symbol::Terminal(Word::from(token)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Terminal(w) => f.write_str(w),
            Symbol::NonTerminal(l) => write!(f, "[{l}]"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("rule has an empty source side")]
    EmptySource,
    #[error("rule {rule:?} refers to slot [{slot}] but has {available} nonterminals")]
    UnknownSlot {
        rule: String,
        slot: usize,
        available: usize,
    },
    #[error("rule {rule:?} must use each of its {expected} nonterminals exactly once on the target side")]
    Unbalanced { rule: String, expected: usize },
    #[error("rule {rule:?} has {found} scores, expected {expected}")]
    ScoreCount {
        rule: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    Alignment(#[from] TableError),
}

/// `lhs -> source ||| target`.
///
/// Target slots are 0-based indices into the source nonterminals in source
/// order; alignment pairs are `(source symbol, target token)` over
/// terminals.
#[derive(Debug)]
pub struct Rule {
    pub lhs: Label,
    pub source: Vec<Symbol>,
    pub target: Arc<TargetPhrase>,
}

impl Rule {
    /// Parses `"[X] haus"` / `"[1] house"` style strings; target slots are
    /// written 1-based.
    pub fn parse(
        lhs: &str,
        source: &str,
        target: &str,
        scores: Vec<f32>,
        alignment: Option<&str>,
    ) -> Result<Rule, GrammarError> {
        let source: Vec<Symbol> = source.split_whitespace().map(Symbol::parse).collect();
        if source.is_empty() {
            return Err(GrammarError::EmptySource);
        }
        let available = source.iter().filter(|s| !s.is_terminal()).count();
        let describe = || format!("{lhs} -> {target}");

        let mut used = vec![false; available];
        let mut tokens = Vec::new();
        for token in target.split_whitespace() {
            let slot = token
                .strip_prefix('[')
                .and_then(|t| t.strip_suffix(']'))
                .and_then(|t| t.parse::<usize>().ok());
            match slot {
                Some(n) => {
                    if n == 0 || n > available {
                        return Err(GrammarError::UnknownSlot {
                            rule: describe(),
                            slot: n,
                            available,
                        });
                    }
                    if used[n - 1] {
                        return Err(GrammarError::Unbalanced {
                            rule: describe(),
                            expected: available,
                        });
                    }
                    used[n - 1] = true;
                    tokens.push(TargetToken::Slot(n - 1));
                }
                None => tokens.push(TargetToken::Word(Word::from(token))),
            }
        }
        if used.iter().any(|u| !u) {
            return Err(GrammarError::Unbalanced {
                rule: describe(),
                expected: available,
            });
        }

        let alignment = match alignment {
            Some(a) => parse_alignment(a)?,
            None => Vec::new(),
        };
        Ok(Rule {
            lhs: Label::from(lhs),
            source,
            target: Arc::new(TargetPhrase::new(tokens, scores).with_alignment(alignment)),
        })
    }

    pub fn num_nonterminals(&self) -> usize {
        self.source.iter().filter(|s| !s.is_terminal()).count()
    }

    /// A single nonterminal and nothing else.
    pub fn is_unary(&self) -> bool {
        matches!(self.source.as_slice(), [Symbol::NonTerminal(_)])
    }

    pub fn terminals(&self) -> Vec<Word> {
        self.source
            .iter()
            .filter_map(|s| match s {
                Symbol::Terminal(w) => Some(w.clone()),
                Symbol::NonTerminal(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source: Vec<String> = self.source.iter().map(Symbol::to_string).collect();
        write!(
            f,
            "{} -> {} ||| {}",
            self.lhs,
            source.join(" "),
            self.target.render()
        )
    }
}

/// A rule with its isolation scores for the current run.
#[derive(Debug)]
pub struct RuleCandidate {
    pub rule: Arc<Rule>,
    pub breakdown: ScoreBreakdown,
    pub score: f32,
    /// Sort key: `score` plus the stateful models' estimates.
    pub estimate: f32,
}

impl RuleCandidate {
    pub fn new(ctx: &SearchContext, rule: Arc<Rule>) -> Self {
        let scored = ctx.score_target(&rule.terminals(), &rule.target);
        Self {
            rule,
            breakdown: scored.breakdown,
            score: scored.score,
            estimate: scored.estimate,
        }
    }
}

/// One line of a grammar file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleEntry {
    pub lhs: String,
    pub source: String,
    pub target: String,
    pub scores: Vec<f32>,
    #[serde(default)]
    pub alignment: Option<String>,
}

impl RuleEntry {
    pub fn new(lhs: &str, source: &str, target: &str, scores: &[f32]) -> Self {
        Self {
            lhs: lhs.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            scores: scores.to_vec(),
            alignment: None,
        }
    }
}

/// Index of a node in a [`Grammar`] trie.
pub type TrieId = usize;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<Symbol, TrieId>,
    rules: Vec<Arc<Rule>>,
}

/// Rules indexed by their source side, one symbol per trie level.
#[derive(Debug)]
pub struct Grammar {
    name: String,
    nodes: Vec<TrieNode>,
    /// Widest span a rule of this grammar may cover; `None` is unbounded.
    max_span: Option<usize>,
    num_scores: Option<usize>,
    len: usize,
}

impl Grammar {
    pub const ROOT: TrieId = 0;

    pub fn new(name: &str, max_span: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            nodes: vec![TrieNode::default()],
            max_span,
            num_scores: None,
            len: 0,
        }
    }

    pub fn from_entries(
        name: &str,
        max_span: Option<usize>,
        entries: impl IntoIterator<Item = RuleEntry>,
    ) -> Result<Self, GrammarError> {
        let mut grammar = Self::new(name, max_span);
        for e in entries {
            let rule = Rule::parse(&e.lhs, &e.source, &e.target, e.scores, e.alignment.as_deref())?;
            grammar.add(rule)?;
        }
        Ok(grammar)
    }

    pub fn add(&mut self, rule: Rule) -> Result<(), GrammarError> {
        let found = rule.target.scores().len();
        let expected = *self.num_scores.get_or_insert(found);
        if found != expected {
            return Err(GrammarError::ScoreCount {
                rule: rule.to_string(),
                expected,
                found,
            });
        }
        let mut node = Self::ROOT;
        for symbol in &rule.source {
            node = match self.nodes[node].children.get(symbol) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(symbol.clone(), child);
                    child
                }
            };
        }
        self.nodes[node].rules.push(Arc::new(rule));
        self.len += 1;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_scores(&self) -> usize {
        self.num_scores.unwrap_or(0)
    }

    pub fn max_span(&self) -> Option<usize> {
        self.max_span
    }

    pub fn allows_width(&self, width: usize) -> bool {
        self.max_span.map_or(true, |max| width <= max)
    }

    pub fn child(&self, node: TrieId, symbol: &Symbol) -> Option<TrieId> {
        self.nodes.get(node)?.children.get(symbol).copied()
    }

    /// Rules whose source side ends at `node`.
    pub fn rules(&self, node: TrieId) -> &[Arc<Rule>] {
        self.nodes
            .get(node)
            .map(|n| n.rules.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_symbols() {
        assert_eq!(Symbol::parse("[X]"), Symbol::NonTerminal(Label::from("X")));
        assert_eq!(Symbol::parse("haus"), Symbol::Terminal(Word::from("haus")));
        assert_eq!(Symbol::parse("[]"), Symbol::Terminal(Word::from("[]")));
    }

    #[test]
    fn parse_rule_with_reordering() {
        let rule = Rule::parse("X", "[X] von [X]", "[2] of [1]", vec![-1.0], Some("1-1")).unwrap();
        assert_eq!(rule.num_nonterminals(), 2);
        assert_eq!(
            rule.target.tokens(),
            &[
                TargetToken::Slot(1),
                TargetToken::Word(Word::from("of")),
                TargetToken::Slot(0)
            ]
        );
        assert_eq!(rule.terminals(), vec![Word::from("von")]);
        assert_eq!(rule.to_string(), "X -> [X] von [X] ||| [2] of [1]");
        assert!(!rule.is_unary());
        assert!(Rule::parse("S", "[X]", "[1]", vec![], None).unwrap().is_unary());
    }

    #[test]
    fn slot_errors() {
        assert!(matches!(
            Rule::parse("X", "[X] a", "[2] b", vec![], None),
            Err(GrammarError::UnknownSlot { slot: 2, .. })
        ));
        assert!(matches!(
            Rule::parse("X", "[X] a [X]", "[1] b", vec![], None),
            Err(GrammarError::Unbalanced { expected: 2, .. })
        ));
        assert!(matches!(
            Rule::parse("X", "[X] a", "[1] [1]", vec![], None),
            Err(GrammarError::Unbalanced { .. })
        ));
        assert!(matches!(
            Rule::parse("X", " ", "b", vec![], None),
            Err(GrammarError::EmptySource)
        ));
    }

    #[test]
    fn trie_lookup() {
        let g = Grammar::from_entries(
            "main",
            Some(5),
            [
                RuleEntry::new("X", "das haus", "the house", &[-1.0]),
                RuleEntry::new("X", "das", "the", &[-0.5]),
                RuleEntry::new("X", "das [X]", "the [1]", &[-2.0]),
            ],
        )
        .unwrap();
        assert_eq!(g.len(), 3);
        let das = g
            .child(Grammar::ROOT, &Symbol::Terminal(Word::from("das")))
            .unwrap();
        assert_eq!(g.rules(das).len(), 1);
        let haus = g.child(das, &Symbol::Terminal(Word::from("haus"))).unwrap();
        assert_eq!(g.rules(haus)[0].target.render(), "the house");
        let nt = g.child(das, &Symbol::NonTerminal(Label::from("X"))).unwrap();
        assert_eq!(g.rules(nt)[0].target.render(), "the [1]");
        assert!(g.child(das, &Symbol::NonTerminal(Label::from("S"))).is_none());
        assert!(g.allows_width(5));
        assert!(!g.allows_width(6));
    }

    #[test]
    fn score_count_must_match() {
        let err = Grammar::from_entries(
            "main",
            None,
            [
                RuleEntry::new("X", "a", "b", &[-1.0]),
                RuleEntry::new("X", "c", "d", &[-1.0, 0.0]),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GrammarError::ScoreCount {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }
}
