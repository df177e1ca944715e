use super::*;
use crate::context::CancelToken;
use crate::error::DecodeError;
use crate::output;
use crate::phrase::Sentence;
use crate::search::testutil::{best_text, nbest, test_context, test_settings};
use crate::search::{NodeKind, NodeStatus, SearchResult};
use crate::settings::Settings;

fn main_grammar(max_span: Option<usize>, reorder: bool) -> Grammar {
    let mut entries = vec![
        RuleEntry::new("X", "haus", "house", &[-1.0]),
        RuleEntry::new("X", "haus", "home", &[-1.2]),
        RuleEntry::new("X", "peter", "peter", &[-0.5]),
    ];
    if reorder {
        entries.push(RuleEntry::new("X", "[X] von [X]", "[2] 's [1]", &[-1.0]));
    }
    Grammar::from_entries("main", max_span, entries).unwrap()
}

fn glue_grammar() -> Grammar {
    Grammar::from_entries(
        "glue",
        None,
        [
            RuleEntry::new("S", "[X]", "[1]", &[0.0]),
            RuleEntry::new("S", "[S] [X]", "[1] [2]", &[0.0]),
        ],
    )
    .unwrap()
}

fn goal_settings() -> Settings {
    let mut settings = test_settings();
    settings.chart.goal_label = Some("S".to_string());
    settings
}

fn run(settings: Settings, grammars: &[Grammar], text: &str) -> SearchResult {
    let ctx = test_context(settings);
    let result =
        decode_chart(&ctx, &Sentence::new(0, text), grammars, &CancelToken::new()).unwrap();
    assert_no_live_duplicates(&result);
    result
}

/// No two representatives of one span share a recombination key.
fn assert_no_live_duplicates(result: &SearchResult) {
    let reps: Vec<_> = result
        .arena
        .iter()
        .filter(|(_, n)| n.status == NodeStatus::Representative)
        .collect();
    for (i, (a_id, a)) in reps.iter().enumerate() {
        for (b_id, b) in &reps[i + 1..] {
            assert!(
                a.range() != b.range() || !a.recombines_with(b),
                "representatives {} and {} share a recombination key",
                a_id.index(),
                b_id.index()
            );
        }
    }
}

fn is_unary(result: &SearchResult, id: crate::search::NodeId) -> bool {
    matches!(
        result.arena.get(id).unwrap().kind,
        NodeKind::Chart { unary: true, .. }
    )
}

#[test]
fn test_chart_reordering_rule() {
    let grammars = [main_grammar(Some(10), true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus von peter");
    assert_eq!(best_text(&result), "peter 's house");
    let best = output::best_translation(&result).unwrap().unwrap();
    assert!((best.score - -2.5).abs() < 1e-5);
    assert_eq!(best.breakdown.values(), &[-2.5, 0.0, 0.0]);
}

#[test]
fn test_chart_glue_passes_unknown_through() {
    let grammars = [main_grammar(Some(10), false), glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus von peter");
    assert_eq!(best_text(&result), "house von peter");
    let best = output::best_translation(&result).unwrap().unwrap();
    assert!((best.score - -101.5).abs() < 1e-3);
    assert_eq!(best.breakdown.values()[2], 1.0);
}

#[test]
fn test_chart_max_span_blocks_wide_rules() {
    let grammars = [main_grammar(Some(2), true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus von peter");
    assert_eq!(best_text(&result), "house von peter");
}

#[test]
fn test_chart_goal_label_filters_roots() {
    let grammars = [main_grammar(Some(10), true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus von peter");
    for &root in &result.roots {
        let label = result.arena.get(root).unwrap().label().unwrap();
        assert_eq!(label.to_string(), "S");
    }

    let open = run(test_settings(), &grammars, "haus von peter");
    let labels: Vec<String> = open
        .roots
        .iter()
        .map(|&r| open.arena.get(r).unwrap().label().unwrap().to_string())
        .collect();
    assert!(labels.iter().any(|l| l == "X"));
    assert!(labels.iter().any(|l| l == "S"));
    assert_eq!(best_text(&open), "peter 's house");
}

#[test]
fn test_chart_nbest_follows_arcs() {
    let grammars = [main_grammar(Some(10), true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus von peter");
    let list = nbest(&result, 5, false);
    let texts: Vec<String> = list.iter().map(|t| t.text()).collect();
    // the glue derivation recombined into the unary root and is an arc now
    assert_eq!(
        texts,
        vec![
            "peter 's house",
            "peter 's home",
            "house von peter",
            "home von peter"
        ]
    );
    assert!((list[1].score - -2.7).abs() < 1e-5);
    assert!((list[2].score - -101.5).abs() < 1e-3);
}

#[test]
fn test_chart_rule_limit() {
    let mut settings = goal_settings();
    settings.chart.rule_limit = 1;
    let grammars = [main_grammar(Some(10), true), glue_grammar()];
    let result = run(settings, &grammars, "haus von peter");
    let texts: Vec<String> = nbest(&result, 5, false).iter().map(|t| t.text()).collect();
    assert_eq!(texts, vec!["peter 's house", "house von peter"]);
}

#[test]
fn test_chart_unary_closure() {
    let grammars = [main_grammar(Some(10), true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "peter");
    assert_eq!(best_text(&result), "peter");
    let root = result.arena.get(result.roots[0]).unwrap();
    assert!(matches!(root.kind, NodeKind::Chart { unary: true, .. }));
    let child = result.arena.get(root.tails[0]).unwrap();
    assert_eq!(child.label().unwrap().to_string(), "X");
}

#[test]
fn test_chart_unary_recombines_with_plain() {
    let main = Grammar::from_entries(
        "main",
        None,
        [
            RuleEntry::new("X", "haus", "house", &[-1.0]),
            RuleEntry::new("S", "haus", "house", &[-1.5]),
        ],
    )
    .unwrap();
    let grammars = [main, glue_grammar()];
    let result = run(goal_settings(), &grammars, "haus");
    assert_eq!(result.roots.len(), 1);
    let root = result.roots[0];
    assert!(is_unary(&result, root));
    let arcs = &result.arena.get(root).unwrap().arcs;
    assert_eq!(arcs.len(), 1);
    assert!(!is_unary(&result, arcs[0]));

    let list = nbest(&result, 5, false);
    assert_eq!(list.len(), 2);
    assert!((list[0].score - -1.0).abs() < 1e-5);
    assert!((list[1].score - -1.5).abs() < 1e-5);
}

#[test]
fn test_chart_unary_cycle_applies_once() {
    let grammar = Grammar::from_entries(
        "main",
        None,
        [
            RuleEntry::new("X", "haus", "house", &[-1.0]),
            RuleEntry::new("X", "[Y]", "[1]", &[-0.5]),
            RuleEntry::new("Y", "[X]", "[1]", &[-0.5]),
            RuleEntry::new("X", "[X]", "[1]", &[-0.2]),
        ],
    )
    .unwrap();
    let result = run(test_settings(), &[grammar], "haus");
    assert_eq!(best_text(&result), "house");

    // every unary node sits on a node built before the closure pass
    let mut unary = 0;
    for (id, node) in result.arena.iter() {
        if !is_unary(&result, id) {
            continue;
        }
        unary += 1;
        assert_eq!(node.tails.len(), 1);
        assert!(!is_unary(&result, node.tails[0]));
        let child = result.arena.get(node.tails[0]).unwrap();
        assert_eq!(child.label().unwrap().to_string(), "X");
    }
    // X -> [X] and Y -> [X]; X -> [Y] never fires
    assert_eq!(unary, 2);

    let labels: Vec<String> = result
        .roots
        .iter()
        .map(|&r| result.arena.get(r).unwrap().label().unwrap().to_string())
        .collect();
    assert_eq!(labels, vec!["X", "Y"]);
}

#[test]
fn test_chart_empty_sentence() {
    let grammars = [main_grammar(None, true), glue_grammar()];
    let result = run(goal_settings(), &grammars, "");
    assert!(result.is_empty());
    assert_eq!(best_text(&result), "");
}

#[test]
fn test_chart_cancelled() {
    let grammars = [main_grammar(None, true), glue_grammar()];
    let ctx = test_context(goal_settings());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = decode_chart(&ctx, &Sentence::new(0, "haus"), &grammars, &cancel)
        .err()
        .unwrap();
    assert!(matches!(err, DecodeError::Cancelled));
}
