//! Grammar-based (hierarchical) decoding: rule tries, the active chart,
//! chart cells and the chart search driver.

pub mod active;
pub mod cell;
pub mod grammar;
pub mod manager;

#[cfg(test)]
mod tests;

pub use active::{ActiveChart, DottedRule};
pub use cell::ChartCell;
pub use grammar::{Grammar, GrammarError, Label, Rule, RuleCandidate, RuleEntry, Symbol, TrieId};
pub use manager::decode_chart;
