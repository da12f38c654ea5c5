use std::collections::HashMap;

use prettytable::{Cell, Row, Table};

/// Counters for a single predicate type, keyed by
/// [`Predicate::name`](crate::search::pred::Predicate::name).
#[derive(Debug, Default, Clone, Copy)]
pub struct PerPredicateStats {
    /// The number of times a predicate of this type was entered.
    pub calls: u64,
    /// The number of times the engine asked for another alternative.
    pub retries: u64,
}

/// Statistics for a single `execute` run.
#[derive(Debug, Default)]
pub struct SearchStats {
    /// The total number of predicate entries.
    pub predicates_called: u64,
    /// The total number of alternatives applied and accepted.
    pub choices_applied: u64,
    /// The total number of times the engine rewound to a choice point.
    pub backtracks: u64,
    /// The number of cuts performed (once / not-not barriers).
    pub cuts: u64,
    /// The number of trailed cell mutations.
    pub bindings: u64,
    /// High-water mark of the trail during the run.
    pub max_trail_len: usize,
    /// A map from a predicate's diagnostic name to its counters.
    pub predicate_stats: HashMap<&'static str, PerPredicateStats>,
}

impl SearchStats {
    pub(crate) fn reset(&mut self) {
        *self = SearchStats::default();
    }
}

pub fn render_stats_table(stats: &SearchStats) -> String {
    let mut table = Table::new();
    table.add_row(Row::new(vec![
        Cell::new("Predicate"),
        Cell::new("Calls"),
        Cell::new("Retries"),
    ]));

    let mut sorted_stats: Vec<(&'static str, PerPredicateStats)> = stats
        .predicate_stats
        .iter()
        .map(|(name, per_pred)| (*name, *per_pred))
        .collect();
    sorted_stats.sort_by_key(|entry| (std::cmp::Reverse(entry.1.calls), entry.0));

    for (name, per_pred) in sorted_stats {
        table.add_row(Row::new(vec![
            Cell::new(name),
            Cell::new(&per_pred.calls.to_string()),
            Cell::new(&per_pred.retries.to_string()),
        ]));
    }

    format!(
        "predicates: {}  choices: {}  backtracks: {}  cuts: {}  bindings: {}  max trail: {}\n{}",
        stats.predicates_called,
        stats.choices_applied,
        stats.backtracks,
        stats.cuts,
        stats.bindings,
        stats.max_trail_len,
        table
    )
}
