use std::collections::HashSet;

use crate::types::{DiscrepancyRow, ResultKey};

/// What to do with one group's table to make it match the current cycle.
#[derive(Debug, Default)]
pub struct Reconciliation<'a> {
    /// Persisted keys absent from the current cycle. Sorted.
    pub to_remove: Vec<ResultKey>,
    /// Current rows already persisted; derived fields are overwritten.
    pub to_update: Vec<&'a DiscrepancyRow>,
    /// Current rows not yet persisted, in input order.
    pub to_insert: Vec<&'a DiscrepancyRow>,
}

impl Reconciliation<'_> {
    pub fn is_noop(&self) -> bool {
        self.to_remove.is_empty() && self.to_update.is_empty() && self.to_insert.is_empty()
    }
}

/// Set difference between persisted keys and the current rows.
///
/// If `current` repeats a key, the first row wins.
pub fn reconcile<'a>(existing: &HashSet<ResultKey>, current: &'a [DiscrepancyRow]) -> Reconciliation<'a> {
    let mut seen: HashSet<ResultKey> = HashSet::with_capacity(current.len());
    let mut out = Reconciliation::default();

    for row in current {
        let key = row.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if existing.contains(&key) {
            out.to_update.push(row);
        } else {
            out.to_insert.push(row);
        }
    }

    out.to_remove = existing.difference(&seen).cloned().collect();
    out.to_remove.sort();
    out
}
