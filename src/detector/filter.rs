use std::collections::BTreeMap;

use crate::config::{SourcePolicy, Thresholds, THRESHOLD_EPSILON};
use crate::types::DiscrepancyRow;

fn at_least(v: f64, min: f64) -> bool {
    v + THRESHOLD_EPSILON >= min
}

fn at_most(v: f64, max: f64) -> bool {
    v - THRESHOLD_EPSILON <= max
}

/// True when the row clears every threshold.
pub fn is_actionable(row: &DiscrepancyRow, t: &Thresholds) -> bool {
    at_least(row.edge(), t.min_edge)
        && at_least(row.best_price, t.best_price_min)
        && at_most(row.best_price, t.best_price_max)
        && at_most(row.trimmed_mean, t.baseline_max)
}

/// Keep actionable rows, lowest trimmed mean first. Ties keep analyzer order.
pub fn filter_actionable(rows: Vec<DiscrepancyRow>, t: &Thresholds) -> Vec<DiscrepancyRow> {
    let mut kept: Vec<DiscrepancyRow> = rows.into_iter().filter(|r| is_actionable(r, t)).collect();
    kept.sort_by(|a, b| a.trimmed_mean.total_cmp(&b.trimmed_mean));
    kept
}

/// Partition rows by winning source, discarding non-alertable sources.
/// Row order within a group is preserved.
pub fn group_by_best_source(
    rows: Vec<DiscrepancyRow>,
    policy: &SourcePolicy,
) -> BTreeMap<String, Vec<DiscrepancyRow>> {
    let mut groups: BTreeMap<String, Vec<DiscrepancyRow>> = BTreeMap::new();
    for row in rows {
        if policy.is_excluded(&row.best_source) {
            continue;
        }
        groups.entry(row.best_source.clone()).or_default().push(row);
    }
    groups
}
