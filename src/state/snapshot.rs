use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use dashmap::DashMap;
use serde::Serialize;

use crate::types::{DiscrepancyRow, MergedRecord, PropKey, ResultKey};

/// Last-cycle outcome for one result group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupStatus {
    pub source: String,
    /// Actionable rows routed to this group in the last cycle.
    pub actionable: usize,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    /// Set when the group's reconciliation failed and was rolled back.
    pub error: Option<String>,
}

/// One cycle's merged records and actionable rows. Built in full, then
/// swapped in, so readers never see a half-replaced cycle.
#[derive(Debug, Default)]
struct CycleRecords {
    /// line identity → all sources' quotes
    merged: BTreeMap<PropKey, MergedRecord>,
    /// Lowest trimmed mean first; one row per (line identity, side).
    actionable: Vec<DiscrepancyRow>,
}

impl CycleRecords {
    fn build(merged: &[MergedRecord], actionable: &[DiscrepancyRow]) -> Self {
        let merged = merged
            .iter()
            .map(|r| (r.identity.key(), r.clone()))
            .collect();

        let mut seen: HashSet<ResultKey> = HashSet::with_capacity(actionable.len());
        let mut rows: Vec<DiscrepancyRow> = actionable
            .iter()
            .filter(|r| seen.insert(r.key()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.trimmed_mean
                .total_cmp(&b.trimmed_mean)
                .then_with(|| a.key().cmp(&b.key()))
        });

        Self {
            merged,
            actionable: rows,
        }
    }
}

/// Read-only view of the most recent cycle, written by the cycle runner and
/// read by the API.
pub struct ScanSnapshot {
    /// group source → last outcome
    groups: DashMap<String, GroupStatus>,
    records: RwLock<Arc<CycleRecords>>,
}

impl ScanSnapshot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replace_records(&self, merged: &[MergedRecord], actionable: &[DiscrepancyRow]) {
        let next = Arc::new(CycleRecords::build(merged, actionable));
        let mut slot = self.records.write().unwrap_or_else(PoisonError::into_inner);
        *slot = next;
    }

    fn current(&self) -> Arc<CycleRecords> {
        let slot = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }

    pub fn set_group(&self, status: GroupStatus) {
        self.groups.insert(status.source.clone(), status);
    }

    pub fn group(&self, source: &str) -> Option<GroupStatus> {
        self.groups.get(source).map(|g| g.clone())
    }

    /// Ordered by source name.
    pub fn groups(&self) -> Vec<GroupStatus> {
        let mut out: Vec<GroupStatus> = self.groups.iter().map(|g| g.value().clone()).collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Lowest trimmed mean first.
    pub fn actionable(&self) -> Vec<DiscrepancyRow> {
        self.current().actionable.clone()
    }

    /// Merged records, optionally restricted to players whose name contains
    /// `player` (case-insensitive). Ordered by identity.
    pub fn merged(&self, player: Option<&str>) -> Vec<MergedRecord> {
        let needle = player.map(str::to_lowercase);
        self.current()
            .merged
            .values()
            .filter(|r| {
                needle
                    .as_deref()
                    .map_or(true, |n| r.identity.player.to_lowercase().contains(n))
            })
            .cloned()
            .collect()
    }
}

impl Default for ScanSnapshot {
    fn default() -> Self {
        Self {
            groups: DashMap::new(),
            records: RwLock::new(Arc::new(CycleRecords::default())),
        }
    }
}
