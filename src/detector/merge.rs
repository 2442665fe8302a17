use std::collections::{BTreeMap, BTreeSet};

use crate::types::{MergedRecord, PropKey, SourceTable};

/// Outer-join the per-source tables on (player, prop, line).
///
/// Tables are folded in the order given, so each record's quotes follow
/// source order. Records quoted by fewer than `min_sources` sources are
/// dropped. Output is ordered by identity key.
pub fn merge_tables(tables: &[SourceTable], min_sources: usize) -> Vec<MergedRecord> {
    let mut merged: BTreeMap<PropKey, MergedRecord> = BTreeMap::new();

    for table in tables {
        for line in &table.lines {
            let record = merged
                .entry(line.identity.key())
                .or_insert_with(|| MergedRecord {
                    identity: line.identity.clone(),
                    quotes: Vec::new(),
                });
            // A source contributes one column per record.
            if !record.quotes.iter().any(|(s, _)| s == &table.source) {
                record.quotes.push((table.source.clone(), line.prices));
            }
        }
    }

    merged
        .into_values()
        .filter(|r| r.source_count() >= min_sources)
        .collect()
}

/// Prop labels that only one source offers, as `(prop, source)`.
/// Usually a sign that a scraper's label mapping drifted.
pub fn single_source_props(tables: &[SourceTable]) -> Vec<(String, String)> {
    let mut offered: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for table in tables {
        for line in &table.lines {
            offered
                .entry(line.identity.prop.as_str())
                .or_default()
                .insert(table.source.as_str());
        }
    }

    offered
        .into_iter()
        .filter(|(_, sources)| sources.len() == 1)
        .filter_map(|(prop, sources)| {
            let source = sources.into_iter().next()?;
            Some((prop.to_string(), source.to_string()))
        })
        .collect()
}
