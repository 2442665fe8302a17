//! Alert dispatch for newly persisted discrepancies.
//!
//! One `AlertBatch` per result group per cycle, built only when the group
//! produced new rows. Delivery is best-effort: a failed send is logged by the
//! caller and never touches persisted state.

pub mod discord;

use std::collections::HashMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::types::{DiscrepancyRow, MergedRecord, PricePair, PropKey};

pub use discord::DiscordNotifier;

/// New discrepancies for one group, with every source's prices for context.
#[derive(Debug, Clone)]
pub struct AlertBatch {
    pub group_source: String,
    /// Lowest trimmed mean first.
    pub rows: Vec<DiscrepancyRow>,
    /// All quotes seen this cycle for each row's line, taken from the merged
    /// records rather than the filtered set.
    pub odds_by_identity: HashMap<PropKey, Vec<(String, PricePair)>>,
}

impl AlertBatch {
    /// None when there is nothing new to report.
    pub fn build(group_source: &str, mut rows: Vec<DiscrepancyRow>, merged: &[MergedRecord]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        rows.sort_by(|a, b| a.trimmed_mean.total_cmp(&b.trimmed_mean));

        let wanted: Vec<PropKey> = rows.iter().map(|r| r.identity.key()).collect();
        let odds_by_identity = merged
            .iter()
            .filter_map(|m| {
                let key = m.identity.key();
                wanted.contains(&key).then(|| (key, m.quotes.clone()))
            })
            .collect();

        Some(Self {
            group_source: group_source.to_string(),
            rows,
            odds_by_identity,
        })
    }

    /// Markdown body: one block per row, followed by every source's price on
    /// that row's side.
    pub fn render_description(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let _ = writeln!(
                out,
                "**{} {} {} {}**",
                row.identity.player, row.side, row.identity.stat_value, row.identity.prop
            );
            let _ = writeln!(
                out,
                "Top SB: {} @ {} | Low SB: {} @ {} | Avg Multi: {}",
                row.best_source, row.best_price, row.worst_source, row.worst_price, row.trimmed_mean
            );
            if let Some(quotes) = self.odds_by_identity.get(&row.identity.key()) {
                out.push_str("**All Sportsbook Odds:**\n");
                for (source, pair) in quotes {
                    if let Some(price) = pair.side(row.side) {
                        let _ = writeln!(out, "{source}: {price}");
                    }
                }
            }
            out.push('\n');
        }
        out
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, batch: &AlertBatch) -> Result<()>;

    fn name(&self) -> &str;
}

/// Fallback when no webhook is configured: alerts go to the log.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, batch: &AlertBatch) -> Result<()> {
        info!(
            event = "ALERT",
            group = %batch.group_source,
            rows = batch.rows.len(),
            "ALERT | {} | {} new discrepancies\n{}",
            batch.group_source,
            batch.rows.len(),
            batch.render_description(),
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
