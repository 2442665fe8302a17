/// Database row types. Used by sqlx for typed queries.
use serde::Serialize;

use crate::types::{DiscrepancyRow, PropIdentity, Side};

/// A scraped line as stored in `<source>_data`. Every column is read as text
/// and validated by the normalizer.
#[derive(Debug, sqlx::FromRow)]
pub struct SourceDataRow {
    pub player: Option<String>,
    pub prop: Option<String>,
    pub stat_value: Option<String>,
    pub over_multi: Option<String>,
    pub under_multi: Option<String>,
}

/// A persisted discrepancy in `<group>_results`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ResultRow {
    pub id: i64,
    pub player: String,
    pub prop: String,
    pub stat_value: f64,
    pub side: String,
    pub best_source: String,
    pub best_price: f64,
    pub worst_source: String,
    pub worst_price: f64,
    pub spread: f64,
    pub trimmed_mean: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ResultRow {
    /// None if the stored side code is not `O`/`U`.
    pub fn to_discrepancy(&self) -> Option<DiscrepancyRow> {
        Some(DiscrepancyRow {
            identity: PropIdentity::new(self.player.clone(), self.prop.clone(), self.stat_value),
            side: Side::parse(&self.side)?,
            best_source: self.best_source.clone(),
            best_price: self.best_price,
            worst_source: self.worst_source.clone(),
            worst_price: self.worst_price,
            spread: self.spread,
            trimmed_mean: self.trimmed_mean,
        })
    }
}
