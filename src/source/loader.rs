use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::validate_source_name;
use crate::db::models::SourceDataRow;
use crate::error::Result;
use crate::source::normalizer::{normalize, NormalizeStats, RawLine};
use crate::types::SourceTable;

/// Where a source's scraped rows live. Scrapers are external; a loader only
/// reads what they left behind.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<Vec<RawLine>>;

    fn describe(&self) -> String;
}

/// Reads `<source>_data(player, prop, stat_value, over_multi, under_multi)` tables.
pub struct SqliteSourceLoader {
    pool: sqlx::SqlitePool,
}

impl SqliteSourceLoader {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceLoader for SqliteSourceLoader {
    async fn load(&self, source: &str) -> Result<Vec<RawLine>> {
        validate_source_name(source)?;
        // Numeric columns are read as text so malformed values reach the
        // normalizer instead of failing the whole query.
        let sql = format!(
            r#"
            SELECT CAST(player AS TEXT) AS player,
                   CAST(prop AS TEXT) AS prop,
                   CAST(stat_value AS TEXT) AS stat_value,
                   CAST(over_multi AS TEXT) AS over_multi,
                   CAST(under_multi AS TEXT) AS under_multi
            FROM "{source}_data"
            "#
        );
        let rows: Vec<SourceDataRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(RawLine::from).collect())
    }

    fn describe(&self) -> String {
        "sqlite <source>_data tables".to_string()
    }
}

impl From<SourceDataRow> for RawLine {
    fn from(r: SourceDataRow) -> Self {
        RawLine {
            player: r.player,
            prop: r.prop,
            stat_value: r.stat_value.map(Value::String),
            prices: None,
            over: r.over_multi.map(Value::String),
            under: r.under_multi.map(Value::String),
        }
    }
}

/// Reads `<dir>/<source>.json`, each file an array of raw rows.
pub struct JsonDirSourceLoader {
    dir: PathBuf,
}

impl JsonDirSourceLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SourceLoader for JsonDirSourceLoader {
    async fn load(&self, source: &str) -> Result<Vec<RawLine>> {
        validate_source_name(source)?;
        let path = self.dir.join(format!("{source}.json"));
        let text = tokio::fs::read_to_string(&path).await?;
        let values: Vec<Value> = serde_json::from_str(&text)?;
        // A row that does not fit the raw shape becomes an empty row, which
        // the normalizer counts as a missing field.
        Ok(values
            .into_iter()
            .map(|v| {
                serde_json::from_value(v).unwrap_or_else(|e| {
                    debug!(source, "unreadable row: {e}");
                    RawLine::default()
                })
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("json files in {}", self.dir.display())
    }
}

/// Load and normalize every source concurrently. Returns only once every
/// table is materialized, in the order of `sources`. A source that fails to
/// load contributes an empty table.
pub async fn load_all(loader: &dyn SourceLoader, sources: &[String]) -> Vec<SourceTable> {
    let loads = sources.iter().map(|source| async move {
        match loader.load(source).await {
            Ok(rows) => {
                let (table, stats) = normalize(source, rows);
                log_stats(source, &stats);
                table
            }
            Err(e) => {
                warn!(source = %source, "source unavailable, using empty table: {e}");
                SourceTable::empty(source.as_str())
            }
        }
    });

    join_all(loads).await
}

fn log_stats(source: &str, stats: &NormalizeStats) {
    info!(
        source,
        total = stats.total,
        accepted = stats.accepted,
        "[SOURCE] {source}: {} of {} rows usable | rejected: missing_field={} bad_line={} no_prices={} duplicate={}",
        stats.accepted,
        stats.total,
        stats.rejected_missing_field,
        stats.rejected_bad_stat_value,
        stats.rejected_no_prices,
        stats.rejected_duplicate,
    );
}
