use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::config::validate_source_name;
use crate::db::models::ResultRow;
use crate::db::reconcile::reconcile;
use crate::error::Result;
use crate::types::{DiscrepancyRow, ResultKey};

/// Outcome of one group's reconciliation.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Rows persisted for the first time, in input order.
    pub inserted: Vec<DiscrepancyRow>,
    pub updated: usize,
    pub removed: usize,
}

/// Change-tracking persistence for result groups. Each group owns a
/// `<group>_results` table keyed by (player, prop, stat_value, side).
#[derive(Clone)]
pub struct ResultStore {
    pool: sqlx::SqlitePool,
}

impl ResultStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    pub fn table_name(group: &str) -> Result<String> {
        validate_source_name(group)?;
        Ok(format!("{group}_results"))
    }

    pub async fn ensure_table(&self, group: &str) -> Result<()> {
        let table = Self::table_name(group)?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player TEXT NOT NULL,
                prop TEXT NOT NULL,
                stat_value REAL NOT NULL,
                side TEXT NOT NULL CHECK (side IN ('O', 'U')),
                best_source TEXT NOT NULL,
                best_price REAL NOT NULL,
                worst_source TEXT NOT NULL,
                worst_price REAL NOT NULL,
                spread REAL NOT NULL,
                trimmed_mean REAL NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "{table}_identity" ON "{table}" (player, prop, stat_value, side)"#
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persisted rows for a group, lowest trimmed mean first.
    pub async fn list(&self, group: &str) -> Result<Vec<ResultRow>> {
        let table = Self::table_name(group)?;
        self.ensure_table(group).await?;
        let rows = sqlx::query_as(&format!(
            r#"SELECT * FROM "{table}" ORDER BY trimmed_mean ASC, id ASC"#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Bring a group's table in line with `current`: removals, then updates,
    /// then inserts, committed as one transaction. On error nothing is
    /// written. Returns the newly inserted rows.
    pub async fn apply(&self, group: &str, current: &[DiscrepancyRow]) -> Result<ApplyOutcome> {
        let table = Self::table_name(group)?;
        self.ensure_table(group).await?;

        let mut tx = self.pool.begin().await?;

        let existing: Vec<ResultRow> = sqlx::query_as(&format!(r#"SELECT * FROM "{table}""#))
            .fetch_all(&mut *tx)
            .await?;
        let ids: HashMap<ResultKey, i64> = existing
            .iter()
            .filter_map(|r| Some((r.to_discrepancy()?.key(), r.id)))
            .collect();
        // Rows with an unreadable side can never match; clear them with the removals.
        let orphans: Vec<i64> = existing
            .iter()
            .filter(|r| r.to_discrepancy().is_none())
            .map(|r| r.id)
            .collect();
        let keys: HashSet<ResultKey> = ids.keys().cloned().collect();

        let plan = reconcile(&keys, current);
        if plan.is_noop() && orphans.is_empty() {
            return Ok(ApplyOutcome::default());
        }
        let now = now_ns() as i64;

        let delete_sql = format!(r#"DELETE FROM "{table}" WHERE id = ?"#);
        let remove_ids: Vec<i64> = plan
            .to_remove
            .iter()
            .filter_map(|k| ids.get(k).copied())
            .chain(orphans)
            .collect();
        for &id in &remove_ids {
            sqlx::query(&delete_sql).bind(id).execute(&mut *tx).await?;
        }

        let update_sql = format!(
            r#"
            UPDATE "{table}"
            SET best_source = ?, best_price = ?, worst_source = ?, worst_price = ?,
                spread = ?, trimmed_mean = ?, updated_at = ?
            WHERE id = ?
            "#
        );
        for row in &plan.to_update {
            let Some(&id) = ids.get(&row.key()) else { continue };
            sqlx::query(&update_sql)
                .bind(&row.best_source)
                .bind(row.best_price)
                .bind(&row.worst_source)
                .bind(row.worst_price)
                .bind(row.spread)
                .bind(row.trimmed_mean)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        let insert_sql = format!(
            r#"
            INSERT INTO "{table}" (
                player, prop, stat_value, side,
                best_source, best_price, worst_source, worst_price,
                spread, trimmed_mean, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );
        for row in &plan.to_insert {
            sqlx::query(&insert_sql)
                .bind(&row.identity.player)
                .bind(&row.identity.prop)
                .bind(row.identity.stat_value)
                .bind(row.side.as_str())
                .bind(&row.best_source)
                .bind(row.best_price)
                .bind(&row.worst_source)
                .bind(row.worst_price)
                .bind(row.spread)
                .bind(row.trimmed_mean)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let outcome = ApplyOutcome {
            inserted: plan.to_insert.into_iter().cloned().collect(),
            updated: plan.to_update.len(),
            removed: remove_ids.len(),
        };
        debug!(
            group,
            inserted = outcome.inserted.len(),
            updated = outcome.updated,
            removed = outcome.removed,
            "result table reconciled"
        );
        Ok(outcome)
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
