use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertBatch, AlertSink};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, SourcePolicy, Thresholds};
use crate::db::ResultStore;
use crate::detector::{analyze_all, filter_actionable, group_by_best_source, merge_tables, single_source_props};
use crate::source::{load_all, SourceLoader};
use crate::state::{GroupStatus, ScanSnapshot};

/// Totals for one cycle, mostly for logging.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub merged: usize,
    pub analyzed: usize,
    pub actionable: usize,
    pub inserted: usize,
    pub alerts_sent: usize,
    pub failed_groups: Vec<String>,
}

/// Load → merge → analyze → filter → reconcile → alert, once per interval.
pub struct CycleRunner {
    loader: Arc<dyn SourceLoader>,
    store: ResultStore,
    sink: Arc<dyn AlertSink>,
    policy: SourcePolicy,
    thresholds: Thresholds,
    min_sources: usize,
    snapshot: Arc<ScanSnapshot>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl CycleRunner {
    pub fn new(
        cfg: &Config,
        loader: Arc<dyn SourceLoader>,
        store: ResultStore,
        sink: Arc<dyn AlertSink>,
        snapshot: Arc<ScanSnapshot>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            loader,
            store,
            sink,
            policy: cfg.policy.clone(),
            thresholds: cfg.thresholds.clone(),
            min_sources: cfg.min_sources,
            snapshot,
            health,
            latency,
        }
    }

    /// Runs one cycle immediately, then one per `interval_secs`. Returns after
    /// the first cycle when `run_once` is set.
    pub async fn run(self, interval_secs: u64, run_once: bool) {
        info!(
            loader = %self.loader.describe(),
            sink = self.sink.name(),
            groups = ?self.policy.alertable_groups(),
            "Cycle runner starting (interval {interval_secs}s)",
        );

        self.run_cycle().await;
        if run_once {
            return;
        }

        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        ticker.tick().await; // first tick fires immediately; the bootstrap cycle covered it

        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        self.health.set_cycle_running(true);
        let mut report = CycleReport::default();

        let tables = load_all(self.loader.as_ref(), &self.policy.sources).await;

        let merged = merge_tables(&tables, self.min_sources);
        report.merged = merged.len();

        let singles = single_source_props(&tables);
        debug!(count = singles.len(), "props quoted by a single source");
        for (prop, source) in &singles {
            debug!(prop = %prop, source = %source, "single-source prop");
        }

        let rows = analyze_all(&merged, &self.policy);
        report.analyzed = rows.len();
        let actionable = filter_actionable(rows, &self.thresholds);
        report.actionable = actionable.len();
        info!(
            merged = report.merged,
            analyzed = report.analyzed,
            actionable = report.actionable,
            "[CYCLE] {} merged lines | {} side rows | {} actionable",
            report.merged,
            report.analyzed,
            report.actionable,
        );

        self.snapshot.replace_records(&merged, &actionable);
        let mut groups = group_by_best_source(actionable, &self.policy);

        for group in self.policy.alertable_groups() {
            let current = groups.remove(&group).unwrap_or_default();
            let mut status = GroupStatus {
                source: group.clone(),
                actionable: current.len(),
                ..Default::default()
            };

            let outcome = match self.store.apply(&group, &current).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(group = %group, "Reconciliation failed, group left unchanged: {e}");
                    status.error = Some(e.to_string());
                    report.failed_groups.push(group);
                    self.snapshot.set_group(status);
                    continue;
                }
            };

            status.inserted = outcome.inserted.len();
            status.updated = outcome.updated;
            status.removed = outcome.removed;
            report.inserted += status.inserted;
            info!(
                group = %group,
                inserted = status.inserted,
                updated = status.updated,
                removed = status.removed,
                "[GROUP] {group}: +{} new, {} updated, -{} removed",
                status.inserted,
                status.updated,
                status.removed,
            );
            self.snapshot.set_group(status);

            if let Some(batch) = AlertBatch::build(&group, outcome.inserted, &merged) {
                match self.sink.send(&batch).await {
                    Ok(()) => {
                        report.alerts_sent += 1;
                        info!(group = %group, rows = batch.rows.len(), sink = self.sink.name(), "Alert sent");
                    }
                    Err(e) => {
                        self.health.inc_alerts_failed();
                        warn!(group = %group, sink = self.sink.name(), "Alert delivery failed: {e}");
                    }
                }
            }
        }

        if !groups.is_empty() {
            warn!(groups = ?groups.keys().collect::<Vec<_>>(), "rows routed to sources outside the configured groups");
        }

        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        self.health.finish_cycle(now_ns(), report.failed_groups.len() as u64);
        info!(
            duration_ms = elapsed.as_millis() as u64,
            inserted = report.inserted,
            alerts = report.alerts_sent,
            failed_groups = report.failed_groups.len(),
            "Cycle complete in {}ms",
            elapsed.as_millis(),
        );

        report
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::{AppError, Result};
    use crate::source::normalizer::RawLine;

    /// Serves rows from memory; contents can be swapped between cycles.
    #[derive(Default)]
    struct MemoryLoader {
        rows: Mutex<HashMap<String, Vec<RawLine>>>,
    }

    impl MemoryLoader {
        fn set(&self, source: &str, rows: Vec<RawLine>) {
            self.rows.lock().unwrap().insert(source.to_string(), rows);
        }
    }

    #[async_trait]
    impl SourceLoader for MemoryLoader {
        async fn load(&self, source: &str) -> Result<Vec<RawLine>> {
            self.rows
                .lock()
                .unwrap()
                .get(source)
                .cloned()
                .ok_or_else(|| AppError::InvalidSource(source.to_string()))
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<AlertBatch>>,
        fail: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send(&self, batch: &AlertBatch) -> Result<()> {
            self.batches.lock().unwrap().push(batch.clone());
            if self.fail {
                return Err(AppError::AlertRejected("503 Service Unavailable".to_string()));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn line(player: &str, over: f64) -> RawLine {
        RawLine {
            player: Some(player.to_string()),
            prop: Some("Points".to_string()),
            stat_value: Some(json!(24.5)),
            over: Some(json!(over)),
            ..Default::default()
        }
    }

    fn config() -> Config {
        let names = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Config {
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            policy: SourcePolicy {
                sources: names(&["draftkings", "sleeper", "underdog", "prizepicks"]),
                premium: names(&["sleeper", "underdog", "prizepicks"]).into_iter().collect(),
                excluded: names(&["draftkings"]).into_iter().collect(),
            },
            source_dir: None,
            min_sources: 2,
            thresholds: Thresholds::default(),
            cycle_interval_secs: 600,
            run_once: true,
            discord_webhook_url: None,
            alert_footer: String::new(),
            source_images: HashMap::new(),
        }
    }

    /// Over prices: draftkings 1.50, sleeper `sleeper_over`, underdog 1.60,
    /// prizepicks 1.62. With sleeper at 1.75 the trimmed mean is 1.61 and the
    /// row is actionable for the sleeper group.
    fn seed(loader: &MemoryLoader, sleeper_over: f64) {
        loader.set("draftkings", vec![line("Jalen Brunson", 1.50)]);
        loader.set("sleeper", vec![line("Jalen Brunson", sleeper_over), line("Solo Player", 1.75)]);
        loader.set("underdog", vec![line("Jalen Brunson", 1.60)]);
        loader.set("prizepicks", vec![line("Jalen Brunson", 1.62)]);
    }

    struct Harness {
        runner: CycleRunner,
        loader: Arc<MemoryLoader>,
        sink: Arc<RecordingSink>,
        store: ResultStore,
        pool: sqlx::SqlitePool,
        snapshot: Arc<ScanSnapshot>,
        health: Arc<HealthState>,
    }

    async fn harness(failing_sink: bool) -> Harness {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let loader = Arc::new(MemoryLoader::default());
        let sink = Arc::new(RecordingSink {
            fail: failing_sink,
            ..Default::default()
        });
        let store = ResultStore::new(pool.clone());
        let snapshot = ScanSnapshot::new();
        let health = Arc::new(HealthState::new());
        let runner = CycleRunner::new(
            &config(),
            loader.clone(),
            store.clone(),
            sink.clone(),
            snapshot.clone(),
            health.clone(),
            Arc::new(LatencyStats::new()),
        );
        Harness {
            runner,
            loader,
            sink,
            store,
            pool,
            snapshot,
            health,
        }
    }

    #[tokio::test]
    async fn new_rows_are_persisted_and_alerted_once() {
        let h = harness(false).await;
        seed(&h.loader, 1.75);

        let first = h.runner.run_cycle().await;
        assert_eq!(first.merged, 1);
        assert_eq!(first.actionable, 1);
        assert_eq!(first.inserted, 1);
        {
            let batches = h.sink.batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].group_source, "sleeper");
            let row = &batches[0].rows[0];
            assert_eq!(row.best_source, "sleeper");
            assert_eq!(row.worst_source, "draftkings");
            assert_eq!(row.trimmed_mean, 1.61);
            assert_eq!(batches[0].odds_by_identity[&row.identity.key()].len(), 4);
        }

        let second = h.runner.run_cycle().await;
        assert_eq!(second.inserted, 0);
        assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
        assert_eq!(h.store.list("sleeper").await.unwrap().len(), 1);
        assert_eq!(h.health.cycles_completed(), 2);
    }

    #[tokio::test]
    async fn rows_that_stop_qualifying_are_removed_without_alert() {
        let h = harness(false).await;
        seed(&h.loader, 1.75);
        h.runner.run_cycle().await;

        // above the best-price band
        seed(&h.loader, 1.80);
        let report = h.runner.run_cycle().await;

        assert_eq!(report.actionable, 0);
        assert!(h.store.list("sleeper").await.unwrap().is_empty());
        assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
        assert_eq!(h.snapshot.group("sleeper").unwrap().removed, 1);
    }

    #[tokio::test]
    async fn alert_failure_keeps_persisted_rows() {
        let h = harness(true).await;
        seed(&h.loader, 1.75);

        let report = h.runner.run_cycle().await;

        assert_eq!(report.alerts_sent, 0);
        assert_eq!(h.health.alerts_failed(), 1);
        assert_eq!(h.store.list("sleeper").await.unwrap().len(), 1);

        // already persisted, so no retry on the next cycle
        h.runner.run_cycle().await;
        assert_eq!(h.sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_group_does_not_stop_the_others() {
        let h = harness(false).await;
        seed(&h.loader, 1.75);
        h.store.ensure_table("sleeper").await.unwrap();
        sqlx::query(
            r#"CREATE TRIGGER reject_all BEFORE INSERT ON "sleeper_results"
               BEGIN SELECT RAISE(ABORT, 'locked'); END"#,
        )
        .execute(&h.pool)
        .await
        .unwrap();

        let report = h.runner.run_cycle().await;

        assert_eq!(report.failed_groups, vec!["sleeper".to_string()]);
        assert!(h.sink.batches.lock().unwrap().is_empty());
        assert!(h.snapshot.group("sleeper").unwrap().error.is_some());
        assert!(h.snapshot.group("underdog").unwrap().error.is_none());
        assert_eq!(h.health.last_cycle_failed_groups(), 1);
    }

    #[tokio::test]
    async fn missing_source_counts_as_empty() {
        let h = harness(false).await;
        h.loader.set("sleeper", vec![line("Jalen Brunson", 1.75)]);
        h.loader.set("underdog", vec![line("Jalen Brunson", 1.60)]);

        let report = h.runner.run_cycle().await;

        assert_eq!(report.merged, 1);
        assert!(report.failed_groups.is_empty());
        assert_eq!(h.snapshot.groups().len(), 3);
    }
}
