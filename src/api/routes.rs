use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::SourcePolicy;
use crate::db::models::ResultRow;
use crate::db::ResultStore;
use crate::error::AppError;
use crate::state::{GroupStatus, ScanSnapshot};
use crate::types::{DiscrepancyRow, MergedRecord};

#[derive(Clone)]
pub struct ApiState {
    pub store: ResultStore,
    pub policy: SourcePolicy,
    pub snapshot: Arc<ScanSnapshot>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/groups", get(get_groups))
        .route("/groups/:source/results", get(get_group_results))
        .route("/discrepancies", get(get_discrepancies))
        .route("/props", get(get_props))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct PropsQuery {
    pub player: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", "starting" before the first cycle, or "degraded" when a group
    /// failed in the last cycle.
    pub status: String,
    pub cycle_running: bool,
    pub cycles_completed: u64,
    pub last_cycle_at_ns: u64,
    pub last_cycle_failed_groups: u64,
    pub alerts_failed: u64,
    pub groups_tracked: usize,
    pub cycle_p50_ms: Option<u64>,
    pub cycle_p95_ms: Option<u64>,
    pub cycle_p99_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let health = &state.health;
    let (p50, p95, p99) = state.latency.percentiles();
    let status = if health.cycles_completed() == 0 {
        "starting"
    } else if health.last_cycle_failed_groups() > 0 {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: status.to_string(),
        cycle_running: health.cycle_running(),
        cycles_completed: health.cycles_completed(),
        last_cycle_at_ns: health.last_cycle_at_ns(),
        last_cycle_failed_groups: health.last_cycle_failed_groups(),
        alerts_failed: health.alerts_failed(),
        groups_tracked: state.snapshot.group_count(),
        cycle_p50_ms: p50,
        cycle_p95_ms: p95,
        cycle_p99_ms: p99,
    })
}

/// Every alertable group, including ones no cycle has reached yet.
async fn get_groups(State(state): State<ApiState>) -> Json<Vec<GroupStatus>> {
    let groups = state
        .policy
        .alertable_groups()
        .into_iter()
        .map(|source| {
            state.snapshot.group(&source).unwrap_or(GroupStatus {
                source,
                ..Default::default()
            })
        })
        .collect();
    Json(groups)
}

async fn get_group_results(
    State(state): State<ApiState>,
    Path(source): Path<String>,
) -> Result<Json<Vec<ResultRow>>, AppError> {
    if !state.policy.alertable_groups().contains(&source) {
        return Err(AppError::UnknownGroup(source));
    }
    let rows = state.store.list(&source).await?;
    Ok(Json(rows))
}

async fn get_discrepancies(State(state): State<ApiState>) -> Json<Vec<DiscrepancyRow>> {
    Json(state.snapshot.actionable())
}

async fn get_props(
    State(state): State<ApiState>,
    Query(params): Query<PropsQuery>,
) -> Json<Vec<MergedRecord>> {
    let player = params.player.as_deref().map(str::trim).filter(|p| !p.is_empty());
    Json(state.snapshot.merged(player))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms: p50,
        p95_ms: p95,
        p99_ms: p99,
        max_ms: state.latency.max_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PricePair, PropIdentity, Side};

    async fn state() -> ApiState {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ApiState {
            store: ResultStore::new(pool),
            policy: SourcePolicy {
                sources: vec!["draftkings".into(), "sleeper".into(), "underdog".into()],
                premium: ["sleeper", "underdog"].iter().map(|s| s.to_string()).collect(),
                excluded: ["draftkings"].iter().map(|s| s.to_string()).collect(),
            },
            snapshot: ScanSnapshot::new(),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(LatencyStats::new()),
        }
    }

    fn row(player: &str) -> DiscrepancyRow {
        DiscrepancyRow {
            identity: PropIdentity::new(player, "Assists", 7.5),
            side: Side::Under,
            best_source: "sleeper".to_string(),
            best_price: 1.74,
            worst_source: "draftkings".to_string(),
            worst_price: 1.48,
            spread: 0.26,
            trimmed_mean: 1.62,
        }
    }

    #[tokio::test]
    async fn unknown_or_excluded_group_is_rejected() {
        let state = state().await;

        let err = get_group_results(State(state.clone()), Path("draftkings".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownGroup(_)));

        let err = get_group_results(State(state), Path("nope".to_string())).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownGroup(_)));
    }

    #[tokio::test]
    async fn group_results_come_from_the_store() {
        let state = state().await;
        state.store.apply("sleeper", &[row("Tyrese Haliburton")]).await.unwrap();

        let Json(rows) = get_group_results(State(state), Path("sleeper".to_string())).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].player, "Tyrese Haliburton");
        assert_eq!(rows[0].side, "U");
    }

    #[tokio::test]
    async fn groups_listed_before_first_cycle() {
        let state = state().await;

        let Json(groups) = get_groups(State(state)).await;

        let names: Vec<String> = groups.into_iter().map(|g| g.source).collect();
        assert_eq!(names, vec!["sleeper", "underdog"]);
    }

    #[tokio::test]
    async fn health_reports_starting_then_degraded() {
        let state = state().await;
        assert_eq!(get_health(State(state.clone())).await.0.status, "starting");

        state.health.finish_cycle(1, 1);
        let Json(health) = get_health(State(state.clone())).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.cycles_completed, 1);

        state.health.finish_cycle(2, 0);
        assert_eq!(get_health(State(state)).await.0.status, "ok");
    }

    #[tokio::test]
    async fn props_filter_ignores_blank_player() {
        let state = state().await;
        let record = MergedRecord {
            identity: PropIdentity::new("Tyrese Haliburton", "Assists", 7.5),
            quotes: vec![("sleeper".to_string(), PricePair::new(None, Some(1.74)))],
        };
        state.snapshot.replace_records(&[record], &[row("Tyrese Haliburton")]);

        let Json(all) = get_props(State(state.clone()), Query(PropsQuery { player: Some("  ".to_string()) })).await;
        let Json(none) = get_props(State(state.clone()), Query(PropsQuery { player: Some("jokic".to_string()) })).await;
        let Json(rows) = get_discrepancies(State(state)).await;

        assert_eq!(all.len(), 1);
        assert!(none.is_empty());
        assert_eq!(rows.len(), 1);
    }
}
