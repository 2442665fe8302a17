use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror routes.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct HealthResponse {
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

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct GroupResponse {
    pub source: String,
    pub actionable: usize,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct ResultResponse {
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

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub health: HealthResponse,
    pub groups: Vec<GroupResponse>,
    /// Index into `groups`.
    pub selected: Option<usize>,
    /// Persisted rows of the selected group.
    pub results: Vec<ResultResponse>,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            health: HealthResponse::default(),
            groups: Vec::new(),
            selected: None,
            results: Vec::new(),
            base_url,
        }
    }

    pub fn selected_group(&self) -> Option<&GroupResponse> {
        self.groups.get(self.selected?)
    }

    pub fn select_next(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        let max = self.groups.len() - 1;
        self.selected = Some(self.selected.map_or(0, |i| (i + 1).min(max)));
    }

    pub fn select_prev(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        self.selected = Some(self.selected.map_or(0, |i| i.saturating_sub(1)));
    }

    /// Replace the group list, keeping the selection on the same source when
    /// it still exists.
    pub fn set_groups(&mut self, groups: Vec<GroupResponse>) {
        let previous = self.selected_group().map(|g| g.source.clone());
        self.groups = groups;
        self.selected = match previous {
            Some(source) => self.groups.iter().position(|g| g.source == source),
            None => None,
        }
        .or(if self.groups.is_empty() { None } else { Some(0) });
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let health_url = format!("{}/health", self.base_url);
        let groups_url = format!("{}/groups", self.base_url);

        let (health_res, groups_res) = tokio::join!(
            client.get(&health_url).send(),
            client.get(&groups_url).send(),
        );

        let groups_res = match groups_res {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        match groups_res.json::<Vec<GroupResponse>>().await {
            Ok(groups) => {
                self.set_groups(groups);
                self.status = ConnectionStatus::Connected;
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("parse error: {e}"));
                return;
            }
        }

        if let Ok(h) = health_res {
            if let Ok(health) = h.json::<HealthResponse>().await {
                self.health = health;
            }
        }

        self.refresh_results(client).await;
    }

    /// Fetch persisted rows for the selected group.
    pub async fn refresh_results(&mut self, client: &reqwest::Client) {
        let Some(source) = self.selected_group().map(|g| g.source.clone()) else {
            self.results.clear();
            return;
        };
        let url = format!("{}/groups/{}/results", self.base_url, source);
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                if let Ok(rows) = resp.json::<Vec<ResultResponse>>().await {
                    self.results = rows;
                }
            }
            Ok(resp) => {
                self.status = ConnectionStatus::Error(format!("{source}: HTTP {}", resp.status()));
            }
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_price(v: f64) -> String {
    format!("{v:.2}")
}

/// `O 24.5 Points`
pub fn format_line(side: &str, stat_value: f64, prop: &str) -> String {
    format!("{side} {stat_value} {prop}")
}

/// Edge of the best price over the baseline, signed.
pub fn format_edge(best: f64, mean: f64) -> String {
    format!("{:+.2}", best - mean)
}

pub fn format_ms(ms: Option<u64>) -> String {
    match ms {
        Some(d) if d >= 1000 => format!("{:.1}s", d as f64 / 1000.0),
        Some(d) => format!("{d}ms"),
        None => "—".to_string(),
    }
}

/// How long ago `then_ns` was, relative to `now_ns`. "never" for 0.
pub fn format_age(then_ns: u64, now_ns: u64) -> String {
    if then_ns == 0 {
        return "never".to_string();
    }
    let secs = now_ns.saturating_sub(then_ns) / 1_000_000_000;
    match secs {
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s => format!("{}h ago", s / 3600),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
