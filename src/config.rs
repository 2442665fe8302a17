use std::collections::{HashMap, HashSet};

use crate::error::{AppError, Result};

pub const DEFAULT_SOURCES: &str = "draftkings,vividpicks,parlayplay,sleeper,prizepicks,underdog";

/// DFS apps. Only these may supply the "best" price of a discrepancy.
pub const DEFAULT_PREMIUM_SOURCES: &str = "vividpicks,parlayplay,sleeper,prizepicks,underdog";

/// Reference books that are never alerted on as a winning source.
pub const DEFAULT_EXCLUDED_SOURCES: &str = "draftkings";

/// A line must be quoted by at least this many sources to survive the merge.
pub const DEFAULT_MIN_SOURCES: usize = 2;

/// Seconds between cycles.
pub const CYCLE_INTERVAL_SECS: u64 = 600;

/// Fixed-point scale for line values used as identity keys (4 decimal places).
pub const LINE_KEY_SCALE: f64 = 10_000.0;

/// Float slack applied to threshold comparisons.
pub const THRESHOLD_EPSILON: f64 = 1e-9;

/// Discord caps embed descriptions at this many characters.
pub const DISCORD_DESCRIPTION_LIMIT: usize = 4096;

/// Actionability thresholds (decimal multipliers).
pub mod thresholds {
    pub const MIN_EDGE: f64 = 0.05;
    pub const BEST_PRICE_MIN: f64 = 1.70;
    pub const BEST_PRICE_MAX: f64 = 1.78;
    pub const BASELINE_MAX: f64 = 1.68;
}

/// Numeric filter applied to analyzer output.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Minimum `best_price - trimmed_mean` (MIN_EDGE)
    pub min_edge: f64,
    /// Lower bound of the best-price band (BEST_PRICE_MIN)
    pub best_price_min: f64,
    /// Upper bound of the best-price band (BEST_PRICE_MAX)
    pub best_price_max: f64,
    /// Maximum trimmed-mean baseline (BASELINE_MAX)
    pub baseline_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_edge: thresholds::MIN_EDGE,
            best_price_min: thresholds::BEST_PRICE_MIN,
            best_price_max: thresholds::BEST_PRICE_MAX,
            baseline_max: thresholds::BASELINE_MAX,
        }
    }
}

/// Which sources may win a comparison and which may be alerted on.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    /// Every source, in the order used for merging and tie-breaks.
    pub sources: Vec<String>,
    pub premium: HashSet<String>,
    pub excluded: HashSet<String>,
}

impl SourcePolicy {
    pub fn is_premium(&self, source: &str) -> bool {
        self.premium.contains(source)
    }

    pub fn is_excluded(&self, source: &str) -> bool {
        self.excluded.contains(source)
    }

    /// Sources that can own a result group: premium and not excluded,
    /// in configured order.
    pub fn alertable_groups(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| self.is_premium(s) && !self.is_excluded(s))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub policy: SourcePolicy,
    /// Directory of `<source>.json` files (SOURCE_DIR). When unset, sources are
    /// read from `<source>_data` tables in the scanner database.
    pub source_dir: Option<String>,
    /// Minimum number of quoting sources for a merged line (MIN_SOURCES)
    pub min_sources: usize,
    pub thresholds: Thresholds,
    pub cycle_interval_secs: u64,
    /// Run a single cycle then exit (RUN_ONCE)
    pub run_once: bool,
    pub discord_webhook_url: Option<String>,
    pub alert_footer: String,
    /// source → thumbnail image URL for alert embeds (SOURCE_IMAGES)
    pub source_images: HashMap<String, String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sources = parse_source_list("SOURCES", &env_or("SOURCES", DEFAULT_SOURCES))?;
        let premium = parse_source_list(
            "PREMIUM_SOURCES",
            &env_or("PREMIUM_SOURCES", DEFAULT_PREMIUM_SOURCES),
        )?;
        let excluded = parse_source_list(
            "EXCLUDED_SOURCES",
            &env_or("EXCLUDED_SOURCES", DEFAULT_EXCLUDED_SOURCES),
        )?;

        if sources.is_empty() {
            return Err(AppError::Config("SOURCES must name at least one source".to_string()));
        }
        if let Some(unknown) = premium.iter().find(|p| !sources.contains(p)) {
            return Err(AppError::Config(format!(
                "PREMIUM_SOURCES entry {unknown:?} is not listed in SOURCES"
            )));
        }

        let min_sources = parse_env::<usize>("MIN_SOURCES", DEFAULT_MIN_SOURCES)?;
        if min_sources == 0 {
            return Err(AppError::Config("MIN_SOURCES must be at least 1".to_string()));
        }

        let thresholds = Thresholds {
            min_edge: parse_env("MIN_EDGE", thresholds::MIN_EDGE)?,
            best_price_min: parse_env("BEST_PRICE_MIN", thresholds::BEST_PRICE_MIN)?,
            best_price_max: parse_env("BEST_PRICE_MAX", thresholds::BEST_PRICE_MAX)?,
            baseline_max: parse_env("BASELINE_MAX", thresholds::BASELINE_MAX)?,
        };
        if thresholds.best_price_min > thresholds.best_price_max {
            return Err(AppError::Config(
                "BEST_PRICE_MIN must not exceed BEST_PRICE_MAX".to_string(),
            ));
        }

        Ok(Self {
            log_level: env_or("LOG_LEVEL", "info"),
            db_path: env_or("DB_PATH", "props.db"),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            policy: SourcePolicy {
                sources,
                premium: premium.into_iter().collect(),
                excluded: excluded.into_iter().collect(),
            },
            source_dir: non_empty_env("SOURCE_DIR"),
            min_sources,
            thresholds,
            cycle_interval_secs: parse_env("CYCLE_INTERVAL_SECS", CYCLE_INTERVAL_SECS)?,
            run_once: parse_env("RUN_ONCE", false)?,
            discord_webhook_url: non_empty_env("DISCORD_WEBHOOK_URL"),
            alert_footer: env_or("ALERT_FOOTER", "Odds provided by prop-scanner"),
            source_images: parse_source_map("SOURCE_IMAGES", &env_or("SOURCE_IMAGES", ""))?,
        })
    }
}

/// Source names become SQLite table names, so only `[a-z0-9_]` is allowed.
pub fn validate_source_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidSource(name.to_string()))
    }
}

fn parse_source_list(var: &str, raw: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for name in raw.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) {
        validate_source_name(&name)
            .map_err(|_| AppError::Config(format!("{var} contains invalid source name {name:?}")))?;
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}

/// `source=value,source=value`. Later entries override earlier ones.
fn parse_source_map(var: &str, raw: &str) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| AppError::Config(format!("{var} entry {entry:?} must be source=value")))?;
        let name = name.trim().to_lowercase();
        validate_source_name(&name)
            .map_err(|_| AppError::Config(format!("{var} contains invalid source name {name:?}")))?;
        out.insert(name, value.trim().to_string());
    }
    Ok(out)
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> Result<T> {
    match non_empty_env(var) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{var} has invalid value {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_list_is_trimmed_lowercased_and_deduplicated() {
        let list = parse_source_list("SOURCES", " Sleeper, underdog ,,sleeper").unwrap();
        assert_eq!(list, vec!["sleeper".to_string(), "underdog".to_string()]);
    }

    #[test]
    fn source_names_reject_sql_metacharacters() {
        assert!(validate_source_name("prize_picks2").is_ok());
        assert!(validate_source_name("").is_err());
        assert!(validate_source_name("bad\"name").is_err());
        assert!(validate_source_name("drop table").is_err());
        assert!(parse_source_list("SOURCES", "ok,no-dash").is_err());
    }

    #[test]
    fn alertable_groups_follow_source_order() {
        let policy = SourcePolicy {
            sources: vec!["draftkings".into(), "underdog".into(), "sleeper".into(), "bet365".into()],
            premium: ["sleeper", "underdog", "draftkings"].iter().map(|s| s.to_string()).collect(),
            excluded: ["draftkings"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(policy.alertable_groups(), vec!["underdog".to_string(), "sleeper".to_string()]);
    }

    #[test]
    fn source_map_parses_pairs_and_rejects_garbage() {
        let map = parse_source_map(
            "SOURCE_IMAGES",
            " Sleeper=https://img.example/sleeper.png, underdog = https://img.example/ud.png?v=2 ",
        )
        .unwrap();
        assert_eq!(map["sleeper"], "https://img.example/sleeper.png");
        assert_eq!(map["underdog"], "https://img.example/ud.png?v=2");
        assert!(parse_source_map("SOURCE_IMAGES", "").unwrap().is_empty());
        assert!(parse_source_map("SOURCE_IMAGES", "sleeper").is_err());
        assert!(parse_source_map("SOURCE_IMAGES", "bad name=x").is_err());
    }

    #[test]
    fn default_thresholds_match_constants() {
        let t = Thresholds::default();
        assert_eq!(t.min_edge, 0.05);
        assert_eq!(t.best_price_min, 1.70);
        assert_eq!(t.best_price_max, 1.78);
        assert_eq!(t.baseline_max, 1.68);
    }
}
