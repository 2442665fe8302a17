use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::types::{PricePair, PropIdentity, SourceLine, SourceTable};

/// One row as a scraper stored it. Every field is optional and loosely typed;
/// `normalize` decides what is usable.
///
/// Prices arrive either as a two-element `prices` array `[over, under]` or as
/// separate `over_multi` / `under_multi` fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLine {
    #[serde(default)]
    pub player: Option<String>,
    #[serde(default)]
    pub prop: Option<String>,
    #[serde(default, alias = "statValue")]
    pub stat_value: Option<Value>,
    #[serde(default)]
    pub prices: Option<Value>,
    #[serde(default, alias = "over_multi", alias = "overPrice")]
    pub over: Option<Value>,
    #[serde(default, alias = "under_multi", alias = "underPrice")]
    pub under: Option<Value>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeStats {
    pub total: usize,
    pub rejected_missing_field: usize,
    pub rejected_bad_stat_value: usize,
    pub rejected_no_prices: usize,
    pub rejected_duplicate: usize,
    pub accepted: usize,
}

impl NormalizeStats {
    pub fn rejected(&self) -> usize {
        self.total - self.accepted
    }
}

enum Rejection {
    MissingField,
    BadStatValue,
    NoPrices,
}

/// Validate and reshape one source's raw rows.
/// Malformed rows are dropped and counted, never surfaced as errors.
/// When a source repeats a line, the first occurrence wins.
pub fn normalize(source: &str, rows: Vec<RawLine>) -> (SourceTable, NormalizeStats) {
    let mut stats = NormalizeStats {
        total: rows.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(rows.len());

    for row in rows {
        match parse_line(row) {
            Ok(line) => {
                if seen.insert(line.identity.key()) {
                    lines.push(line);
                    stats.accepted += 1;
                } else {
                    stats.rejected_duplicate += 1;
                }
            }
            Err(Rejection::MissingField) => stats.rejected_missing_field += 1,
            Err(Rejection::BadStatValue) => stats.rejected_bad_stat_value += 1,
            Err(Rejection::NoPrices) => stats.rejected_no_prices += 1,
        }
    }

    (
        SourceTable {
            source: source.to_string(),
            lines,
        },
        stats,
    )
}

fn parse_line(row: RawLine) -> Result<SourceLine, Rejection> {
    let player = non_blank(row.player).ok_or(Rejection::MissingField)?;
    let prop = non_blank(row.prop).ok_or(Rejection::MissingField)?;
    let stat_value = row
        .stat_value
        .as_ref()
        .and_then(as_number)
        .ok_or(Rejection::BadStatValue)?;

    let prices = price_pair(row.prices.as_ref())
        .unwrap_or_else(|| PricePair::new(price(row.over.as_ref()), price(row.under.as_ref())));
    if prices.is_empty() {
        return Err(Rejection::NoPrices);
    }

    Ok(SourceLine {
        identity: PropIdentity::new(player, prop, stat_value),
        prices,
    })
}

/// `[over, under]` array form. None when the array is absent or not two elements.
fn price_pair(v: Option<&Value>) -> Option<PricePair> {
    match v?.as_array()?.as_slice() {
        [over, under] => Some(PricePair::new(price(Some(over)), price(Some(under)))),
        _ => None,
    }
}

/// A usable decimal multiplier: numeric, finite and above 1.0.
fn price(v: Option<&Value>) -> Option<f64> {
    v.and_then(as_number).filter(|p| *p > 1.0)
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn non_blank(s: Option<String>) -> Option<String> {
    let s = s?.trim().to_string();
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: Value) -> Vec<RawLine> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn accepts_array_and_field_price_forms() {
        let (table, stats) = normalize(
            "sleeper",
            rows(json!([
                {"player": "Luka Doncic", "prop": "Points", "statValue": 31.5, "prices": [1.78, 1.82]},
                {"player": "Jalen Brunson", "prop": "Assists", "stat_value": "6.5", "over_multi": 1.7, "under_multi": "1.9"}
            ])),
        );

        assert_eq!(stats.accepted, 2);
        assert_eq!(table.source, "sleeper");
        assert_eq!(table.lines[0].prices, PricePair::new(Some(1.78), Some(1.82)));
        assert_eq!(table.lines[1].identity.stat_value, 6.5);
        assert_eq!(table.lines[1].prices, PricePair::new(Some(1.7), Some(1.9)));
    }

    #[test]
    fn drops_non_numeric_line_values() {
        let (table, stats) = normalize(
            "underdog",
            rows(json!([
                {"player": "A", "prop": "Points", "statValue": "TBD", "prices": [1.8, 1.8]},
                {"player": "B", "prop": "Points", "statValue": null, "prices": [1.8, 1.8]},
                {"player": "C", "prop": "Points", "prices": [1.8, 1.8]},
                {"player": "D", "prop": "Points", "statValue": 10.5, "prices": [1.8, 1.8]}
            ])),
        );

        assert_eq!(stats.rejected_bad_stat_value, 3);
        assert_eq!(table.lines.len(), 1);
        assert_eq!(table.lines[0].identity.player, "D");
    }

    #[test]
    fn drops_rows_missing_player_prop_or_every_price() {
        let (table, stats) = normalize(
            "prizepicks",
            rows(json!([
                {"prop": "Points", "statValue": 10.5, "prices": [1.8, 1.8]},
                {"player": "  ", "prop": "Points", "statValue": 10.5, "prices": [1.8, 1.8]},
                {"player": "A", "statValue": 10.5, "prices": [1.8, 1.8]},
                {"player": "A", "prop": "Points", "statValue": 10.5, "prices": [null, "x"]},
                {"player": "A", "prop": "Points", "statValue": 10.5, "prices": [0.9, 1.0]}
            ])),
        );

        assert!(table.lines.is_empty());
        assert_eq!(stats.rejected_missing_field, 3);
        assert_eq!(stats.rejected_no_prices, 2);
        assert_eq!(stats.rejected(), 5);
    }

    #[test]
    fn keeps_one_sided_quotes() {
        let (table, _) = normalize(
            "parlayplay",
            rows(json!([{"player": "A", "prop": "Rebounds", "statValue": 8.5, "prices": [1.75, null]}])),
        );
        assert_eq!(table.lines[0].prices, PricePair::new(Some(1.75), None));
    }

    #[test]
    fn first_duplicate_wins_and_prop_labels_pass_through() {
        let (table, stats) = normalize(
            "vividpicks",
            rows(json!([
                {"player": "A", "prop": "Pts+Rebs", "statValue": 30.5, "prices": [1.8, 1.8]},
                {"player": "A", "prop": "Pts+Rebs", "statValue": 30.5, "prices": [1.5, 1.5]}
            ])),
        );
        assert_eq!(stats.rejected_duplicate, 1);
        assert_eq!(table.lines.len(), 1);
        assert_eq!(table.lines[0].identity.prop, "Pts+Rebs");
        assert_eq!(table.lines[0].prices.over, Some(1.8));
    }
}
