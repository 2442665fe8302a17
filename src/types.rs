use serde::{Deserialize, Serialize};

use crate::config::LINE_KEY_SCALE;

// ---------------------------------------------------------------------------
// Prop identity
// ---------------------------------------------------------------------------

/// A betting line as quoted across books: player, prop label and line value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropIdentity {
    pub player: String,
    pub prop: String,
    pub stat_value: f64,
}

impl PropIdentity {
    pub fn new(player: impl Into<String>, prop: impl Into<String>, stat_value: f64) -> Self {
        Self {
            player: player.into(),
            prop: prop.into(),
            stat_value,
        }
    }

    pub fn key(&self) -> PropKey {
        PropKey {
            player: self.player.clone(),
            prop: self.prop.clone(),
            line: line_key(self.stat_value),
        }
    }
}

/// Hashable, totally ordered form of a `PropIdentity`.
/// The line value is stored as a fixed-point integer to avoid float map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropKey {
    pub player: String,
    pub prop: String,
    pub line: i64,
}

#[inline]
pub fn line_key(stat_value: f64) -> i64 {
    (stat_value * LINE_KEY_SCALE).round() as i64
}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "O")]
    Over,
    #[serde(rename = "U")]
    Under,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Over, Side::Under];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Over => "O",
            Side::Under => "U",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "O" => Some(Side::Over),
            "U" => Some(Side::Under),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Over/under decimal multipliers offered by one source for one line.
/// `None` means the source does not currently offer that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PricePair {
    pub over: Option<f64>,
    pub under: Option<f64>,
}

impl PricePair {
    pub fn new(over: Option<f64>, under: Option<f64>) -> Self {
        Self { over, under }
    }

    pub fn side(&self, side: Side) -> Option<f64> {
        match side {
            Side::Over => self.over,
            Side::Under => self.under,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.over.is_none() && self.under.is_none()
    }
}

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

/// One normalized line from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub identity: PropIdentity,
    pub prices: PricePair,
}

/// Every normalized line one source offered this cycle. May be empty.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub source: String,
    pub lines: Vec<SourceLine>,
}

impl SourceTable {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lines: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merged records
// ---------------------------------------------------------------------------

/// A line with the prices of every source quoting it, in configured source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub identity: PropIdentity,
    pub quotes: Vec<(String, PricePair)>,
}

impl MergedRecord {
    pub fn source_count(&self) -> usize {
        self.quotes.len()
    }
}

// ---------------------------------------------------------------------------
// Discrepancies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRow {
    pub identity: PropIdentity,
    pub side: Side,
    pub best_source: String,
    pub best_price: f64,
    pub worst_source: String,
    pub worst_price: f64,
    pub spread: f64,
    pub trimmed_mean: f64,
}

impl DiscrepancyRow {
    pub fn key(&self) -> ResultKey {
        ResultKey {
            prop: self.identity.key(),
            side: self.side,
        }
    }

    /// Best price minus the market baseline.
    pub fn edge(&self) -> f64 {
        self.best_price - self.trimmed_mean
    }
}

/// Uniqueness key of a persisted result: the line plus the side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub prop: PropKey,
    pub side: Side,
}

/// Round to 2 decimal places.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_lines_share_a_key() {
        let a = PropIdentity::new("Jokic", "Points", 25.5);
        let b = PropIdentity::new("Jokic", "Points", 25.500000001);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), PropIdentity::new("Jokic", "Points", 26.5).key());
    }

    #[test]
    fn side_round_trips_through_its_code() {
        for side in Side::BOTH {
            assert_eq!(Side::parse(side.as_str()), Some(side));
        }
        assert_eq!(Side::parse("X"), None);
    }

    #[test]
    fn round2_handles_float_noise() {
        assert_eq!(round2((1.90f64 - 1.75).abs()), 0.15);
        assert_eq!(round2(1.676), 1.68);
        assert_eq!(round2(1.7249), 1.72);
    }
}
