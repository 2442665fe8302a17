use crate::config::SourcePolicy;
use crate::types::{round2, DiscrepancyRow, MergedRecord, Side};

/// Single-pass best/worst tracker for one side of one record.
///
/// Prices are fed in source order. Ties keep the earlier source, for both
/// best and worst.
#[derive(Debug, Default)]
struct SideAccumulator<'a> {
    best: Option<(&'a str, f64)>,
    worst: Option<(&'a str, f64)>,
    prices: Vec<f64>,
}

impl<'a> SideAccumulator<'a> {
    fn observe(&mut self, source: &'a str, price: f64, premium: bool) {
        self.prices.push(price);

        if premium && self.best.map_or(true, |(_, best)| price > best) {
            self.best = Some((source, price));
        }
        if self.worst.map_or(true, |(_, worst)| price < worst) {
            self.worst = Some((source, price));
        }
    }

    fn finish(self, record: &MergedRecord, side: Side) -> Option<DiscrepancyRow> {
        let (best_source, best_price) = self.best?;
        let (worst_source, worst_price) = self.worst?;
        let trimmed_mean = trimmed_mean(&self.prices)?;

        Some(DiscrepancyRow {
            identity: record.identity.clone(),
            side,
            best_source: best_source.to_string(),
            best_price,
            worst_source: worst_source.to_string(),
            worst_price,
            spread: round2((worst_price - best_price).abs()),
            trimmed_mean,
        })
    }
}

/// Mean after dropping one highest value and, if at least two values remain,
/// one lowest value. Rounded to 2 decimals. A single price is its own mean.
pub fn trimmed_mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    if prices.len() == 1 {
        return Some(round2(prices[0]));
    }

    let mut rest = prices.to_vec();
    remove_extreme(&mut rest, |a, b| a > b);
    if rest.len() >= 2 {
        remove_extreme(&mut rest, |a, b| a < b);
    }

    let sum: f64 = rest.iter().sum();
    Some(round2(sum / rest.len() as f64))
}

/// Remove exactly one instance of the value that `wins` over every other.
fn remove_extreme(values: &mut Vec<f64>, wins: impl Fn(f64, f64) -> bool) {
    let mut idx = 0;
    for (i, &v) in values.iter().enumerate() {
        if wins(v, values[idx]) {
            idx = i;
        }
    }
    values.remove(idx);
}

/// Best/worst/spread/baseline for one side of one record.
/// None when no premium source prices that side.
pub fn analyze_side(record: &MergedRecord, side: Side, policy: &SourcePolicy) -> Option<DiscrepancyRow> {
    let mut acc = SideAccumulator::default();
    for (source, pair) in &record.quotes {
        if let Some(price) = pair.side(side) {
            acc.observe(source, price, policy.is_premium(source));
        }
    }
    acc.finish(record, side)
}

/// Zero, one or two rows per record (Over, then Under).
pub fn analyze_record(record: &MergedRecord, policy: &SourcePolicy) -> Vec<DiscrepancyRow> {
    Side::BOTH
        .iter()
        .filter_map(|&side| analyze_side(record, side, policy))
        .collect()
}

pub fn analyze_all(records: &[MergedRecord], policy: &SourcePolicy) -> Vec<DiscrepancyRow> {
    records
        .iter()
        .flat_map(|r| analyze_record(r, policy))
        .collect()
}
