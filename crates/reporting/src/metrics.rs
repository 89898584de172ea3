//! Metrics engine: derived performance ratios for single records and for
//! aggregated groups. Every ratio uses the same additive epsilon guard and
//! is scrubbed of NaN/Inf. Grouped views always recompute ratios from the
//! summed numerators and denominators.

use std::collections::BTreeMap;

use insights_core::CanonicalRecord;
use serde::{Deserialize, Serialize};

/// Added to every ratio denominator.
pub const EPSILON: f64 = 0.001;

/// Replace NaN and ±Inf with 0.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `numerator / (denominator + ε)`, scrubbed.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    finite_or_zero(numerator / (denominator + EPSILON))
}

/// Exact share in percent with an explicit zero check. Used where shares
/// must sum to 100.
pub fn share_pct(part: f64, total: f64) -> f64 {
    if total == 0.0 || !total.is_finite() {
        0.0
    } else {
        finite_or_zero(part / total * 100.0)
    }
}

/// Derived metrics for one record or one aggregate group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    /// Percent.
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub roas: f64,
    pub conversion_rate: f64,
    pub cost_per_conversion: f64,
    pub efficiency_score: f64,
}

impl MetricSnapshot {
    pub fn from_totals(impressions: f64, clicks: f64, spend: f64, conversions: f64) -> Self {
        let impressions = finite_or_zero(impressions);
        let clicks = finite_or_zero(clicks);
        let spend = finite_or_zero(spend);
        let conversions = finite_or_zero(conversions);

        let ctr = finite_or_zero(safe_div(clicks, impressions) * 100.0);
        let roas = safe_div(conversions, spend);
        Self {
            impressions,
            clicks,
            spend,
            conversions,
            ctr,
            cpc: safe_div(spend, clicks),
            cpm: finite_or_zero(safe_div(spend, impressions) * 1000.0),
            roas,
            conversion_rate: safe_div(conversions, clicks),
            cost_per_conversion: safe_div(spend, conversions),
            efficiency_score: finite_or_zero(roas * ctr * 100.0),
        }
    }

    pub fn of(record: &CanonicalRecord) -> Self {
        Self::from_totals(
            record.impressions,
            record.clicks,
            record.spend,
            record.conversions,
        )
    }

    /// Ratio-of-sums over any set of records.
    pub fn aggregate<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalRecord>,
    {
        let mut totals = Totals::default();
        for record in records {
            totals.add(record);
        }
        totals.snapshot()
    }
}

/// Running sums of the additive fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub rows: usize,
}

impl Totals {
    pub fn add(&mut self, record: &CanonicalRecord) {
        self.impressions += record.impressions;
        self.clicks += record.clicks;
        self.spend += record.spend;
        self.conversions += record.conversions;
        self.rows += 1;
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot::from_totals(self.impressions, self.clicks, self.spend, self.conversions)
    }
}

/// Group records by a key and aggregate each group. Keys come back sorted.
pub fn group_by<'a, K, I, F>(records: I, key: F) -> BTreeMap<K, Totals>
where
    K: Ord,
    I: IntoIterator<Item = &'a CanonicalRecord>,
    F: Fn(&CanonicalRecord) -> K,
{
    let mut groups: BTreeMap<K, Totals> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().add(record);
    }
    groups
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        finite_or_zero(values.iter().sum::<f64>() / values.len() as f64)
    }
}
