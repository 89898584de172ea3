//! Classification & ranking: quantile bands over per-record metrics and
//! campaign-level rankings.

use std::collections::BTreeMap;

use insights_core::{CanonicalRecord, Source};
use serde::{Deserialize, Serialize};

use crate::metrics::{group_by, MetricSnapshot};

/// Quantile with linear interpolation between closest ranks, matching the
/// usual dataframe default. Returns 0 for an empty input.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedMetric {
    Ctr,
    Cpc,
    Roas,
    ConversionRate,
}

impl TrackedMetric {
    pub const ALL: [TrackedMetric; 4] = [Self::Ctr, Self::Cpc, Self::Roas, Self::ConversionRate];

    pub fn value(&self, snapshot: &MetricSnapshot) -> f64 {
        match self {
            Self::Ctr => snapshot.ctr,
            Self::Cpc => snapshot.cpc,
            Self::Roas => snapshot.roas,
            Self::ConversionRate => snapshot.conversion_rate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassificationOptions {
    pub top_quantile: f64,
    pub bottom_quantile: f64,
    /// Rows below this spend are excluded from the bottom population.
    pub bottom_min_spend: f64,
    pub limit: usize,
}

impl Default for ClassificationOptions {
    fn default() -> Self {
        Self {
            top_quantile: 0.9,
            bottom_quantile: 0.1,
            bottom_min_spend: 50.0,
            limit: 10,
        }
    }
}

/// One classified row.
#[derive(Debug, Clone, Serialize)]
pub struct PerformerEntry {
    pub source: Source,
    pub campaign_name: String,
    pub adset_name: String,
    pub ad_name: String,
    pub value: f64,
    pub spend: f64,
    pub conversions: f64,
}

impl PerformerEntry {
    fn new(record: &CanonicalRecord, value: f64) -> Self {
        Self {
            source: record.source,
            campaign_name: record.campaign_name.clone(),
            adset_name: record.adset_name.clone(),
            ad_name: record.ad_name.clone(),
            value,
            spend: record.spend,
            conversions: record.conversions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricBand {
    pub threshold: f64,
    pub entries: Vec<PerformerEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformerBands {
    pub top: BTreeMap<TrackedMetric, MetricBand>,
    /// Empty when no row reaches the bottom spend floor.
    pub bottom: BTreeMap<TrackedMetric, MetricBand>,
}

/// Top band: rows at or above the top quantile over all rows. Bottom band:
/// rows at or below the bottom quantile over rows meeting the spend floor.
/// Both truncated to `limit` in arrival order.
pub fn classify(records: &[CanonicalRecord], opts: &ClassificationOptions) -> PerformerBands {
    let snapshots: Vec<MetricSnapshot> = records.iter().map(MetricSnapshot::of).collect();
    let qualifying: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.spend >= opts.bottom_min_spend)
        .map(|(i, _)| i)
        .collect();

    let mut bands = PerformerBands::default();
    for metric in TrackedMetric::ALL {
        let values: Vec<f64> = snapshots.iter().map(|s| metric.value(s)).collect();

        let threshold = quantile(&values, opts.top_quantile);
        let entries = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= threshold)
            .take(opts.limit)
            .map(|(i, v)| PerformerEntry::new(&records[i], *v))
            .collect();
        bands.top.insert(metric, MetricBand { threshold, entries });

        if qualifying.is_empty() {
            continue;
        }
        let subset: Vec<f64> = qualifying.iter().map(|&i| values[i]).collect();
        let threshold = quantile(&subset, opts.bottom_quantile);
        let entries = qualifying
            .iter()
            .filter(|&&i| values[i] <= threshold)
            .take(opts.limit)
            .map(|&i| PerformerEntry::new(&records[i], values[i]))
            .collect();
        bands.bottom.insert(metric, MetricBand { threshold, entries });
    }
    bands
}

// ---------------------------------------------------------------------------
// Campaign comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CampaignRankings {
    pub best_roas: Vec<String>,
    pub best_ctr: Vec<String>,
    pub best_conversion_rate: Vec<String>,
    pub best_conversions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignComparison {
    pub campaign_comparison: BTreeMap<String, MetricSnapshot>,
    pub campaign_rankings: CampaignRankings,
    pub total_campaigns: usize,
}

const RANKING_LIMIT: usize = 5;

fn rank_by(
    campaigns: &BTreeMap<String, MetricSnapshot>,
    key: impl Fn(&MetricSnapshot) -> f64,
) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = campaigns.iter().map(|(k, s)| (k, key(s))).collect();
    // Stable sort keeps name order among equal values.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(RANKING_LIMIT)
        .map(|(name, _)| name.clone())
        .collect()
}

/// Per-campaign aggregates plus top-5 rankings on four metrics.
pub fn compare_campaigns(records: &[CanonicalRecord]) -> CampaignComparison {
    let campaigns: BTreeMap<String, MetricSnapshot> =
        group_by(records, |r| r.campaign_name.clone())
            .into_iter()
            .map(|(name, totals)| (name, totals.snapshot()))
            .collect();

    let campaign_rankings = CampaignRankings {
        best_roas: rank_by(&campaigns, |s| s.roas),
        best_ctr: rank_by(&campaigns, |s| s.ctr),
        best_conversion_rate: rank_by(&campaigns, |s| s.conversion_rate),
        best_conversions: rank_by(&campaigns, |s| s.conversions),
    };

    CampaignComparison {
        total_campaigns: campaigns.len(),
        campaign_comparison: campaigns,
        campaign_rankings,
    }
}

// ---------------------------------------------------------------------------
// Top campaigns
// ---------------------------------------------------------------------------

/// Spend floor for a row to count towards the top-campaigns view.
pub const TOP_CAMPAIGN_MIN_SPEND: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct TopCampaign {
    pub source: Source,
    pub campaign_name: String,
    pub spend: f64,
    pub conversions: f64,
    pub clicks: f64,
    pub roas: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopCampaigns {
    pub top_campaigns: Vec<TopCampaign>,
    pub total_analyzed: usize,
}

/// Rows with spend above the floor, grouped by (source, campaign), ranked
/// by aggregated roas. `None` when no row qualifies.
pub fn top_campaigns(records: &[CanonicalRecord], limit: usize) -> Option<TopCampaigns> {
    let groups = group_by(
        records.iter().filter(|r| r.spend > TOP_CAMPAIGN_MIN_SPEND),
        |r| (r.source, r.campaign_name.clone()),
    );
    if groups.is_empty() {
        return None;
    }

    let total_analyzed = groups.len();
    let mut ranked: Vec<TopCampaign> = groups
        .into_iter()
        .map(|((source, campaign_name), totals)| TopCampaign {
            source,
            campaign_name,
            spend: totals.spend,
            conversions: totals.conversions,
            clicks: totals.clicks,
            roas: totals.snapshot().roas,
        })
        .collect();
    ranked.sort_by(|a, b| b.roas.total_cmp(&a.roas));
    ranked.truncate(limit);

    Some(TopCampaigns {
        top_campaigns: ranked,
        total_analyzed,
    })
}
