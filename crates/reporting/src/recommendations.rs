//! Recommendation engine: independent rules evaluated over per-record and
//! grouped metrics. Output is ordered high priority first and is never
//! empty.

use insights_core::{CanonicalRecord, Source};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classification::quantile;
use crate::metrics::{group_by, mean, share_pct, MetricSnapshot};

/// Maximum entities listed on a single recommendation.
pub const MAX_AFFECTED: usize = 5;

pub const NO_RECOMMENDATIONS: &str = "No specific recommendations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    PauseCampaigns,
    ScaleCampaigns,
    PlatformShift,
    CampaignRestructure,
    NoAction,
}

/// Declaration order is sort order: high first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct AffectedEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub spend: f64,
    pub roas: f64,
    pub ctr: f64,
    /// Dollar or percentage impact attributed to this entity.
    pub impact: String,
}

/// Aggregate dollar figure attached to a recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct PotentialImpact {
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub priority: Priority,
    pub message: String,
    pub details: String,
    pub affected_entities: Vec<AffectedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_impact: Option<PotentialImpact>,
}

impl Recommendation {
    pub fn no_action() -> Self {
        Self {
            kind: RecommendationType::NoAction,
            priority: Priority::Low,
            message: NO_RECOMMENDATIONS.to_string(),
            details: String::new(),
            affected_entities: Vec::new(),
            potential_impact: None,
        }
    }
}

/// Inputs shared by every rule: the records plus their per-row metrics.
pub struct RuleContext<'a> {
    pub records: &'a [CanonicalRecord],
    pub snapshots: Vec<MetricSnapshot>,
    pub min_spend: f64,
}

impl<'a> RuleContext<'a> {
    pub fn new(records: &'a [CanonicalRecord], min_spend: f64) -> Self {
        Self {
            records,
            snapshots: records.iter().map(MetricSnapshot::of).collect(),
            min_spend,
        }
    }

    /// Indices of rows with spend at or above the threshold.
    fn significant(&self) -> Vec<usize> {
        (0..self.records.len())
            .filter(|&i| self.records[i].spend >= self.min_spend)
            .collect()
    }

    fn row_entity(&self, idx: usize, impact: String) -> AffectedEntity {
        let record = &self.records[idx];
        let snap = &self.snapshots[idx];
        AffectedEntity {
            name: record.campaign_name.clone(),
            source: Some(record.source),
            spend: record.spend,
            roas: snap.roas,
            ctr: snap.ctr,
            impact,
        }
    }
}

pub trait RecommendationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation>;
}

// ---------------------------------------------------------------------------
// Pause
// ---------------------------------------------------------------------------

pub struct PauseRule;

impl RecommendationRule for PauseRule {
    fn name(&self) -> &'static str {
        "pause"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let significant = ctx.significant();
        if significant.is_empty() {
            return None;
        }
        let ctrs: Vec<f64> = significant.iter().map(|&i| ctx.snapshots[i].ctr).collect();
        let p20 = quantile(&ctrs, 0.2);

        let poor: Vec<usize> = significant
            .into_iter()
            .filter(|&i| ctx.snapshots[i].ctr < p20 && ctx.snapshots[i].roas < 1.0)
            .collect();
        if poor.is_empty() {
            return None;
        }

        let savings: f64 = poor.iter().map(|&i| ctx.records[i].spend).sum();
        Some(Recommendation {
            kind: RecommendationType::PauseCampaigns,
            priority: Priority::High,
            message: format!("Consider pausing {} underperforming campaigns", poor.len()),
            details: format!("These campaigns have low CTR and ROAS < 1.0, wasting ${savings:.2}"),
            affected_entities: poor
                .iter()
                .take(MAX_AFFECTED)
                .map(|&i| ctx.row_entity(i, format!("${:.2} savings", ctx.records[i].spend)))
                .collect(),
            potential_impact: Some(PotentialImpact {
                label: "potential_savings".to_string(),
                amount: savings,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

pub struct ScaleRule;

impl RecommendationRule for ScaleRule {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let significant = ctx.significant();
        if significant.is_empty() {
            return None;
        }
        let roas: Vec<f64> = significant.iter().map(|&i| ctx.snapshots[i].roas).collect();
        let ctrs: Vec<f64> = significant.iter().map(|&i| ctx.snapshots[i].ctr).collect();
        let p80 = quantile(&roas, 0.8);
        let mean_ctr = mean(&ctrs);
        let significant_spend: f64 = significant.iter().map(|&i| ctx.records[i].spend).sum();

        let top: Vec<usize> = significant
            .into_iter()
            .filter(|&i| ctx.snapshots[i].roas > p80 && ctx.snapshots[i].ctr > mean_ctr)
            .collect();
        if top.is_empty() {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationType::ScaleCampaigns,
            priority: Priority::High,
            message: format!(
                "Consider increasing budget for {} high-performing campaigns",
                top.len()
            ),
            details: "These campaigns have high ROAS and above-average CTR".to_string(),
            affected_entities: top
                .iter()
                .take(MAX_AFFECTED)
                .map(|&i| {
                    let share = share_pct(ctx.records[i].spend, significant_spend);
                    ctx.row_entity(i, format!("{share:.1}% of qualifying spend"))
                })
                .collect(),
            potential_impact: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Platform shift
// ---------------------------------------------------------------------------

pub struct PlatformShiftRule {
    pub ratio: f64,
}

impl Default for PlatformShiftRule {
    fn default() -> Self {
        Self { ratio: 1.5 }
    }
}

/// Best and worst platform by aggregated roas. Ties keep the first in
/// platform order. `None` with fewer than two platforms.
pub(crate) fn platform_extremes(
    records: &[CanonicalRecord],
) -> Option<((Source, MetricSnapshot), (Source, MetricSnapshot))> {
    let platforms: Vec<(Source, MetricSnapshot)> = group_by(records, |r| r.source)
        .into_iter()
        .map(|(source, totals)| (source, totals.snapshot()))
        .collect();
    if platforms.len() < 2 {
        return None;
    }
    let mut best = platforms[0];
    let mut worst = platforms[0];
    for p in &platforms[1..] {
        if p.1.roas > best.1.roas {
            best = *p;
        }
        if p.1.roas < worst.1.roas {
            worst = *p;
        }
    }
    Some((best, worst))
}

impl RecommendationRule for PlatformShiftRule {
    fn name(&self) -> &'static str {
        "platform_shift"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let ((best, best_snap), (worst, worst_snap)) = platform_extremes(ctx.records)?;
        if best_snap.roas <= worst_snap.roas * self.ratio {
            return None;
        }

        let entity = |source: Source, snap: &MetricSnapshot| AffectedEntity {
            name: source.as_str().to_string(),
            source: Some(source),
            spend: snap.spend,
            roas: snap.roas,
            ctr: snap.ctr,
            impact: format!("ROAS {:.2}", snap.roas),
        };

        Some(Recommendation {
            kind: RecommendationType::PlatformShift,
            priority: Priority::Medium,
            message: format!("Consider shifting budget from {worst} to {best}"),
            details: format!(
                "{best} shows {:.2} ROAS vs {worst} at {:.2} ROAS",
                best_snap.roas, worst_snap.roas
            ),
            affected_entities: vec![entity(best, &best_snap), entity(worst, &worst_snap)],
            potential_impact: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Campaign restructure
// ---------------------------------------------------------------------------

pub struct RestructureRule {
    pub max_roas: f64,
    pub min_spend: f64,
}

impl Default for RestructureRule {
    fn default() -> Self {
        Self {
            max_roas: 0.5,
            min_spend: 500.0,
        }
    }
}

impl RecommendationRule for RestructureRule {
    fn name(&self) -> &'static str {
        "campaign_restructure"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let underperforming: Vec<(String, MetricSnapshot)> =
            group_by(ctx.records, |r| r.campaign_name.clone())
                .into_iter()
                .map(|(name, totals)| (name, totals.snapshot()))
                .filter(|(_, s)| s.roas < self.max_roas && s.spend > self.min_spend)
                .collect();
        if underperforming.is_empty() {
            return None;
        }

        let total_wasted: f64 = underperforming.iter().map(|(_, s)| s.spend).sum();
        Some(Recommendation {
            kind: RecommendationType::CampaignRestructure,
            priority: Priority::Medium,
            message: format!(
                "Review {} campaigns with ROAS < {}",
                underperforming.len(),
                self.max_roas
            ),
            details: format!("These campaigns spent ${total_wasted:.2} with poor returns"),
            affected_entities: underperforming
                .iter()
                .take(MAX_AFFECTED)
                .map(|(name, s)| AffectedEntity {
                    name: name.clone(),
                    source: None,
                    spend: s.spend,
                    roas: s.roas,
                    ctr: s.ctr,
                    impact: format!("${:.2} spent at ROAS {:.2}", s.spend, s.roas),
                })
                .collect(),
            potential_impact: Some(PotentialImpact {
                label: "total_wasted".to_string(),
                amount: total_wasted,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RecommendationEngine {
    rules: Vec<Box<dyn RecommendationRule>>,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(PauseRule),
                Box::new(ScaleRule),
                Box::new(PlatformShiftRule::default()),
                Box::new(RestructureRule::default()),
            ],
        }
    }
}

impl RecommendationEngine {
    pub fn with_rules(rules: Vec<Box<dyn RecommendationRule>>) -> Self {
        Self { rules }
    }

    pub fn generate(&self, records: &[CanonicalRecord], min_spend: f64) -> Vec<Recommendation> {
        let ctx = RuleContext::new(records, min_spend);
        let mut out: Vec<Recommendation> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let rec = rule.evaluate(&ctx);
                debug!(rule = rule.name(), fired = rec.is_some(), "Rule evaluated");
                rec
            })
            .collect();

        if out.is_empty() {
            return vec![Recommendation::no_action()];
        }
        out.sort_by_key(|r| r.priority);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        source: Source,
        campaign: &str,
        spend: f64,
        conversions: f64,
        clicks: f64,
        impressions: f64,
    ) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(source);
        r.campaign_name = campaign.into();
        r.spend = spend;
        r.conversions = conversions;
        r.clicks = clicks;
        r.impressions = impressions;
        r
    }

    #[test]
    fn test_healthy_dataset_yields_sentinel() {
        // Every row: roas >= 1, identical ctr so nothing is strictly below P20.
        let rows: Vec<CanonicalRecord> = (0..5)
            .map(|i| row(Source::Meta, &format!("C{i}"), 200.0, 300.0, 50.0, 1000.0))
            .collect();
        let recs = RecommendationEngine::default().generate(&rows, 100.0);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationType::NoAction);
        assert_eq!(recs[0].message, NO_RECOMMENDATIONS);
    }

    #[test]
    fn test_pause_rule() {
        let mut rows: Vec<CanonicalRecord> = (0..9)
            .map(|i| row(Source::Meta, &format!("Good{i}"), 200.0, 300.0, 50.0, 1000.0))
            .collect();
        rows.push(row(Source::Meta, "Bad", 400.0, 1.0, 1.0, 1000.0));
        let rec = PauseRule.evaluate(&RuleContext::new(&rows, 100.0)).unwrap();
        assert_eq!(rec.kind, RecommendationType::PauseCampaigns);
        assert_eq!(rec.affected_entities.len(), 1);
        assert_eq!(rec.affected_entities[0].name, "Bad");
        let impact = rec.potential_impact.unwrap();
        assert!((impact.amount - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pause_ignores_rows_below_threshold() {
        let rows = vec![
            row(Source::Meta, "Tiny", 10.0, 0.0, 0.0, 1000.0),
            row(Source::Meta, "Ok", 200.0, 300.0, 50.0, 1000.0),
        ];
        assert!(PauseRule.evaluate(&RuleContext::new(&rows, 100.0)).is_none());
    }

    #[test]
    fn test_scale_rule() {
        let mut rows: Vec<CanonicalRecord> = (0..9)
            .map(|i| row(Source::GoogleAds, &format!("Avg{i}"), 200.0, 100.0, 20.0, 1000.0))
            .collect();
        rows.push(row(Source::GoogleAds, "Star", 200.0, 900.0, 90.0, 1000.0));
        let rec = ScaleRule.evaluate(&RuleContext::new(&rows, 100.0)).unwrap();
        assert_eq!(rec.affected_entities.len(), 1);
        assert_eq!(rec.affected_entities[0].name, "Star");
        assert_eq!(rec.affected_entities[0].impact, "10.0% of qualifying spend");
    }

    #[test]
    fn test_platform_shift_needs_two_platforms() {
        let single = vec![row(Source::Meta, "A", 100.0, 10.0, 1.0, 10.0)];
        assert!(PlatformShiftRule::default()
            .evaluate(&RuleContext::new(&single, 100.0))
            .is_none());

        let rows = vec![
            row(Source::Meta, "A", 100.0, 10.0, 1.0, 10.0),
            row(Source::GoogleAds, "B", 100.0, 40.0, 1.0, 10.0),
        ];
        let rec = PlatformShiftRule::default()
            .evaluate(&RuleContext::new(&rows, 100.0))
            .unwrap();
        assert_eq!(rec.message, "Consider shifting budget from meta to google_ads");
        assert_eq!(rec.affected_entities.len(), 2);
    }

    #[test]
    fn test_restructure_uses_ratio_of_sums() {
        // Per-row roas averages above 0.5, but the campaign aggregate is far below.
        let rows = vec![
            row(Source::Meta, "Leaky", 600.0, 10.0, 10.0, 100.0),
            row(Source::Meta, "Leaky", 0.0, 5.0, 10.0, 100.0),
            row(Source::Meta, "Fine", 600.0, 900.0, 10.0, 100.0),
        ];
        let rec = RestructureRule::default()
            .evaluate(&RuleContext::new(&rows, 100.0))
            .unwrap();
        assert_eq!(rec.affected_entities.len(), 1);
        assert_eq!(rec.affected_entities[0].name, "Leaky");
        assert!((rec.potential_impact.unwrap().amount - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_output_sorted_by_priority() {
        let mut rows: Vec<CanonicalRecord> = (0..9)
            .map(|i| row(Source::Meta, &format!("Good{i}"), 200.0, 300.0, 50.0, 1000.0))
            .collect();
        rows.push(row(Source::Meta, "Bad", 800.0, 1.0, 1.0, 1000.0));
        rows.push(row(Source::GoogleAds, "G", 100.0, 1.0, 1.0, 1000.0));
        let recs = RecommendationEngine::default().generate(&rows, 100.0);
        assert!(recs.len() >= 2);
        assert!(recs.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert_eq!(recs[0].priority, Priority::High);
    }

    #[test]
    fn test_affected_entities_capped() {
        let mut rows: Vec<CanonicalRecord> = (0..40)
            .map(|i| row(Source::Meta, &format!("Good{i}"), 200.0, 300.0, 50.0, 1000.0))
            .collect();
        for i in 0..8 {
            rows.push(row(Source::Meta, &format!("Bad{i}"), 700.0, 1.0, 1.0, 1000.0));
        }
        let recs = RecommendationEngine::default().generate(&rows, 100.0);
        assert!(recs.iter().all(|r| r.affected_entities.len() <= MAX_AFFECTED));
    }
}
