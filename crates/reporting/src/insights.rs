//! The analysis facade. Every entry point reads the same immutable
//! dataset and returns an [`Outcome`]: a result, or `{"error": ...}` when
//! there is nothing to analyse.

use std::collections::BTreeMap;

use insights_core::config::AnalysisConfig;
use insights_core::{CanonicalRecord, Outcome, Source, UnifiedDataset};
use serde::Serialize;
use tracing::{info, instrument};

use crate::action_plan::{generate_action_plan, ActionPlan};
use crate::budget::{BudgetOptimizer, BudgetPlan, RoasCtrScorer};
use crate::classification::{
    classify, compare_campaigns, top_campaigns, CampaignComparison, ClassificationOptions,
    PerformerBands, TopCampaigns,
};
use crate::funnel::{analyze_funnel, FunnelReport};
use crate::metrics::{group_by, MetricSnapshot};
use crate::recommendations::{Recommendation, RecommendationEngine};
use crate::trend::{analyze_trends, TrendMetric, TrendReport};

pub const NO_AD_DATA: &str = "No ad data available";

// ---------------------------------------------------------------------------
// Result shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_records: usize,
    pub data_sources: BTreeMap<Source, usize>,
    pub total_spend: f64,
    pub total_conversions: f64,
    pub total_clicks: f64,
    pub overall_roas: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightsReport {
    pub summary: Summary,
    pub platform_performance: BTreeMap<Source, MetricSnapshot>,
    /// `None` when no campaign clears the spend floor.
    pub top_campaigns: Option<TopCampaigns>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallMetrics {
    pub total_spend: f64,
    pub total_conversions: f64,
    pub total_clicks: f64,
    pub total_impressions: f64,
    pub overall_ctr: f64,
    pub overall_cpc: f64,
    pub overall_roas: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub overall_metrics: OverallMetrics,
    pub platform_comparison: BTreeMap<Source, MetricSnapshot>,
    pub top_performers: PerformerBands,
    pub bottom_performers: PerformerBands,
    pub campaign_summary: BTreeMap<String, MetricSnapshot>,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Runs the analyses over one tenant's dataset. Ad analytics (performance,
/// recommendations, plans, budget, comparison, trends) see only ad-platform
/// rows; the summary and the funnel see everything.
pub struct InsightsGenerator<'a> {
    dataset: &'a UnifiedDataset,
    ad_records: Vec<CanonicalRecord>,
    settings: AnalysisConfig,
}

impl<'a> InsightsGenerator<'a> {
    pub fn new(dataset: &'a UnifiedDataset) -> Self {
        Self::with_settings(dataset, AnalysisConfig::default())
    }

    pub fn with_settings(dataset: &'a UnifiedDataset, settings: AnalysisConfig) -> Self {
        let ad_records = dataset
            .iter()
            .filter(|r| r.source.is_ad_platform())
            .cloned()
            .collect();
        Self {
            dataset,
            ad_records,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }

    fn ads<T>(&self) -> Result<&[CanonicalRecord], Outcome<T>> {
        if self.dataset.is_empty() {
            Err(Outcome::no_data())
        } else if self.ad_records.is_empty() {
            Err(Outcome::unavailable(NO_AD_DATA))
        } else {
            Ok(&self.ad_records)
        }
    }

    #[instrument(skip(self), fields(tenant = %self.dataset.context().user_id))]
    pub fn generate_insights(&self) -> Outcome<InsightsReport> {
        if self.dataset.is_empty() {
            return Outcome::no_data();
        }

        let all = MetricSnapshot::aggregate(self.dataset);
        let summary = Summary {
            total_records: self.dataset.len(),
            data_sources: self.dataset.source_counts(),
            total_spend: all.spend,
            total_conversions: all.conversions,
            total_clicks: all.clicks,
            overall_roas: all.roas,
        };

        let report = InsightsReport {
            summary,
            platform_performance: platform_snapshots(self.dataset.records()),
            top_campaigns: top_campaigns(&self.ad_records, self.settings.top_campaigns_limit),
            recommendations: if self.ad_records.is_empty() {
                vec![Recommendation::no_action()]
            } else {
                RecommendationEngine::default()
                    .generate(&self.ad_records, self.settings.min_spend_threshold)
            },
        };
        info!(
            records = report.summary.total_records,
            recommendations = report.recommendations.len(),
            "insights generated"
        );
        Outcome::Ready(report)
    }

    pub fn analyze_performance(&self) -> Outcome<PerformanceReport> {
        let records = match self.ads() {
            Ok(records) => records,
            Err(outcome) => return outcome,
        };

        let total = MetricSnapshot::aggregate(records);

        let bands = classify(
            records,
            &ClassificationOptions {
                bottom_min_spend: self.settings.bottom_min_spend,
                limit: self.settings.performer_limit,
                ..Default::default()
            },
        );

        Outcome::Ready(PerformanceReport {
            overall_metrics: OverallMetrics {
                total_spend: total.spend,
                total_conversions: total.conversions,
                total_clicks: total.clicks,
                total_impressions: total.impressions,
                overall_ctr: total.ctr,
                overall_cpc: total.cpc,
                overall_roas: total.roas,
            },
            platform_comparison: platform_snapshots(records),
            top_performers: PerformerBands {
                top: bands.top,
                bottom: BTreeMap::new(),
            },
            bottom_performers: PerformerBands {
                top: BTreeMap::new(),
                bottom: bands.bottom,
            },
            campaign_summary: group_by(records, |r| r.campaign_name.clone())
                .into_iter()
                .map(|(name, totals)| (name, totals.snapshot()))
                .collect(),
        })
    }

    pub fn generate_recommendations(&self, min_spend: f64) -> Outcome<Vec<Recommendation>> {
        match self.ads() {
            Ok(records) => {
                Outcome::Ready(RecommendationEngine::default().generate(records, min_spend))
            }
            Err(outcome) => outcome,
        }
    }

    pub fn generate_action_plan(&self, budget_increase_limit: f64) -> Outcome<ActionPlan> {
        match self.ads() {
            Ok(records) => Outcome::Ready(generate_action_plan(records, budget_increase_limit)),
            Err(outcome) => outcome,
        }
    }

    pub fn calculate_budget_reallocation(&self, total_budget: f64) -> Outcome<BudgetPlan> {
        let records = match self.ads() {
            Ok(records) => records,
            Err(outcome) => return outcome,
        };
        if !total_budget.is_finite() || total_budget < 0.0 {
            return Outcome::unavailable(format!("Invalid total budget: {total_budget}"));
        }
        let optimizer =
            BudgetOptimizer::new(Box::new(RoasCtrScorer), self.settings.budget_deadband);
        Outcome::Ready(optimizer.plan(records, total_budget))
    }

    pub fn compare_campaigns(&self) -> Outcome<CampaignComparison> {
        match self.ads() {
            Ok(records) => Outcome::Ready(compare_campaigns(records)),
            Err(outcome) => outcome,
        }
    }

    pub fn analyze_trends(&self, metric: &str) -> Outcome<TrendReport> {
        let records = match self.ads() {
            Ok(records) => records,
            Err(outcome) => return outcome,
        };
        let Some(metric) = TrendMetric::parse(metric) else {
            return Outcome::unavailable(format!("Metric '{metric}' not found in data"));
        };
        match analyze_trends(records, metric) {
            Some(report) => Outcome::Ready(report),
            None => Outcome::unavailable("No date column found for trend analysis"),
        }
    }

    pub fn analyze_funnel(&self) -> Outcome<FunnelReport> {
        if self.dataset.is_empty() {
            return Outcome::no_data();
        }
        match analyze_funnel(self.dataset.records()) {
            Some(report) => Outcome::Ready(report),
            None => Outcome::no_data(),
        }
    }
}

fn platform_snapshots(records: &[CanonicalRecord]) -> BTreeMap<Source, MetricSnapshot> {
    group_by(records, |r| r.source)
        .into_iter()
        .map(|(source, totals)| (source, totals.snapshot()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::PlanStatus;
    use crate::recommendations::RecommendationType;
    use insights_core::TenantContext;

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

    fn dataset(records: Vec<CanonicalRecord>) -> UnifiedDataset {
        UnifiedDataset::new(TenantContext::new("tenant-a"), records)
    }

    #[test]
    fn test_empty_dataset_is_unavailable() {
        let ds = dataset(Vec::new());
        let g = InsightsGenerator::new(&ds);
        assert_eq!(g.generate_insights().error(), Some("No data available"));
        assert_eq!(g.analyze_performance().error(), Some("No data available"));
        assert_eq!(g.generate_recommendations(100.0).error(), Some("No data available"));
        assert_eq!(g.generate_action_plan(50.0).error(), Some("No data available"));
        assert_eq!(g.calculate_budget_reallocation(1000.0).error(), Some("No data available"));
        assert_eq!(g.analyze_funnel().error(), Some("No data available"));

        let json = serde_json::to_value(g.generate_insights()).expect("json");
        assert_eq!(json, serde_json::json!({"error": "No data available"}));
    }

    #[test]
    fn test_ga4_only_dataset_has_no_ad_data() {
        let mut session = CanonicalRecord::empty(Source::Ga4);
        session.sessions = 100.0;
        let ds = dataset(vec![session]);
        let g = InsightsGenerator::new(&ds);

        assert!(g.generate_insights().is_ready());
        assert_eq!(g.compare_campaigns().error(), Some(NO_AD_DATA));
        assert!(g.analyze_funnel().is_ready());
    }

    #[test]
    fn test_summary_covers_all_rows() {
        let ds = dataset(vec![
            row(Source::Meta, "A", 100.0, 10.0, 10.0, 1000.0),
            row(Source::GoogleAds, "B", 0.0, 5.0, 10.0, 1000.0),
            row(Source::Ga4, "Unknown", 0.0, 3.0, 0.0, 0.0),
        ]);
        let report = InsightsGenerator::new(&ds).generate_insights().into_ready().expect("ready");
        assert_eq!(report.summary.total_records, 3);
        assert_eq!(report.summary.data_sources[&Source::Ga4], 1);
        assert!((report.summary.total_conversions - 18.0).abs() < f64::EPSILON);
        assert!((report.summary.overall_roas - 18.0 / 100.001).abs() < 1e-9);
        assert_eq!(report.platform_performance.len(), 3);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_performance_uses_ratio_of_sums() {
        let ds = dataset(vec![
            row(Source::Meta, "A", 100.0, 10.0, 10.0, 1000.0),
            row(Source::Meta, "A", 0.0, 5.0, 10.0, 1000.0),
        ]);
        let report = InsightsGenerator::new(&ds).analyze_performance().into_ready().expect("ready");
        assert!((report.overall_metrics.overall_roas - 15.0 / 100.001).abs() < 1e-9);
        assert!((report.campaign_summary["A"].roas - 15.0 / 100.001).abs() < 1e-9);
        assert!(report.top_performers.bottom.is_empty());
        assert!(report.bottom_performers.top.is_empty());
    }

    #[test]
    fn test_no_rule_fires_gives_sentinel() {
        let ds = dataset(vec![
            row(Source::Meta, "A", 200.0, 400.0, 50.0, 1000.0),
            row(Source::Meta, "B", 200.0, 400.0, 50.0, 1000.0),
        ]);
        let recs = InsightsGenerator::new(&ds)
            .generate_recommendations(100.0)
            .into_ready()
            .expect("ready");
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].kind, RecommendationType::NoAction);
    }

    #[test]
    fn test_budget_validation_and_plan() {
        let ds = dataset(vec![
            row(Source::Meta, "A", 300.0, 30.0, 30.0, 1000.0),
            row(Source::GoogleAds, "B", 700.0, 7.0, 10.0, 1000.0),
        ]);
        let g = InsightsGenerator::new(&ds);
        assert!(g.calculate_budget_reallocation(f64::NAN).error().is_some());
        assert!(g.calculate_budget_reallocation(-1.0).error().is_some());

        let plan = g.calculate_budget_reallocation(1000.0).into_ready().expect("ready");
        assert_eq!(plan.status, PlanStatus::Optimized);
        let sum: f64 = plan.allocations.iter().map(|a| a.optimal_amount).sum();
        assert!((sum - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_trend_metric() {
        let ds = dataset(vec![row(Source::Meta, "A", 1.0, 1.0, 1.0, 1.0)]);
        let g = InsightsGenerator::new(&ds);
        assert_eq!(
            g.analyze_trends("bounce_rate").error(),
            Some("Metric 'bounce_rate' not found in data")
        );
        assert_eq!(
            g.analyze_trends("roas").error(),
            Some("No date column found for trend analysis")
        );
    }
}
