//! Time-boxed optimization plan: what to do today, this week and this
//! month, with a rough projection of the combined effect.

use insights_core::CanonicalRecord;
use serde::Serialize;

use crate::classification::quantile;
use crate::metrics::{group_by, mean, safe_div, MetricSnapshot};
use crate::recommendations::platform_extremes;

const PAUSE_MIN_SPEND: f64 = 50.0;
const PAUSE_MAX_ROAS: f64 = 0.5;
const SCALE_MIN_SPEND: f64 = 100.0;
const MAX_SUGGESTED_INCREASE_PCT: f64 = 50.0;
const PLATFORM_SHIFT_RATIO: f64 = 1.3;
const PLATFORM_SHIFT_SHARE: f64 = 0.3;
const RESTRUCTURE_MAX_ROAS: f64 = 1.0;
const RESTRUCTURE_MIN_SPEND: f64 = 500.0;
const EXPANSION_MIN_ROAS: f64 = 2.0;
/// Share of scaled rows' conversions assumed to be gained by scaling.
const SCALE_CONVERSION_UPLIFT: f64 = 0.3;
const MAX_LISTED: usize = 5;
const MAX_SCALED_LISTED: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    PauseAds,
    IncreaseBudget,
    ShiftPlatformBudget,
    RestructureCampaigns,
    CreativeTesting,
    AudienceExpansion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPriority {
    Critical,
    High,
    Medium,
    Low,
}

/// One ad an action applies to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdTarget {
    pub campaign_name: String,
    pub ad_name: String,
    pub spend: f64,
    pub roas: f64,
    pub ctr: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionItem {
    pub action: ActionKind,
    pub priority: ActionPriority,
    pub title: String,
    pub description: String,
    pub steps: Vec<String>,
    /// Campaigns (or platforms) the action applies to.
    pub targets: Vec<String>,
    /// Individual ads, for actions taken at ad level.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ads: Vec<AdTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_increase_suggestion: Option<String>,
    pub expected_impact: String,
    pub time_required: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpectedImpact {
    pub current_spend: f64,
    pub current_conversions: f64,
    pub current_roas: f64,
    pub estimated_savings: f64,
    pub estimated_additional_conversions: f64,
    pub projected_roas: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionPlan {
    pub immediate: Vec<ActionItem>,
    pub weekly: Vec<ActionItem>,
    pub monthly: Vec<ActionItem>,
    pub expected_impact: ExpectedImpact,
}

fn steps(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect()
}

fn ad_targets(
    records: &[CanonicalRecord],
    snapshots: &[MetricSnapshot],
    idx: &[usize],
) -> Vec<AdTarget> {
    idx.iter()
        .map(|&i| AdTarget {
            campaign_name: records[i].campaign_name.clone(),
            ad_name: records[i].ad_name.clone(),
            spend: records[i].spend,
            roas: snapshots[i].roas,
            ctr: snapshots[i].ctr,
        })
        .collect()
}

/// Distinct campaign names of the given rows, in first-seen order.
fn campaign_names(records: &[CanonicalRecord], idx: &[usize]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for &i in idx {
        if !names.contains(&records[i].campaign_name) {
            names.push(records[i].campaign_name.clone());
        }
    }
    names
}

/// Campaign aggregates sorted by name.
fn campaign_snapshots(records: &[CanonicalRecord]) -> Vec<(String, MetricSnapshot)> {
    group_by(records, |r| r.campaign_name.clone())
        .into_iter()
        .map(|(name, totals)| (name, totals.snapshot()))
        .collect()
}

pub fn generate_action_plan(
    records: &[CanonicalRecord],
    budget_increase_limit: f64,
) -> ActionPlan {
    let snapshots: Vec<MetricSnapshot> = records.iter().map(MetricSnapshot::of).collect();
    let ctrs: Vec<f64> = snapshots.iter().map(|s| s.ctr).collect();
    let roas: Vec<f64> = snapshots.iter().map(|s| s.roas).collect();
    let p20_ctr = quantile(&ctrs, 0.2);
    let p80_roas = quantile(&roas, 0.8);
    let mean_ctr = mean(&ctrs);
    let campaigns = campaign_snapshots(records);

    let mut immediate = Vec::new();
    let mut weekly = Vec::new();
    let mut monthly = Vec::new();

    // Today: pause the worst ads.
    let worst: Vec<usize> = (0..records.len())
        .filter(|&i| {
            records[i].spend >= PAUSE_MIN_SPEND
                && snapshots[i].roas < PAUSE_MAX_ROAS
                && snapshots[i].ctr < p20_ctr
        })
        .collect();
    let savings: f64 = worst.iter().map(|&i| records[i].spend).sum();
    if !worst.is_empty() {
        immediate.push(ActionItem {
            action: ActionKind::PauseAds,
            priority: ActionPriority::Critical,
            title: format!("Pause {} underperforming ads", worst.len()),
            description: format!(
                "These ads have ROAS < {PAUSE_MAX_ROAS} and low CTR, wasting ${savings:.2}"
            ),
            steps: steps(&[
                "Open the ads manager for each platform",
                "Filter to the ads listed below",
                "Pause them and note the reason",
            ]),
            targets: campaign_names(records, &worst),
            ads: ad_targets(records, &snapshots, &worst),
            amount: Some(savings),
            budget_increase_suggestion: None,
            expected_impact: format!("Save ${savings:.2} with minimal conversion loss"),
            time_required: "15 minutes".to_string(),
        });
    }

    // Today: scale top performers.
    let top: Vec<usize> = (0..records.len())
        .filter(|&i| {
            snapshots[i].roas > p80_roas
                && snapshots[i].ctr > mean_ctr
                && records[i].spend >= SCALE_MIN_SPEND
        })
        .collect();
    let additional_conversions: f64 =
        top.iter().map(|&i| records[i].conversions).sum::<f64>() * SCALE_CONVERSION_UPLIFT;
    if !top.is_empty() {
        let increase = budget_increase_limit.min(MAX_SUGGESTED_INCREASE_PCT);
        immediate.push(ActionItem {
            action: ActionKind::IncreaseBudget,
            priority: ActionPriority::High,
            title: format!("Increase budget for {} top-performing ads", top.len()),
            description: "These ads have high ROAS and above-average CTR".to_string(),
            steps: steps(&[
                "Find the campaigns or ad sets listed below",
                "Raise the daily budget by the suggested amount",
                "Monitor for 3-5 days before increasing again",
            ]),
            targets: campaign_names(records, &top[..top.len().min(MAX_SCALED_LISTED)]),
            ads: ad_targets(records, &snapshots, &top[..top.len().min(MAX_SCALED_LISTED)]),
            amount: None,
            budget_increase_suggestion: Some(format!("Increase by {increase}%")),
            expected_impact: format!("About {additional_conversions:.0} additional conversions"),
            time_required: "20 minutes".to_string(),
        });
    }

    // This week: move budget between platforms.
    if let Some(((best, best_snap), (worst_platform, worst_snap))) = platform_extremes(records) {
        if best_snap.roas > worst_snap.roas * PLATFORM_SHIFT_RATIO {
            let shift = worst_snap.spend * PLATFORM_SHIFT_SHARE;
            weekly.push(ActionItem {
                action: ActionKind::ShiftPlatformBudget,
                priority: ActionPriority::Medium,
                title: format!("Shift ${shift:.2} from {worst_platform} to {best}"),
                description: format!(
                    "{best} shows {:.2} ROAS vs {worst_platform} at {:.2}",
                    best_snap.roas, worst_snap.roas
                ),
                steps: steps(&[
                    "Reduce campaign budgets on the weaker platform by 30%",
                    "Increase budgets on the stronger platform by the same amount",
                    "Monitor daily for the first week",
                ]),
                targets: vec![worst_platform.to_string(), best.to_string()],
                ads: Vec::new(),
                amount: Some(shift),
                budget_increase_suggestion: None,
                expected_impact: format!(
                    "Improve overall ROAS by {:.2}",
                    (best_snap.roas - worst_snap.roas) * PLATFORM_SHIFT_SHARE
                ),
                time_required: "2-3 hours".to_string(),
            });
        }
    }

    // This week: restructure expensive, weak campaigns.
    let weak: Vec<&(String, MetricSnapshot)> = campaigns
        .iter()
        .filter(|(_, s)| s.roas < RESTRUCTURE_MAX_ROAS && s.spend > RESTRUCTURE_MIN_SPEND)
        .collect();
    if !weak.is_empty() {
        weekly.push(ActionItem {
            action: ActionKind::RestructureCampaigns,
            priority: ActionPriority::Medium,
            title: format!("Restructure {} underperforming campaigns", weak.len()),
            description: format!(
                "These campaigns have ROAS < {RESTRUCTURE_MAX_ROAS} despite significant spend"
            ),
            steps: steps(&[
                "Check audience overlap between campaigns",
                "Consolidate similar audiences",
                "Refresh creatives in the best ad sets",
                "Review bidding strategy and targeting",
            ]),
            targets: weak.iter().take(MAX_LISTED).map(|(n, _)| n.clone()).collect(),
            ads: Vec::new(),
            amount: Some(weak.iter().map(|(_, s)| s.spend).sum()),
            budget_increase_suggestion: None,
            expected_impact: "Improve campaign ROAS by 0.3-0.8 points".to_string(),
            time_required: "4-6 hours".to_string(),
        });
    }

    // This month: creative testing on the best campaigns.
    let mut by_roas: Vec<&(String, MetricSnapshot)> = campaigns.iter().collect();
    by_roas.sort_by(|a, b| b.1.roas.total_cmp(&a.1.roas));
    monthly.push(ActionItem {
        action: ActionKind::CreativeTesting,
        priority: ActionPriority::Low,
        title: "Launch creative testing for top campaigns".to_string(),
        description: "Test new creatives to prevent ad fatigue".to_string(),
        steps: steps(&[
            "Create 3-4 new variations per campaign",
            "Split budget 70/30 between existing and new creatives",
            "Run for at least two weeks before deciding",
        ]),
        targets: by_roas.iter().take(MAX_LISTED).map(|(n, _)| n.clone()).collect(),
        ads: Vec::new(),
        amount: None,
        budget_increase_suggestion: None,
        expected_impact: "Potentially improve CTR by 15-25%".to_string(),
        time_required: "6-8 hours".to_string(),
    });

    // This month: expand audiences where returns are strong.
    monthly.push(ActionItem {
        action: ActionKind::AudienceExpansion,
        priority: ActionPriority::Low,
        title: "Expand audiences for successful campaigns".to_string(),
        description: "Scale reach while maintaining performance".to_string(),
        steps: steps(&[
            "Build lookalike audiences from existing converters",
            "Test related interests",
            "Start with 20% of the original campaign budget",
        ]),
        targets: campaigns
            .iter()
            .filter(|(_, s)| s.roas > EXPANSION_MIN_ROAS)
            .map(|(n, _)| n.clone())
            .collect(),
        ads: Vec::new(),
        amount: None,
        budget_increase_suggestion: None,
        expected_impact: "Increase total conversions by 25-50%".to_string(),
        time_required: "4-5 hours".to_string(),
    });

    let overall = MetricSnapshot::aggregate(records);
    let expected_impact = ExpectedImpact {
        current_spend: overall.spend,
        current_conversions: overall.conversions,
        current_roas: overall.roas,
        estimated_savings: savings,
        estimated_additional_conversions: additional_conversions,
        projected_roas: safe_div(
            overall.conversions + additional_conversions,
            overall.spend - savings,
        ),
    };

    ActionPlan {
        immediate,
        weekly,
        monthly,
        expected_impact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::Source;

    fn row(
        source: Source,
        campaign: &str,
        spend: f64,
        conversions: f64,
        clicks: f64,
    ) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(source);
        r.campaign_name = campaign.into();
        r.spend = spend;
        r.conversions = conversions;
        r.clicks = clicks;
        r.impressions = 1000.0;
        r
    }

    fn sample() -> Vec<CanonicalRecord> {
        let mut rows: Vec<CanonicalRecord> = (0..8)
            .map(|i| row(Source::Meta, &format!("Steady{i}"), 150.0, 150.0, 30.0))
            .collect();
        rows.push(row(Source::Meta, "Drain", 600.0, 1.0, 1.0));
        rows.push(row(Source::GoogleAds, "Rocket", 200.0, 900.0, 90.0));
        rows
    }

    #[test]
    fn test_immediate_actions() {
        let plan = generate_action_plan(&sample(), 80.0);
        let kinds: Vec<ActionKind> = plan.immediate.iter().map(|a| a.action).collect();
        assert_eq!(kinds, vec![ActionKind::PauseAds, ActionKind::IncreaseBudget]);
        assert_eq!(plan.immediate[0].targets, vec!["Drain"]);
        assert_eq!(plan.immediate[1].targets, vec!["Rocket"]);
        assert_eq!(
            plan.immediate[1].budget_increase_suggestion.as_deref(),
            Some("Increase by 50%")
        );
    }

    #[test]
    fn test_pause_lists_each_ad() {
        let mut rows = sample();
        rows[8].ad_name = "Drain video".into();
        let mut second = row(Source::Meta, "Drain", 300.0, 0.0, 1.0);
        second.ad_name = "Drain carousel".into();
        rows.push(second);

        let plan = generate_action_plan(&rows, 50.0);
        let pause = &plan.immediate[0];
        assert_eq!(pause.action, ActionKind::PauseAds);
        assert_eq!(pause.targets, vec!["Drain"]);
        let ads: Vec<&str> = pause.ads.iter().map(|a| a.ad_name.as_str()).collect();
        assert_eq!(ads, vec!["Drain video", "Drain carousel"]);
        assert!(pause.ads.iter().all(|a| a.campaign_name == "Drain"));
        assert!((pause.ads[1].spend - 300.0).abs() < 1e-9);
        assert_eq!(pause.ads[1].roas, 0.0);

        let json = serde_json::to_value(pause).unwrap();
        assert_eq!(json["ads"][0]["ad_name"], "Drain video");
    }

    #[test]
    fn test_weekly_platform_shift() {
        let plan = generate_action_plan(&sample(), 50.0);
        let shift = plan
            .weekly
            .iter()
            .find(|a| a.action == ActionKind::ShiftPlatformBudget)
            .unwrap();
        // Meta is the weaker platform: 30% of its 1800 spend.
        assert!((shift.amount.unwrap() - 540.0).abs() < 1e-9);
        assert_eq!(shift.targets, vec!["meta", "google_ads"]);
    }

    #[test]
    fn test_monthly_actions_always_present() {
        let plan = generate_action_plan(&sample(), 50.0);
        assert_eq!(plan.monthly.len(), 2);
        assert_eq!(plan.monthly[0].targets[0], "Rocket");
        assert_eq!(plan.monthly[1].targets, vec!["Rocket"]);
    }

    #[test]
    fn test_expected_impact() {
        let plan = generate_action_plan(&sample(), 50.0);
        let impact = &plan.expected_impact;
        assert!((impact.current_spend - 2000.0).abs() < 1e-9);
        assert!((impact.estimated_savings - 600.0).abs() < 1e-9);
        assert!((impact.estimated_additional_conversions - 270.0).abs() < 1e-9);
        let expected = (impact.current_conversions + 270.0) / (1400.0 + 0.001);
        assert!((impact.projected_roas - expected).abs() < 1e-9);
    }
}
