//! Budget reallocation optimizer.
//!
//! Campaigns are scored by a pluggable [`EfficiencyScorer`] over their
//! aggregate snapshot and the total budget is split in proportion to the
//! scores. Campaigns whose recommended amount moves by more than the
//! deadband are listed in ordered reallocation steps.

use insights_core::CanonicalRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::metrics::{finite_or_zero, group_by, share_pct, MetricSnapshot};

/// Default absolute dollar change below which a campaign is left alone.
pub const DEFAULT_DEADBAND: f64 = 50.0;

/// Campaigns listed per reallocation step.
pub const MAX_STEP_CAMPAIGNS: usize = 10;

pub const DEGENERATE_MESSAGE: &str = "Maintain current allocation: no projection available";

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Turns a campaign aggregate into a non-negative allocation weight.
pub trait EfficiencyScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, snapshot: &MetricSnapshot) -> f64;
}

/// `roas × ctr × 100`, with ctr in percent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoasCtrScorer;

impl EfficiencyScorer for RoasCtrScorer {
    fn name(&self) -> &str {
        "roas_ctr"
    }

    fn score(&self, snapshot: &MetricSnapshot) -> f64 {
        finite_or_zero(snapshot.roas * snapshot.ctr * 100.0)
    }
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationAction {
    Increase,
    Decrease,
    Maintain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Optimized,
    MaintainCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepAction {
    DecreaseBudgets,
    IncreaseBudgets,
}

/// Input to [`BudgetOptimizer::allocate`]: one scored campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignScore {
    pub campaign_name: String,
    pub snapshot: MetricSnapshot,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignAllocation {
    pub campaign_name: String,
    pub current_spend: f64,
    pub current_pct: f64,
    pub conversions: f64,
    pub roas: f64,
    pub ctr: f64,
    pub efficiency_score: f64,
    pub optimal_pct: f64,
    pub optimal_amount: f64,
    pub delta: f64,
    pub action: AllocationAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCampaign {
    pub campaign_name: String,
    pub current_spend: f64,
    pub recommended_budget: f64,
    /// Absolute size of the change.
    pub change: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReallocationStep {
    pub step: u32,
    pub action: StepAction,
    pub title: String,
    /// Sum of absolute changes over every campaign in the step, including
    /// those beyond the listed ones.
    pub total_amount: f64,
    pub campaigns: Vec<StepCampaign>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub current_conversions: f64,
    pub current_roas: f64,
    pub weighted_roas: f64,
    pub projected_conversions: f64,
    pub improvement_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub campaigns_to_increase: usize,
    pub campaigns_to_decrease: usize,
    pub campaigns_to_maintain: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPlan {
    pub status: PlanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub scorer: String,
    pub total_budget: f64,
    pub allocations: Vec<CampaignAllocation>,
    pub steps: Vec<ReallocationStep>,
    pub projection: Option<Projection>,
    pub summary: BudgetSummary,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

pub struct BudgetOptimizer {
    scorer: Box<dyn EfficiencyScorer>,
    deadband: f64,
}

impl Default for BudgetOptimizer {
    fn default() -> Self {
        Self::new(Box::new(RoasCtrScorer), DEFAULT_DEADBAND)
    }
}

impl BudgetOptimizer {
    pub fn new(scorer: Box<dyn EfficiencyScorer>, deadband: f64) -> Self {
        Self {
            scorer,
            deadband: deadband.abs(),
        }
    }

    pub fn with_deadband(mut self, deadband: f64) -> Self {
        self.deadband = deadband.abs();
        self
    }

    /// Score every campaign and allocate `total_budget` across them.
    pub fn plan(&self, records: &[CanonicalRecord], total_budget: f64) -> BudgetPlan {
        let scored: Vec<CampaignScore> = group_by(records, |r| r.campaign_name.clone())
            .into_iter()
            .map(|(campaign_name, totals)| {
                let snapshot = totals.snapshot();
                let score = self.scorer.score(&snapshot).max(0.0);
                CampaignScore {
                    campaign_name,
                    snapshot,
                    score,
                }
            })
            .collect();

        debug!(
            campaigns = scored.len(),
            scorer = self.scorer.name(),
            "scored campaigns for budget plan"
        );
        self.allocate(scored, total_budget)
    }

    /// Split `total_budget` in proportion to the given scores.
    pub fn allocate(&self, campaigns: Vec<CampaignScore>, total_budget: f64) -> BudgetPlan {
        let total_budget = finite_or_zero(total_budget).max(0.0);
        let current_total: f64 = campaigns.iter().map(|c| c.snapshot.spend).sum();
        let score_total: f64 = campaigns.iter().map(|c| c.score.max(0.0)).sum();
        let degenerate = score_total <= 0.0 || !score_total.is_finite();

        let allocations: Vec<CampaignAllocation> = campaigns
            .iter()
            .map(|c| {
                let current_pct = share_pct(c.snapshot.spend, current_total);
                let (optimal_pct, optimal_amount) = if degenerate {
                    (current_pct, c.snapshot.spend)
                } else {
                    let pct = share_pct(c.score.max(0.0), score_total);
                    (pct, finite_or_zero(pct / 100.0 * total_budget))
                };
                let delta = if degenerate {
                    0.0
                } else {
                    finite_or_zero(optimal_amount - c.snapshot.spend)
                };
                CampaignAllocation {
                    campaign_name: c.campaign_name.clone(),
                    current_spend: c.snapshot.spend,
                    current_pct,
                    conversions: c.snapshot.conversions,
                    roas: c.snapshot.roas,
                    ctr: c.snapshot.ctr,
                    efficiency_score: finite_or_zero(c.score),
                    optimal_pct,
                    optimal_amount,
                    delta,
                    action: self.classify(delta),
                }
            })
            .collect();

        let summary = BudgetSummary {
            campaigns_to_increase: count(&allocations, AllocationAction::Increase),
            campaigns_to_decrease: count(&allocations, AllocationAction::Decrease),
            campaigns_to_maintain: count(&allocations, AllocationAction::Maintain),
        };

        if degenerate {
            info!(
                campaigns = allocations.len(),
                "no positive efficiency scores, keeping current allocation"
            );
            return BudgetPlan {
                status: PlanStatus::MaintainCurrent,
                message: Some(DEGENERATE_MESSAGE.to_string()),
                scorer: self.scorer.name().to_string(),
                total_budget,
                allocations,
                steps: Vec::new(),
                projection: None,
                summary,
            };
        }

        let steps = build_steps(&allocations);
        let projection = project(&allocations, total_budget);

        info!(
            campaigns = allocations.len(),
            increase = summary.campaigns_to_increase,
            decrease = summary.campaigns_to_decrease,
            total_budget,
            "budget plan built"
        );

        BudgetPlan {
            status: PlanStatus::Optimized,
            message: None,
            scorer: self.scorer.name().to_string(),
            total_budget,
            allocations,
            steps,
            projection: Some(projection),
            summary,
        }
    }

    fn classify(&self, delta: f64) -> AllocationAction {
        if delta > self.deadband {
            AllocationAction::Increase
        } else if delta < -self.deadband {
            AllocationAction::Decrease
        } else {
            AllocationAction::Maintain
        }
    }
}

fn count(allocations: &[CampaignAllocation], action: AllocationAction) -> usize {
    allocations.iter().filter(|a| a.action == action).count()
}

fn build_steps(allocations: &[CampaignAllocation]) -> Vec<ReallocationStep> {
    let mut decreases: Vec<&CampaignAllocation> = allocations
        .iter()
        .filter(|a| a.action == AllocationAction::Decrease)
        .collect();
    // Most negative delta first.
    decreases.sort_by(|a, b| a.delta.total_cmp(&b.delta));

    let mut increases: Vec<&CampaignAllocation> = allocations
        .iter()
        .filter(|a| a.action == AllocationAction::Increase)
        .collect();
    increases.sort_by(|a, b| b.delta.total_cmp(&a.delta));

    let mut steps = Vec::new();
    if !decreases.is_empty() {
        steps.push(ReallocationStep {
            step: 1,
            action: StepAction::DecreaseBudgets,
            title: format!(
                "Reduce budget for {} underperforming campaigns",
                decreases.len()
            ),
            total_amount: decreases.iter().map(|a| a.delta).sum::<f64>().abs(),
            campaigns: decreases
                .iter()
                .take(MAX_STEP_CAMPAIGNS)
                .map(|a| StepCampaign {
                    campaign_name: a.campaign_name.clone(),
                    current_spend: a.current_spend,
                    recommended_budget: a.optimal_amount,
                    change: a.delta.abs(),
                    reason: format!("Low efficiency score: {:.1}", a.efficiency_score),
                })
                .collect(),
        });
    }
    if !increases.is_empty() {
        steps.push(ReallocationStep {
            step: 2,
            action: StepAction::IncreaseBudgets,
            title: format!(
                "Increase budget for {} high-performing campaigns",
                increases.len()
            ),
            total_amount: increases.iter().map(|a| a.delta).sum(),
            campaigns: increases
                .iter()
                .take(MAX_STEP_CAMPAIGNS)
                .map(|a| StepCampaign {
                    campaign_name: a.campaign_name.clone(),
                    current_spend: a.current_spend,
                    recommended_budget: a.optimal_amount,
                    change: a.delta,
                    reason: format!(
                        "High efficiency score: {:.1}, ROAS: {:.2}",
                        a.efficiency_score, a.roas
                    ),
                })
                .collect(),
        });
    }
    steps
}

fn project(allocations: &[CampaignAllocation], total_budget: f64) -> Projection {
    let current_conversions: f64 = allocations.iter().map(|a| a.conversions).sum();
    let current_spend: f64 = allocations.iter().map(|a| a.current_spend).sum();
    let current_roas = if current_spend > 0.0 {
        finite_or_zero(current_conversions / current_spend)
    } else {
        0.0
    };

    let weighted_roas = if total_budget > 0.0 {
        finite_or_zero(
            allocations
                .iter()
                .map(|a| a.roas * a.optimal_amount)
                .sum::<f64>()
                / total_budget,
        )
    } else {
        0.0
    };
    let projected_conversions = finite_or_zero(total_budget * weighted_roas);
    let improvement_pct = if current_conversions > 0.0 {
        finite_or_zero((projected_conversions - current_conversions) / current_conversions * 100.0)
    } else {
        0.0
    };

    Projection {
        current_conversions,
        current_roas,
        weighted_roas,
        projected_conversions,
        improvement_pct,
    }
}
