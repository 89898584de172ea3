//! Campaign analytics over a unified dataset: derived metrics, performer
//! classification, rule-based recommendations, action plans, budget
//! reallocation, trends and the ads-to-conversion funnel.

pub mod action_plan;
pub mod budget;
pub mod classification;
pub mod funnel;
pub mod insights;
pub mod metrics;
pub mod recommendations;
pub mod trend;

pub use action_plan::{generate_action_plan, ActionPlan};
pub use budget::{BudgetOptimizer, BudgetPlan, EfficiencyScorer, RoasCtrScorer};
pub use classification::{classify, compare_campaigns, top_campaigns, ClassificationOptions};
pub use funnel::{analyze_funnel, FunnelReport};
pub use insights::{InsightsGenerator, InsightsReport, PerformanceReport};
pub use metrics::MetricSnapshot;
pub use recommendations::{Recommendation, RecommendationEngine, RecommendationRule};
pub use trend::{analyze_trends, TrendMetric, TrendReport};
