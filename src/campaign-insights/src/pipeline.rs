//! Ingest-then-analyse pipeline for one tenant request.
//!
//! Ingestion is sequential and synchronous. Analysis fans out: each
//! requested report runs on the blocking pool against a shared
//! `Arc<UnifiedDataset>`, and the whole fan-out is bounded by a timeout.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use insights_core::config::{AnalysisConfig, IngestConfig};
use insights_core::{InsightsError, InsightsResult, Source, TenantContext, UnifiedDataset};
use insights_ingest::{infer_source, standardize, Consolidator, Loader};
use insights_reporting::InsightsGenerator;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One uploaded export, already read into memory.
#[derive(Debug, Clone)]
pub struct ExportInput {
    /// Explicit platform tag; otherwise taken from the detected layout or
    /// inferred from the columns.
    pub platform: Option<Source>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub source: Source,
    pub format: String,
    pub encoding: String,
    pub strategy: String,
    pub rows: usize,
    pub dropped_rows: usize,
}

/// Load, standardize and consolidate every input for one tenant. The first
/// file that cannot be parsed aborts the request.
pub fn build_dataset(
    context: TenantContext,
    inputs: Vec<ExportInput>,
    config: &IngestConfig,
) -> InsightsResult<(UnifiedDataset, Vec<FileReport>)> {
    let loader = Loader::new(config.clone());
    let mut consolidator = Consolidator::new(context);
    let mut reports = Vec::with_capacity(inputs.len());

    for input in inputs {
        let loaded = loader.load(&input.bytes, &input.filename)?;
        let source = input
            .platform
            .or_else(|| loaded.format.source())
            .unwrap_or_else(|| infer_source(&loaded.frame));

        let rows = consolidator.add(standardize(&loaded.frame, source));
        if loaded.dropped_rows > 0 {
            warn!(
                filename = %input.filename,
                dropped = loaded.dropped_rows,
                "Malformed rows dropped during load"
            );
        }
        reports.push(FileReport {
            filename: input.filename,
            source,
            format: loaded.format.as_str().to_string(),
            encoding: loaded.encoding,
            strategy: loaded.strategy,
            rows,
            dropped_rows: loaded.dropped_rows,
        });
    }

    Ok((consolidator.into_dataset(), reports))
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    All,
    Insights,
    Performance,
    Recommendations,
    ActionPlan,
    Budget,
    Compare,
    Trends,
    Funnel,
}

impl ReportKind {
    const COMPONENTS: [ReportKind; 8] = [
        ReportKind::Insights,
        ReportKind::Performance,
        ReportKind::Recommendations,
        ReportKind::ActionPlan,
        ReportKind::Budget,
        ReportKind::Compare,
        ReportKind::Trends,
        ReportKind::Funnel,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Insights => "insights",
            Self::Performance => "performance",
            Self::Recommendations => "recommendations",
            Self::ActionPlan => "action_plan",
            Self::Budget => "budget",
            Self::Compare => "compare",
            Self::Trends => "trends",
            Self::Funnel => "funnel",
        }
    }

    fn expand(self) -> Vec<ReportKind> {
        match self {
            Self::All => Self::COMPONENTS.to_vec(),
            other => vec![other],
        }
    }
}

/// Per-request analysis parameters, resolved from config plus CLI flags.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: ReportKind,
    pub settings: AnalysisConfig,
    pub total_budget: f64,
    pub trend_metric: String,
    pub timeout: Duration,
}

fn to_json<T: Serialize>(value: T) -> InsightsResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn spawn_report(
    dataset: Arc<UnifiedDataset>,
    request: Arc<AnalysisRequest>,
    kind: ReportKind,
) -> JoinHandle<InsightsResult<Value>> {
    tokio::task::spawn_blocking(move || {
        let generator = InsightsGenerator::with_settings(&dataset, request.settings.clone());
        let settings = generator.settings();
        match kind {
            ReportKind::Insights => to_json(generator.generate_insights()),
            ReportKind::Performance => to_json(generator.analyze_performance()),
            ReportKind::Recommendations => {
                to_json(generator.generate_recommendations(settings.min_spend_threshold))
            }
            ReportKind::ActionPlan => {
                to_json(generator.generate_action_plan(settings.budget_increase_limit))
            }
            ReportKind::Budget => {
                to_json(generator.calculate_budget_reallocation(request.total_budget))
            }
            ReportKind::Compare => to_json(generator.compare_campaigns()),
            ReportKind::Trends => to_json(generator.analyze_trends(&request.trend_metric)),
            ReportKind::Funnel => to_json(generator.analyze_funnel()),
            ReportKind::All => Err(InsightsError::Internal(anyhow::anyhow!(
                "report kind 'all' must be expanded before dispatch"
            ))),
        }
    })
}

/// Run the requested reports concurrently. A single report is returned as
/// is; `all` yields an object keyed by report name.
pub async fn analyze(
    dataset: Arc<UnifiedDataset>,
    request: AnalysisRequest,
) -> InsightsResult<Value> {
    let timeout = request.timeout;
    let kinds = request.kind.expand();
    let single = request.kind != ReportKind::All;
    let request = Arc::new(request);

    let fan_out = async {
        let handles: Vec<(ReportKind, JoinHandle<InsightsResult<Value>>)> = kinds
            .iter()
            .map(|&kind| (kind, spawn_report(dataset.clone(), request.clone(), kind)))
            .collect();

        let mut results = Map::new();
        for (kind, handle) in handles {
            let value = handle.await.map_err(|e| {
                InsightsError::Internal(anyhow::anyhow!("{} task failed: {e}", kind.key()))
            })??;
            results.insert(kind.key().to_string(), value);
        }
        Ok::<_, InsightsError>(results)
    };

    let mut results = tokio::time::timeout(timeout, fan_out)
        .await
        .map_err(|_| InsightsError::Timeout(timeout.as_secs()))??;

    info!(
        reports = results.len(),
        records = dataset.len(),
        tenant = %dataset.context().user_id,
        "Analysis complete"
    );

    if single {
        let key = request.kind.key();
        return results
            .remove(key)
            .ok_or_else(|| InsightsError::Internal(anyhow::anyhow!("missing report '{key}'")));
    }
    Ok(Value::Object(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    const META_EXPORT: &str = "Ad group report\nAll time\nAccount: Demo\nDownloaded 2024-05-01\n\
        Ad group status\tAd group\tCampaign\tDay\tImpr.\tInteractions\tCost\tConversions\n\
        Enabled\tGroup A\tSpring\t2024-05-01\t1000\t600\t250.00\t12\n\
        Enabled\tGroup B\tSummer\t2024-05-01\t1000\t400\t750.00\t3\n\
        Total: Ad groups\t--\t--\t--\t2000\t1000\t1000.00\t15\n";

    const GA4_EXPORT: &str = "# GA4 traffic export\n# 2024-05-01 - 2024-05-01\n\
        date,sessions,engagementRate,conversions\n\
        20240501,200,0.62,20\n\
        20240501,600,0,0\n";

    fn inputs() -> Vec<ExportInput> {
        vec![
            ExportInput {
                platform: None,
                filename: "meta_export.csv".into(),
                bytes: META_EXPORT.as_bytes().to_vec(),
            },
            ExportInput {
                platform: None,
                filename: "ga4_traffic.csv".into(),
                bytes: GA4_EXPORT.as_bytes().to_vec(),
            },
        ]
    }

    fn request(kind: ReportKind) -> AnalysisRequest {
        AnalysisRequest {
            kind,
            settings: AnalysisConfig::default(),
            total_budget: 1000.0,
            trend_metric: "roas".into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_build_dataset_detects_sources() {
        let (dataset, files) = build_dataset(
            TenantContext::new("tenant-a"),
            inputs(),
            &IngestConfig::default(),
        )
        .unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].source, Source::Meta);
        assert_eq!(files[0].rows, 2);
        assert_eq!(files[1].source, Source::Ga4);
        assert_eq!(files[1].rows, 2);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.context().user_id, "tenant-a");

        let spring = dataset.iter().find(|r| r.campaign_name == "Spring").unwrap();
        assert!((spring.spend - 250.0).abs() < f64::EPSILON);
        assert!((spring.clicks - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_platform_wins() {
        let generic = ExportInput {
            platform: Some(Source::GoogleAds),
            filename: "upload.csv".into(),
            bytes: b"Campaign,Clicks,Cost\nBrand,10,5\n".to_vec(),
        };
        let (dataset, files) =
            build_dataset(TenantContext::new("t"), vec![generic], &IngestConfig::default())
                .unwrap();
        assert_eq!(files[0].source, Source::GoogleAds);
        assert_eq!(dataset.records()[0].campaign_name, "Brand");
    }

    #[test]
    fn test_unparseable_file_aborts() {
        let bad = ExportInput {
            platform: None,
            filename: "broken.csv".into(),
            bytes: b"just one column\nvalue\n".to_vec(),
        };
        let err = build_dataset(TenantContext::new("t"), vec![bad], &IngestConfig::default())
            .unwrap_err();
        assert!(matches!(err, InsightsError::Parse(_)));
    }

    #[tokio::test]
    async fn test_all_reports_end_to_end() {
        let (dataset, _) = build_dataset(
            TenantContext::new("tenant-a"),
            inputs(),
            &IngestConfig::default(),
        )
        .unwrap();
        let value = analyze(Arc::new(dataset), request(ReportKind::All)).await.unwrap();

        for kind in ReportKind::COMPONENTS {
            assert!(value.get(kind.key()).is_some(), "missing {}", kind.key());
        }
        assert_eq!(value["insights"]["summary"]["total_records"], 4);

        let funnel = &value["funnel"];
        assert_eq!(funnel["funnel_overview"]["ad_clicks"], 1000.0);
        assert_eq!(funnel["funnel_overview"]["website_sessions"], 800.0);
        assert_eq!(funnel["funnel_overview"]["engaged_sessions"], 200.0);
        assert_eq!(funnel["funnel_overview"]["conversions"], 20.0);
        assert_eq!(funnel["biggest_drop_off_stage"], "engagement_to_conversion");

        let allocations = value["budget"]["allocations"].as_array().unwrap();
        let total: f64 = allocations
            .iter()
            .map(|a| a["optimal_amount"].as_f64().unwrap())
            .sum();
        assert!((total - 1000.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_single_report_and_empty_dataset() {
        let empty = UnifiedDataset::new(TenantContext::new("t"), Vec::new());
        let value = analyze(Arc::new(empty), request(ReportKind::Budget)).await.unwrap();
        assert_eq!(value, serde_json::json!({"error": "No data available"}));
    }
}
