//! Campaign Insights: unified marketing-performance analysis over exported
//! Meta, Google Ads and GA4 reports.
//!
//! Reads the given export files, builds one tenant's unified dataset and
//! prints the requested analysis as JSON on stdout.

mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use insights_core::{AppConfig, Source, TenantContext};
use tracing::{info, warn};

use crate::pipeline::{analyze, build_dataset, AnalysisRequest, ExportInput, ReportKind};

#[derive(Parser, Debug)]
#[command(name = "campaign-insights")]
#[command(about = "Unified insights and budget recommendations from ad platform exports")]
#[command(version)]
struct Cli {
    /// Tenant the analysis runs for
    #[arg(long, env = "CAMPAIGN_INSIGHTS__USER_ID")]
    user_id: String,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Total budget to reallocate (overrides config)
    #[arg(long)]
    budget: Option<f64>,

    /// Spend floor for pause/scale recommendations (overrides config)
    #[arg(long)]
    min_spend: Option<f64>,

    /// Percent cap on suggested budget increases (overrides config)
    #[arg(long)]
    budget_increase_limit: Option<f64>,

    /// Metric for trend analysis
    #[arg(long, default_value = "roas")]
    trend_metric: String,

    /// Analysis timeout in seconds (overrides config)
    #[arg(long, env = "CAMPAIGN_INSIGHTS__RUNTIME__TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, value_enum, default_value_t = ReportKind::All)]
    report: ReportKind,

    /// Export files, optionally tagged with their platform: `meta=ads.csv`
    #[arg(required = true)]
    files: Vec<String>,
}

/// Split `platform=path`. A prefix that is not a known platform is treated
/// as part of the path.
fn parse_file_arg(arg: &str) -> (Option<Source>, PathBuf) {
    if let Some((tag, path)) = arg.split_once('=') {
        if let Some(source) = Source::parse(tag) {
            return (Some(source), PathBuf::from(path));
        }
    }
    (None, PathBuf::from(arg))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campaign_insights=info,insights_ingest=info,insights_reporting=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(min_spend) = cli.min_spend {
        config.analysis.min_spend_threshold = min_spend;
    }
    if let Some(limit) = cli.budget_increase_limit {
        config.analysis.budget_increase_limit = limit;
    }
    if let Some(secs) = cli.timeout_secs {
        config.runtime.timeout_secs = secs;
    }
    let total_budget = cli.budget.unwrap_or(config.analysis.default_total_budget);

    let context = TenantContext::new(cli.user_id.clone());
    info!(
        user_id = %context.user_id,
        request_id = %context.request_id,
        files = cli.files.len(),
        report = cli.report.key(),
        "Campaign Insights starting"
    );

    let mut inputs = Vec::with_capacity(cli.files.len());
    for arg in &cli.files {
        let (platform, path) = parse_file_arg(arg);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        inputs.push(ExportInput {
            platform,
            filename,
            bytes,
        });
    }

    let (dataset, files) = build_dataset(context, inputs, &config.ingest)?;
    for file in &files {
        info!(
            filename = %file.filename,
            source = %file.source,
            format = %file.format,
            encoding = %file.encoding,
            strategy = %file.strategy,
            rows = file.rows,
            "File ingested"
        );
    }

    let request = AnalysisRequest {
        kind: cli.report,
        settings: config.analysis.clone(),
        total_budget,
        trend_metric: cli.trend_metric,
        timeout: Duration::from_secs(config.runtime.timeout_secs),
    };
    let report = analyze(Arc::new(dataset), request).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
