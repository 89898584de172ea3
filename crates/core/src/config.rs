use std::path::Path;

use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_INSIGHTS__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Thresholds and limits for the insights engine.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Spend floor for pause/scale recommendations.
    #[serde(default = "default_min_spend_threshold")]
    pub min_spend_threshold: f64,
    /// Spend floor for the bottom-performer population.
    #[serde(default = "default_bottom_min_spend")]
    pub bottom_min_spend: f64,
    #[serde(default = "default_performer_limit")]
    pub performer_limit: usize,
    #[serde(default = "default_top_campaigns_limit")]
    pub top_campaigns_limit: usize,
    #[serde(default = "default_total_budget")]
    pub default_total_budget: f64,
    /// Absolute delta below which a campaign is left at its current spend.
    #[serde(default = "default_budget_deadband")]
    pub budget_deadband: f64,
    /// Percent cap on suggested budget increases in the action plan.
    #[serde(default = "default_budget_increase_limit")]
    pub budget_increase_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Characters of decoded text inspected for platform detection.
    #[serde(default = "default_sniff_chars")]
    pub sniff_chars: usize,
    #[serde(default = "default_header_min_matches")]
    pub header_min_matches: usize,
    #[serde(default = "default_max_start_line_retries")]
    pub max_start_line_retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Default functions
fn default_min_spend_threshold() -> f64 {
    100.0
}
fn default_bottom_min_spend() -> f64 {
    50.0
}
fn default_performer_limit() -> usize {
    10
}
fn default_top_campaigns_limit() -> usize {
    5
}
fn default_total_budget() -> f64 {
    10_000.0
}
fn default_budget_deadband() -> f64 {
    50.0
}
fn default_budget_increase_limit() -> f64 {
    50.0
}
fn default_sniff_chars() -> usize {
    1000
}
fn default_header_min_matches() -> usize {
    3
}
fn default_max_start_line_retries() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_spend_threshold: default_min_spend_threshold(),
            bottom_min_spend: default_bottom_min_spend(),
            performer_limit: default_performer_limit(),
            top_campaigns_limit: default_top_campaigns_limit(),
            default_total_budget: default_total_budget(),
            budget_deadband: default_budget_deadband(),
            budget_increase_limit: default_budget_increase_limit(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sniff_chars: default_sniff_chars(),
            header_min_matches: default_header_min_matches(),
            max_start_line_retries: default_max_start_line_retries(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            ingest: IngestConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, overridden by
    /// environment variables.
    pub fn load_from(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGN_INSIGHTS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
