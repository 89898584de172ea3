use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tenant::TenantContext;

/// Placeholder for canonical string fields the export did not provide.
pub const UNKNOWN: &str = "Unknown";

/// The ad/analytics platform a record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Meta,
    GoogleAds,
    Ga4,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Meta, Source::GoogleAds, Source::Ga4];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::GoogleAds => "google_ads",
            Self::Ga4 => "ga4",
        }
    }

    /// Parse a platform tag. Accepts the canonical tags plus a few aliases
    /// the connectors emit (`meta_ads`, `google`, `googleads`).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "meta" | "meta_ads" | "facebook" => Some(Self::Meta),
            "google_ads" | "google" | "googleads" | "google-ads" => Some(Self::GoogleAds),
            "ga4" | "google_analytics" => Some(Self::Ga4),
            _ => None,
        }
    }

    /// Ad platforms carry spend/clicks; GA4 carries website sessions.
    pub fn is_ad_platform(&self) -> bool {
        matches!(self, Self::Meta | Self::GoogleAds)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every column of the canonical schema except `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    Date,
    CampaignName,
    AdsetName,
    AdName,
    Impressions,
    Clicks,
    Spend,
    Conversions,
    Reach,
    Sessions,
    Users,
    Pageviews,
    Ctr,
    Cpc,
    Cpm,
    EngagementRate,
    SessionDuration,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 17] = [
        Self::Date,
        Self::CampaignName,
        Self::AdsetName,
        Self::AdName,
        Self::Impressions,
        Self::Clicks,
        Self::Spend,
        Self::Conversions,
        Self::Reach,
        Self::Sessions,
        Self::Users,
        Self::Pageviews,
        Self::Ctr,
        Self::Cpc,
        Self::Cpm,
        Self::EngagementRate,
        Self::SessionDuration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::CampaignName => "campaign_name",
            Self::AdsetName => "adset_name",
            Self::AdName => "ad_name",
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Spend => "spend",
            Self::Conversions => "conversions",
            Self::Reach => "reach",
            Self::Sessions => "sessions",
            Self::Users => "users",
            Self::Pageviews => "pageviews",
            Self::Ctr => "ctr",
            Self::Cpc => "cpc",
            Self::Cpm => "cpm",
            Self::EngagementRate => "engagement_rate",
            Self::SessionDuration => "session_duration",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::Date | Self::CampaignName | Self::AdsetName | Self::AdName
        )
    }
}

/// One row of the unified schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source: Source,
    pub date: String,
    pub campaign_name: String,
    pub adset_name: String,
    pub ad_name: String,
    pub impressions: f64,
    pub clicks: f64,
    pub spend: f64,
    pub conversions: f64,
    pub reach: f64,
    pub sessions: f64,
    pub users: f64,
    pub pageviews: f64,
    /// Platform-reported CTR; the metrics engine recomputes its own.
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub engagement_rate: f64,
    pub session_duration: f64,
}

impl CanonicalRecord {
    /// A record with every string field `"Unknown"` and every number `0.0`.
    pub fn empty(source: Source) -> Self {
        Self {
            source,
            date: UNKNOWN.to_string(),
            campaign_name: UNKNOWN.to_string(),
            adset_name: UNKNOWN.to_string(),
            ad_name: UNKNOWN.to_string(),
            impressions: 0.0,
            clicks: 0.0,
            spend: 0.0,
            conversions: 0.0,
            reach: 0.0,
            sessions: 0.0,
            users: 0.0,
            pageviews: 0.0,
            ctr: 0.0,
            cpc: 0.0,
            cpm: 0.0,
            engagement_rate: 0.0,
            session_duration: 0.0,
        }
    }

    pub fn numeric(&self, field: CanonicalField) -> Option<f64> {
        let value = match field {
            CanonicalField::Impressions => self.impressions,
            CanonicalField::Clicks => self.clicks,
            CanonicalField::Spend => self.spend,
            CanonicalField::Conversions => self.conversions,
            CanonicalField::Reach => self.reach,
            CanonicalField::Sessions => self.sessions,
            CanonicalField::Users => self.users,
            CanonicalField::Pageviews => self.pageviews,
            CanonicalField::Ctr => self.ctr,
            CanonicalField::Cpc => self.cpc,
            CanonicalField::Cpm => self.cpm,
            CanonicalField::EngagementRate => self.engagement_rate,
            CanonicalField::SessionDuration => self.session_duration,
            _ => return None,
        };
        Some(value)
    }

    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Date => Some(&self.date),
            CanonicalField::CampaignName => Some(&self.campaign_name),
            CanonicalField::AdsetName => Some(&self.adset_name),
            CanonicalField::AdName => Some(&self.ad_name),
            _ => None,
        }
    }

    pub fn set_numeric(&mut self, field: CanonicalField, value: f64) {
        let value = if value.is_finite() { value } else { 0.0 };
        match field {
            CanonicalField::Impressions => self.impressions = value,
            CanonicalField::Clicks => self.clicks = value,
            CanonicalField::Spend => self.spend = value,
            CanonicalField::Conversions => self.conversions = value,
            CanonicalField::Reach => self.reach = value,
            CanonicalField::Sessions => self.sessions = value,
            CanonicalField::Users => self.users = value,
            CanonicalField::Pageviews => self.pageviews = value,
            CanonicalField::Ctr => self.ctr = value,
            CanonicalField::Cpc => self.cpc = value,
            CanonicalField::Cpm => self.cpm = value,
            CanonicalField::EngagementRate => self.engagement_rate = value,
            CanonicalField::SessionDuration => self.session_duration = value,
            _ => {}
        }
    }

    /// Blank strings collapse to `"Unknown"`.
    pub fn set_text(&mut self, field: CanonicalField, value: &str) {
        let value = value.trim();
        let value = if value.is_empty() { UNKNOWN } else { value }.to_string();
        match field {
            CanonicalField::Date => self.date = value,
            CanonicalField::CampaignName => self.campaign_name = value,
            CanonicalField::AdsetName => self.adset_name = value,
            CanonicalField::AdName => self.ad_name = value,
            _ => {}
        }
    }

    /// Re-establish the schema invariants: finite numerics, non-blank strings.
    pub fn ensure_required(mut self) -> Self {
        for field in CanonicalField::ALL {
            if let Some(v) = self.numeric(field) {
                self.set_numeric(field, v);
            } else if let Some(t) = self.text(field).map(str::to_string) {
                self.set_text(field, &t);
            }
        }
        self
    }

    pub fn has_date(&self) -> bool {
        self.date != UNKNOWN && !self.date.trim().is_empty()
    }
}

/// A decoded table: header names plus string cells. Every row has exactly
/// `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Frame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx)).map(String::as_str)
    }

    /// Build a frame from API rows (JSON objects). Columns appear in
    /// first-seen order, which relies on serde_json's `preserve_order`
    /// feature; scalars are stringified, nulls become empty cells.
    pub fn from_json_rows(rows: &[serde_json::Value]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            if let Some(obj) = row.as_object() {
                for key in obj.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }

        let cells = rows
            .iter()
            .filter_map(|row| row.as_object())
            .map(|obj| {
                columns
                    .iter()
                    .map(|col| match obj.get(col) {
                        None | Some(serde_json::Value::Null) => String::new(),
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                    })
                    .collect()
            })
            .collect();

        Self::new(columns, cells)
    }
}

/// The request-scoped, append-only union of all standardized batches.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedDataset {
    context: TenantContext,
    records: Vec<CanonicalRecord>,
}

impl UnifiedDataset {
    pub fn new(context: TenantContext, records: Vec<CanonicalRecord>) -> Self {
        Self { context, records }
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CanonicalRecord> {
        self.records.iter()
    }

    pub fn from_source(&self, source: Source) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.iter().filter(move |r| r.source == source)
    }

    /// Record count per source, in `Source` order.
    pub fn source_counts(&self) -> BTreeMap<Source, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.source).or_insert(0) += 1;
        }
        counts
    }
}

impl<'a> IntoIterator for &'a UnifiedDataset {
    type Item = &'a CanonicalRecord;
    type IntoIter = std::slice::Iter<'a, CanonicalRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// The structured error body returned by entry points instead of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Result of an insights entry point: a populated result, or `{"error": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ready(T),
    Unavailable(ErrorBody),
}

impl<T> Outcome<T> {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(ErrorBody {
            error: message.into(),
        })
    }

    pub fn no_data() -> Self {
        Self::unavailable("No data available")
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn into_ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable(body) => Some(&body.error),
        }
    }
}
