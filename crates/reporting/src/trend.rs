//! Day-by-day trend of a single metric.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use insights_core::CanonicalRecord;
use serde::{Deserialize, Serialize};

use crate::metrics::{finite_or_zero, mean, MetricSnapshot, Totals};

/// Window compared at each end of the series.
pub const TREND_WINDOW: usize = 7;
const IMPROVING_FACTOR: f64 = 1.1;
const DECLINING_FACTOR: f64 = 0.9;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y%m%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%b %d, %Y",
    "%Y/%m/%d",
];

// ---------------------------------------------------------------------------
// Metric selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    Ctr,
    Cpc,
    Cpm,
    Roas,
    ConversionRate,
    CostPerConversion,
    EfficiencyScore,
    Spend,
    Impressions,
    Clicks,
    Conversions,
}

impl TrendMetric {
    pub const ALL: [TrendMetric; 11] = [
        TrendMetric::Ctr,
        TrendMetric::Cpc,
        TrendMetric::Cpm,
        TrendMetric::Roas,
        TrendMetric::ConversionRate,
        TrendMetric::CostPerConversion,
        TrendMetric::EfficiencyScore,
        TrendMetric::Spend,
        TrendMetric::Impressions,
        TrendMetric::Clicks,
        TrendMetric::Conversions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ctr => "ctr",
            Self::Cpc => "cpc",
            Self::Cpm => "cpm",
            Self::Roas => "roas",
            Self::ConversionRate => "conversion_rate",
            Self::CostPerConversion => "cost_per_conversion",
            Self::EfficiencyScore => "efficiency_score",
            Self::Spend => "spend",
            Self::Impressions => "impressions",
            Self::Clicks => "clicks",
            Self::Conversions => "conversions",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    /// Ratio metrics come from the day's aggregate; additive ones are the
    /// day's total.
    pub fn value(&self, day: &MetricSnapshot) -> f64 {
        match self {
            Self::Ctr => day.ctr,
            Self::Cpc => day.cpc,
            Self::Cpm => day.cpm,
            Self::Roas => day.roas,
            Self::ConversionRate => day.conversion_rate,
            Self::CostPerConversion => day.cost_per_conversion,
            Self::EfficiencyScore => day.efficiency_score,
            Self::Spend => day.spend,
            Self::Impressions => day.impressions,
            Self::Clicks => day.clicks,
            Self::Conversions => day.conversions,
        }
    }
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Sort key for a raw date cell. Parsed dates order chronologically and
/// come before anything unparseable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateKey {
    Parsed(NaiveDate),
    Raw(String),
}

impl DateKey {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        // Timestamps such as "2024-01-05 00:00:00" keep only the date part.
        let head = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
        for candidate in [trimmed, head] {
            for format in DATE_FORMATS {
                if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                    return Self::Parsed(date);
                }
            }
        }
        Self::Raw(trimmed.to_string())
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Parsed(date) => Some(*date),
            Self::Raw(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Parsed(date) => date.format("%Y-%m-%d").to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: String,
    pub value: f64,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayValue {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub metric: TrendMetric,
    pub trend_direction: TrendDirection,
    pub daily_data: Vec<DailyPoint>,
    pub best_day: DayValue,
    pub worst_day: DayValue,
    pub average_value: f64,
    pub data_points: usize,
}

/// Group dated rows by day and summarise `metric`. `None` when no row
/// carries a date.
pub fn analyze_trends(records: &[CanonicalRecord], metric: TrendMetric) -> Option<TrendReport> {
    let mut days: BTreeMap<DateKey, Totals> = BTreeMap::new();
    for record in records.iter().filter(|r| r.has_date()) {
        days.entry(DateKey::parse(&record.date))
            .or_default()
            .add(record);
    }
    if days.is_empty() {
        return None;
    }

    let daily_data: Vec<DailyPoint> = days
        .iter()
        .map(|(key, totals)| {
            let snapshot = totals.snapshot();
            DailyPoint {
                date: key.label(),
                value: finite_or_zero(metric.value(&snapshot)),
                spend: snapshot.spend,
                impressions: snapshot.impressions,
                clicks: snapshot.clicks,
                conversions: snapshot.conversions,
            }
        })
        .collect();

    let values: Vec<f64> = daily_data.iter().map(|p| p.value).collect();
    let trend_direction = direction(&values);

    // First occurrence wins on ties for both extremes.
    let mut best = &daily_data[0];
    let mut worst = &daily_data[0];
    for point in &daily_data[1..] {
        if point.value > best.value {
            best = point;
        }
        if point.value < worst.value {
            worst = point;
        }
    }

    Some(TrendReport {
        metric,
        trend_direction,
        best_day: DayValue {
            date: best.date.clone(),
            value: best.value,
        },
        worst_day: DayValue {
            date: worst.date.clone(),
            value: worst.value,
        },
        average_value: mean(&values),
        data_points: daily_data.len(),
        daily_data,
    })
}

fn direction(values: &[f64]) -> TrendDirection {
    if values.len() < 2 {
        return TrendDirection::InsufficientData;
    }
    let window = TREND_WINDOW.min(values.len());
    let earlier = mean(&values[..window]);
    let recent = mean(&values[values.len() - window..]);

    if recent > earlier * IMPROVING_FACTOR {
        TrendDirection::Improving
    } else if recent < earlier * DECLINING_FACTOR {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::Source;

    fn day(
        date: &str,
        spend: f64,
        conversions: f64,
        clicks: f64,
        impressions: f64,
    ) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(Source::Meta);
        r.date = date.to_string();
        r.spend = spend;
        r.conversions = conversions;
        r.clicks = clicks;
        r.impressions = impressions;
        r
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(TrendMetric::parse("ROAS"), Some(TrendMetric::Roas));
        assert_eq!(TrendMetric::parse(" conversion_rate "), Some(TrendMetric::ConversionRate));
        assert_eq!(TrendMetric::parse("bounce"), None);
    }

    #[test]
    fn test_date_key_formats_and_order() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(DateKey::parse("2024-03-09").as_date(), expected);
        assert_eq!(DateKey::parse("20240309").as_date(), expected);
        assert_eq!(DateKey::parse("Mar 09, 2024").as_date(), expected);
        assert_eq!(DateKey::parse("2024-03-09 00:00:00").as_date(), expected);
        assert_eq!(DateKey::parse("week 12"), DateKey::Raw("week 12".into()));
        assert!(DateKey::parse("2024-12-31") < DateKey::parse("2025-01-01"));
        assert!(DateKey::parse("2099-01-01") < DateKey::parse("aaa"));
    }

    #[test]
    fn test_daily_ratio_of_sums() {
        let rows = vec![
            day("2024-01-01", 100.0, 10.0, 10.0, 100.0),
            day("2024-01-01", 0.0, 5.0, 10.0, 100.0),
            day("2024-01-02", 50.0, 5.0, 10.0, 100.0),
        ];
        let report = analyze_trends(&rows, TrendMetric::Roas).expect("report");
        assert_eq!(report.data_points, 2);
        assert_eq!(report.daily_data[0].date, "2024-01-01");
        assert!((report.daily_data[0].value - 15.0 / 100.001).abs() < 1e-9);
        assert!((report.daily_data[0].spend - 100.0).abs() < f64::EPSILON);
        assert!((report.daily_data[0].clicks - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_direction_windows() {
        // Ten days rising steadily: last 7 mean well above first 7 mean.
        let rising: Vec<CanonicalRecord> = (1..=10)
            .map(|d| day(&format!("2024-02-{d:02}"), 10.0 * d as f64, 1.0, 1.0, 10.0))
            .collect();
        let report = analyze_trends(&rising, TrendMetric::Spend).expect("report");
        assert_eq!(report.trend_direction, TrendDirection::Improving);
        assert_eq!(report.best_day.date, "2024-02-10");
        assert_eq!(report.worst_day.date, "2024-02-01");
        assert!((report.average_value - 55.0).abs() < 1e-9);

        let falling: Vec<CanonicalRecord> = (1..=10)
            .map(|d| day(&format!("2024-02-{d:02}"), 100.0 / d as f64, 1.0, 1.0, 10.0))
            .collect();
        let report = analyze_trends(&falling, TrendMetric::Spend).expect("report");
        assert_eq!(report.trend_direction, TrendDirection::Declining);

        let flat = vec![
            day("2024-02-01", 10.0, 1.0, 1.0, 10.0),
            day("2024-02-02", 10.5, 1.0, 1.0, 10.0),
        ];
        let report = analyze_trends(&flat, TrendMetric::Spend).expect("report");
        assert_eq!(report.trend_direction, TrendDirection::Stable);
    }

    #[test]
    fn test_single_date_and_undated() {
        let one = vec![
            day("2024-01-01", 10.0, 1.0, 1.0, 10.0),
            day("2024-01-01", 5.0, 1.0, 1.0, 10.0),
        ];
        let report = analyze_trends(&one, TrendMetric::Clicks).expect("report");
        assert_eq!(report.trend_direction, TrendDirection::InsufficientData);
        assert!((report.best_day.value - 2.0).abs() < f64::EPSILON);

        let undated = vec![CanonicalRecord::empty(Source::Meta)];
        assert!(analyze_trends(&undated, TrendMetric::Roas).is_none());
    }
}
