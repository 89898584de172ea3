//! Funnel analysis: ad clicks through website sessions and engagement to
//! conversions.
//!
//! Ad-platform and GA4 rows are summed independently; there is no user
//! level join between the two, so the report is always flagged
//! approximate.

use chrono::NaiveDate;
use insights_core::{CanonicalRecord, Source};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::finite_or_zero;
use crate::trend::DateKey;

pub const APPROXIMATE_NOTE: &str =
    "Stage totals are summed per platform without user-level joins; treat drop-offs as indicative";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelStage {
    AdClicks,
    WebsiteSessions,
    EngagedSessions,
    Conversions,
}

impl FunnelStage {
    pub const ORDER: [FunnelStage; 4] = [
        FunnelStage::AdClicks,
        FunnelStage::WebsiteSessions,
        FunnelStage::EngagedSessions,
        FunnelStage::Conversions,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelTransition {
    AdsToWebsite,
    WebsiteToEngagement,
    EngagementToConversion,
}

impl FunnelTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdsToWebsite => "ads_to_website",
            Self::WebsiteToEngagement => "website_to_engagement",
            Self::EngagementToConversion => "engagement_to_conversion",
        }
    }

    fn potential_issue(&self) -> &'static str {
        match self {
            Self::AdsToWebsite => "Ad targeting mismatch or slow loading times",
            Self::WebsiteToEngagement => "Poor landing page experience or irrelevant content",
            Self::EngagementToConversion => "Friction in checkout or weak calls to action",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelOverview {
    pub ad_clicks: f64,
    pub website_sessions: f64,
    pub engaged_sessions: f64,
    pub conversions: f64,
}

impl FunnelOverview {
    pub fn stage(&self, stage: FunnelStage) -> f64 {
        match stage {
            FunnelStage::AdClicks => self.ad_clicks,
            FunnelStage::WebsiteSessions => self.website_sessions,
            FunnelStage::EngagedSessions => self.engaged_sessions,
            FunnelStage::Conversions => self.conversions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropOff {
    pub transition: FunnelTransition,
    pub lost: f64,
    /// Percent of the upstream stage lost, 0..=100 when the funnel narrows.
    pub drop_off_rate: f64,
    pub potential_issue: String,
}

/// Stage-to-stage rates in percent. Absent when the denominator is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_to_session: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_to_engagement: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_to_conversion: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelReport {
    pub funnel_overview: FunnelOverview,
    pub drop_off_analysis: Vec<DropOff>,
    pub conversion_rates: ConversionRates,
    pub biggest_drop_off_stage: Option<FunnelTransition>,
    /// Sum of `lost` across every transition.
    pub total_users_lost: f64,
    pub date_window: Option<DateWindow>,
    pub conversions_from_ads: bool,
    pub approximate: bool,
    pub note: String,
}

/// Build the funnel report. `None` when the dataset holds neither ad nor
/// GA4 rows.
pub fn analyze_funnel(records: &[CanonicalRecord]) -> Option<FunnelReport> {
    let ads: Vec<&CanonicalRecord> = records.iter().filter(|r| r.source.is_ad_platform()).collect();
    let ga4: Vec<&CanonicalRecord> = records.iter().filter(|r| r.source == Source::Ga4).collect();
    if ads.is_empty() && ga4.is_empty() {
        return None;
    }

    let date_window = shared_window(&ads, &ga4);
    let (ads, ga4) = match &date_window {
        Some(window) => (within(&ads, window), within(&ga4, window)),
        None => (ads, ga4),
    };

    let ga4_conversions: f64 = ga4.iter().map(|r| r.conversions).sum();
    let conversions_from_ads = ga4_conversions <= 0.0;
    let conversions = if conversions_from_ads {
        ads.iter().map(|r| r.conversions).sum()
    } else {
        ga4_conversions
    };

    let overview = FunnelOverview {
        ad_clicks: finite_or_zero(ads.iter().map(|r| r.clicks).sum()),
        website_sessions: finite_or_zero(ga4.iter().map(|r| r.sessions).sum()),
        engaged_sessions: finite_or_zero(
            ga4.iter()
                .filter(|r| r.engagement_rate > 0.0)
                .map(|r| r.sessions)
                .sum(),
        ),
        conversions: finite_or_zero(conversions),
    };

    let drop_offs = drop_offs(&overview);
    let biggest = biggest_drop_off(&drop_offs);
    let total_users_lost = finite_or_zero(drop_offs.iter().map(|d| d.lost).sum());

    debug!(
        ad_rows = ads.len(),
        ga4_rows = ga4.len(),
        windowed = date_window.is_some(),
        "funnel computed"
    );

    Some(FunnelReport {
        conversion_rates: conversion_rates(&overview),
        funnel_overview: overview,
        drop_off_analysis: drop_offs,
        biggest_drop_off_stage: biggest,
        total_users_lost,
        date_window,
        conversions_from_ads,
        approximate: true,
        note: APPROXIMATE_NOTE.to_string(),
    })
}

fn drop_offs(overview: &FunnelOverview) -> Vec<DropOff> {
    let transitions = [
        FunnelTransition::AdsToWebsite,
        FunnelTransition::WebsiteToEngagement,
        FunnelTransition::EngagementToConversion,
    ];
    transitions
        .into_iter()
        .zip(FunnelStage::ORDER.windows(2))
        .filter_map(|(transition, pair)| {
            let up = overview.stage(pair[0]);
            let down = overview.stage(pair[1]);
            if up <= 0.0 {
                return None;
            }
            Some(DropOff {
                transition,
                lost: up - down,
                drop_off_rate: finite_or_zero((up - down) / up * 100.0),
                potential_issue: transition.potential_issue().to_string(),
            })
        })
        .collect()
}

/// Highest drop-off rate; earlier transitions win ties.
fn biggest_drop_off(drop_offs: &[DropOff]) -> Option<FunnelTransition> {
    let mut best: Option<&DropOff> = None;
    for d in drop_offs {
        match best {
            Some(b) if d.drop_off_rate <= b.drop_off_rate => {}
            _ => best = Some(d),
        }
    }
    best.map(|d| d.transition)
}

fn conversion_rates(overview: &FunnelOverview) -> ConversionRates {
    let pct = |num: f64, den: f64| (den > 0.0).then(|| finite_or_zero(num / den * 100.0));
    ConversionRates {
        click_to_session: pct(overview.website_sessions, overview.ad_clicks),
        session_to_engagement: pct(overview.engaged_sessions, overview.website_sessions),
        session_to_conversion: pct(overview.conversions, overview.website_sessions),
    }
}

fn date_range(rows: &[&CanonicalRecord]) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = rows
        .iter()
        .filter(|r| r.has_date())
        .filter_map(|r| DateKey::parse(&r.date).as_date());
    let first = dates.next()?;
    Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Overlap of the two date ranges, when both sides are dated and they meet.
fn shared_window(ads: &[&CanonicalRecord], ga4: &[&CanonicalRecord]) -> Option<DateWindow> {
    let (ad_lo, ad_hi) = date_range(ads)?;
    let (ga_lo, ga_hi) = date_range(ga4)?;
    let start = ad_lo.max(ga_lo);
    let end = ad_hi.min(ga_hi);
    (start <= end).then_some(DateWindow { start, end })
}

fn within<'a>(rows: &[&'a CanonicalRecord], window: &DateWindow) -> Vec<&'a CanonicalRecord> {
    rows.iter()
        .copied()
        .filter(|r| {
            DateKey::parse(&r.date)
                .as_date()
                .is_some_and(|d| d >= window.start && d <= window.end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(date: &str, clicks: f64, conversions: f64) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(Source::GoogleAds);
        r.date = date.to_string();
        r.clicks = clicks;
        r.conversions = conversions;
        r
    }

    fn ga4(date: &str, sessions: f64, engagement_rate: f64, conversions: f64) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(Source::Ga4);
        r.date = date.to_string();
        r.sessions = sessions;
        r.engagement_rate = engagement_rate;
        r.conversions = conversions;
        r
    }

    #[test]
    fn test_drop_off_rates_and_biggest_stage() {
        let records = vec![
            ad("2024-01-01", 1000.0, 3.0),
            ga4("2024-01-01", 200.0, 0.6, 20.0),
            ga4("2024-01-01", 600.0, 0.0, 0.0),
        ];
        let report = analyze_funnel(&records).expect("report");

        assert_eq!(report.funnel_overview.ad_clicks, 1000.0);
        assert_eq!(report.funnel_overview.website_sessions, 800.0);
        assert_eq!(report.funnel_overview.engaged_sessions, 200.0);
        assert_eq!(report.funnel_overview.conversions, 20.0);
        assert!(!report.conversions_from_ads);

        let rates: Vec<f64> = report.drop_off_analysis.iter().map(|d| d.drop_off_rate).collect();
        assert_eq!(rates.len(), 3);
        for (got, want) in rates.iter().zip([20.0, 75.0, 90.0]) {
            assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
        }
        // 200 + 600 + 180 lost across the three transitions.
        assert!((report.total_users_lost - 980.0).abs() < 1e-9);
        assert_eq!(
            report.biggest_drop_off_stage,
            Some(FunnelTransition::EngagementToConversion)
        );
        assert!(report.approximate);

        let cr = &report.conversion_rates;
        assert!((cr.click_to_session.unwrap_or_default() - 80.0).abs() < 1e-9);
        assert!((cr.session_to_engagement.unwrap_or_default() - 25.0).abs() < 1e-9);
        assert!((cr.session_to_conversion.unwrap_or_default() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_conversions_fall_back_to_ads() {
        let records = vec![ad("Unknown", 100.0, 7.0), ga4("Unknown", 50.0, 0.5, 0.0)];
        let report = analyze_funnel(&records).expect("report");
        assert!(report.conversions_from_ads);
        assert_eq!(report.funnel_overview.conversions, 7.0);
        assert!(report.date_window.is_none());
    }

    #[test]
    fn test_ties_go_to_first_transition() {
        let overview = FunnelOverview {
            ad_clicks: 100.0,
            website_sessions: 50.0,
            engaged_sessions: 25.0,
            conversions: 25.0,
        };
        let d = drop_offs(&overview);
        assert_eq!(biggest_drop_off(&d), Some(FunnelTransition::AdsToWebsite));
    }

    #[test]
    fn test_zero_upstream_skips_transition() {
        let records = vec![ga4("Unknown", 0.0, 0.0, 0.0)];
        let report = analyze_funnel(&records).expect("report");
        assert!(report.drop_off_analysis.is_empty());
        assert!(report.biggest_drop_off_stage.is_none());
        assert_eq!(report.conversion_rates, ConversionRates::default());
    }

    #[test]
    fn test_shared_date_window() {
        let records = vec![
            ad("2024-01-01", 500.0, 0.0),
            ad("2024-01-05", 100.0, 0.0),
            ga4("2024-01-03", 40.0, 1.0, 2.0),
            ga4("2024-01-09", 900.0, 1.0, 90.0),
        ];
        let report = analyze_funnel(&records).expect("report");
        let window = report.date_window.expect("window");
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 1, 3).expect("date"));
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 1, 5).expect("date"));
        assert_eq!(report.funnel_overview.ad_clicks, 100.0);
        assert_eq!(report.funnel_overview.website_sessions, 40.0);
        assert_eq!(report.funnel_overview.conversions, 2.0);
    }

    #[test]
    fn test_drop_off_units_match_conversion_rates() {
        let records = vec![
            ad("2024-01-01", 1000.0, 3.0),
            ga4("2024-01-01", 200.0, 0.6, 20.0),
            ga4("2024-01-01", 600.0, 0.0, 0.0),
        ];
        let report = analyze_funnel(&records).expect("report");
        let json = serde_json::to_value(&report).expect("json");

        let first = &json["drop_off_analysis"][0];
        assert_eq!(first["transition"], "ads_to_website");
        let rate = first["drop_off_rate"].as_f64().unwrap_or_default();
        let kept = json["conversion_rates"]["click_to_session"].as_f64().unwrap_or_default();
        assert!((rate + kept - 100.0).abs() < 1e-9);
        assert_eq!(json["total_users_lost"], 980.0);
    }

    #[test]
    fn test_no_funnel_rows() {
        assert!(analyze_funnel(&[]).is_none());
    }
}
