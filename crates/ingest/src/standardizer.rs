//! Schema standardizer: maps platform-specific column names onto the
//! canonical record schema and cleans numeric cells.

use insights_core::types::UNKNOWN;
use insights_core::{CanonicalField, CanonicalRecord, Frame, Source};
use tracing::debug;

use CanonicalField::*;

// ---------------------------------------------------------------------------
// Mapping tables (raw column -> canonical field), ordered by priority
// ---------------------------------------------------------------------------

const META_MAPPINGS: &[(&str, CanonicalField)] = &[
    ("Campaign name", CampaignName),
    ("Campaign", CampaignName),
    ("Ad Set Name", AdsetName),
    ("Ad group", AdsetName),
    ("Adset name", AdsetName),
    ("Ad set name", AdsetName),
    ("Ad name", AdName),
    ("Day", Date),
    ("Date", Date),
    ("Reporting starts", Date),
    ("date_start", Date),
    ("Impressions", Impressions),
    ("Impr.", Impressions),
    ("Amount spent", Spend),
    ("Amount spent (ZAR)", Spend),
    ("Amount spent (USD)", Spend),
    ("Spend", Spend),
    ("Cost", Spend),
    ("Results", Conversions),
    ("Conversions", Conversions),
    ("Link clicks", Clicks),
    ("Clicks", Clicks),
    ("Interactions", Clicks),
    ("Reach", Reach),
    ("CTR (all)", Ctr),
    ("CTR", Ctr),
    ("CPC (all)", Cpc),
    ("CPC (cost per link click)", Cpc),
    ("CPM (cost per 1,000 impressions)", Cpm),
];

const GOOGLE_ADS_MAPPINGS: &[(&str, CanonicalField)] = &[
    ("Campaign", CampaignName),
    ("Ad group", AdsetName),
    ("Impr.", Impressions),
    ("Clicks", Clicks),
    ("Cost", Spend),
    ("Conversions", Conversions),
    ("Impressions", Impressions),
    ("Ad name", AdName),
    ("Day", Date),
    ("Date", Date),
    ("CTR", Ctr),
    ("Avg. CPC", Cpc),
    ("Avg. CPM", Cpm),
];

const GA4_MAPPINGS: &[(&str, CanonicalField)] = &[
    ("sessions", Sessions),
    ("users", Users),
    ("pageviews", Pageviews),
    ("conversions", Conversions),
    ("date", Date),
    ("Sessions", Sessions),
    ("Users", Users),
    ("Active users", Users),
    ("totalUsers", Users),
    ("activeUsers", Users),
    ("Pageviews", Pageviews),
    ("Page views", Pageviews),
    ("screenPageViews", Pageviews),
    ("Views", Pageviews),
    ("Conversions", Conversions),
    ("Key events", Conversions),
    ("Date", Date),
    ("Nth day", Date),
    ("engagementRate", EngagementRate),
    ("Engagement rate", EngagementRate),
    ("averageSessionDuration", SessionDuration),
    ("avgSessionDuration", SessionDuration),
    ("Average session duration", SessionDuration),
    ("sessionCampaignName", CampaignName),
    ("Session campaign", CampaignName),
];

pub fn mappings(source: Source) -> &'static [(&'static str, CanonicalField)] {
    match source {
        Source::Meta => META_MAPPINGS,
        Source::GoogleAds => GOOGLE_ADS_MAPPINGS,
        Source::Ga4 => GA4_MAPPINGS,
    }
}

/// For each canonical field, the index of the first raw column that maps
/// to it. Canonical names act as lowest-priority identity mappings.
fn resolve_columns(frame: &Frame, source: Source) -> Vec<(CanonicalField, usize)> {
    let identity = CanonicalField::ALL.iter().map(|f| (f.name(), *f));
    let table = mappings(source).iter().copied().chain(identity);

    let mut resolved: Vec<(CanonicalField, usize)> = Vec::new();
    for (raw, field) in table {
        if resolved.iter().any(|(f, _)| *f == field) {
            continue;
        }
        if let Some(idx) = frame.column_index(raw) {
            resolved.push((field, idx));
        }
    }
    resolved
}

// ---------------------------------------------------------------------------
// Numeric cleanup
// ---------------------------------------------------------------------------

const CURRENCY_CODES: [&str; 4] = ["ZAR", "USD", "EUR", "GBP"];

/// Parse a formatted numeric cell (`"$1,234.50"`, `"ZAR 12"`, `"3.2%"`,
/// `"--"`). Unparseable or non-finite input yields `0.0`.
pub fn clean_numeric(raw: &str) -> f64 {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| {
            !matches!(c, ',' | '$' | '€' | '£' | '¥' | '₹' | '%' | '"') && !c.is_whitespace()
        })
        .collect();
    for code in CURRENCY_CODES {
        cleaned = cleaned.replace(code, "");
    }

    if cleaned.is_empty() || cleaned == "--" || cleaned == "<0.01" {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Standardization
// ---------------------------------------------------------------------------

/// Map every row of `frame` to a canonical record tagged with `source`.
pub fn standardize(frame: &Frame, source: Source) -> Vec<CanonicalRecord> {
    let resolved = resolve_columns(frame, source);
    debug!(
        source = %source,
        raw_columns = frame.width(),
        mapped_columns = resolved.len(),
        "Resolved column mappings"
    );

    frame
        .rows
        .iter()
        .map(|row| {
            let mut record = CanonicalRecord::empty(source);
            for (field, idx) in &resolved {
                let cell = row.get(*idx).map(String::as_str).unwrap_or("");
                if field.is_numeric() {
                    record.set_numeric(*field, clean_numeric(cell));
                } else {
                    record.set_text(*field, cell);
                }
            }
            record
        })
        .collect()
}

/// Guess the platform of a frame from how many of its columns each
/// mapping table recognises. Ties resolve to Google Ads, then GA4, then Meta.
pub fn infer_source(frame: &Frame) -> Source {
    let hits = |source: Source| {
        mappings(source)
            .iter()
            .filter(|(raw, _)| frame.column_index(raw).is_some())
            .count()
    };

    let mut best = Source::GoogleAds;
    let mut best_hits = hits(best);
    for candidate in [Source::Ga4, Source::Meta] {
        let n = hits(candidate);
        if n > best_hits {
            best = candidate;
            best_hits = n;
        }
    }
    best
}

/// Render canonical records as a frame with canonical column names.
pub fn to_frame(records: &[CanonicalRecord]) -> Frame {
    let mut columns = vec!["source".to_string()];
    columns.extend(CanonicalField::ALL.iter().map(|f| f.name().to_string()));

    let rows = records
        .iter()
        .map(|record| {
            let mut row = vec![record.source.as_str().to_string()];
            for field in CanonicalField::ALL {
                let cell = match (record.text(field), record.numeric(field)) {
                    (Some(text), _) => text.to_string(),
                    (None, Some(value)) => value.to_string(),
                    (None, None) => UNKNOWN.to_string(),
                };
                row.push(cell);
            }
            row
        })
        .collect();

    Frame::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(columns: &[&str], rows: &[&[&str]]) -> Frame {
        Frame::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_clean_numeric_formats() {
        assert!((clean_numeric("$1,234.50") - 1234.5).abs() < 1e-9);
        assert!((clean_numeric("ZAR 12.00") - 12.0).abs() < 1e-9);
        assert!((clean_numeric("3.2%") - 3.2).abs() < 1e-9);
        assert!((clean_numeric("\"7\"") - 7.0).abs() < 1e-9);
        assert!((clean_numeric("€ 99") - 99.0).abs() < 1e-9);
        assert_eq!(clean_numeric("--"), 0.0);
        assert_eq!(clean_numeric("< 0.01"), 0.0);
        assert_eq!(clean_numeric(""), 0.0);
        assert_eq!(clean_numeric("n/a"), 0.0);
        assert_eq!(clean_numeric("inf"), 0.0);
        assert_eq!(clean_numeric("NaN"), 0.0);
    }

    #[test]
    fn test_first_mapping_wins() {
        let f = frame(
            &["Campaign", "Campaign name", "Amount spent", "Cost"],
            &[&["Old", "New", "10", "99"]],
        );
        let records = standardize(&f, Source::Meta);
        assert_eq!(records[0].campaign_name, "New");
        assert!((records[0].spend - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_columns_get_defaults() {
        let f = frame(&["Campaign", "Clicks"], &[&["Brand", "12"], &["", "x"]]);
        let records = standardize(&f, Source::GoogleAds);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].adset_name, UNKNOWN);
        assert_eq!(records[0].spend, 0.0);
        assert_eq!(records[1].campaign_name, UNKNOWN);
        assert_eq!(records[1].clicks, 0.0);
        assert_eq!(records[0].source, Source::GoogleAds);
    }

    #[test]
    fn test_ga4_columns() {
        let f = frame(
            &["Nth day", "Sessions", "Active users", "engagementRate", "Key events"],
            &[&["0001", "120", "80", "0.55", "4"]],
        );
        let r = &standardize(&f, Source::Ga4)[0];
        assert_eq!(r.date, "0001");
        assert!((r.sessions - 120.0).abs() < f64::EPSILON);
        assert!((r.users - 80.0).abs() < f64::EPSILON);
        assert!((r.engagement_rate - 0.55).abs() < f64::EPSILON);
        assert!((r.conversions - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_canonical_frame_round_trips() {
        let f = frame(
            &["Campaign", "Ad group", "Impr.", "Clicks", "Cost", "Conversions", "Day"],
            &[&["Brand", "Exact", "1,000", "40", "$80.00", "4", "2024-03-01"]],
        );
        let records = standardize(&f, Source::GoogleAds);
        let again = standardize(&to_frame(&records), Source::GoogleAds);
        assert_eq!(records, again);
    }

    #[test]
    fn test_infer_source() {
        let google = frame(&["Campaign", "Impr.", "Cost", "Clicks"], &[]);
        assert_eq!(infer_source(&google), Source::GoogleAds);
        let ga4 = frame(&["Date", "Sessions", "Active users", "Page views"], &[]);
        assert_eq!(infer_source(&ga4), Source::Ga4);
        let meta = frame(&["Campaign name", "Amount spent (USD)", "Link clicks", "Reach"], &[]);
        assert_eq!(infer_source(&meta), Source::Meta);
        let unknown = frame(&["x", "y"], &[]);
        assert_eq!(infer_source(&unknown), Source::GoogleAds);
    }

    proptest! {
        #[test]
        fn prop_clean_numeric_is_finite(s in ".{0,24}") {
            prop_assert!(clean_numeric(&s).is_finite());
        }

        #[test]
        fn prop_standardized_numerics_are_finite(cells in proptest::collection::vec(".{0,12}", 4)) {
            let f = Frame::new(
                vec!["Impressions".into(), "Clicks".into(), "Spend".into(), "Results".into()],
                vec![cells],
            );
            for r in standardize(&f, Source::Meta) {
                for field in CanonicalField::ALL {
                    if let Some(v) = r.numeric(field) {
                        prop_assert!(v.is_finite());
                    }
                }
            }
        }
    }
}
