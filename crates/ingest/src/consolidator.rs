//! Consolidator: accumulates standardized batches for one tenant into a
//! `UnifiedDataset`. One instance per analysis request.

use insights_core::{CanonicalRecord, Frame, Source, TenantContext, UnifiedDataset};
use tracing::info;

use crate::standardizer::standardize;

#[derive(Debug)]
pub struct Consolidator {
    context: TenantContext,
    records: Vec<CanonicalRecord>,
}

impl Consolidator {
    pub fn new(context: TenantContext) -> Self {
        info!(
            user_id = %context.user_id,
            request_id = %context.request_id,
            "Consolidator created"
        );
        Self {
            context,
            records: Vec::new(),
        }
    }

    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    /// Append already-standardized records in arrival order. Returns the
    /// number of records admitted.
    pub fn add(&mut self, records: Vec<CanonicalRecord>) -> usize {
        let added = records.len();
        if added == 0 {
            return 0;
        }
        let per_source = count_by_source(&records);
        self.records
            .extend(records.into_iter().map(CanonicalRecord::ensure_required));

        for (source, count) in per_source {
            metrics::counter!("ingest.rows", "source" => source.as_str()).increment(count as u64);
            info!(
                user_id = %self.context.user_id,
                source = %source,
                added = count,
                total = self.records.len(),
                "Records consolidated"
            );
        }
        added
    }

    /// Standardize a loaded frame and append it.
    pub fn add_frame(&mut self, frame: &Frame, source: Source) -> usize {
        self.add(standardize(frame, source))
    }

    /// Append a batch fetched from a platform API, given as JSON row objects.
    pub fn add_api_batch(&mut self, rows: &[serde_json::Value], source: Source) -> usize {
        let frame = Frame::from_json_rows(rows);
        self.add_frame(&frame, source)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A copy of everything consolidated so far.
    pub fn snapshot(&self) -> UnifiedDataset {
        UnifiedDataset::new(self.context.clone(), self.records.clone())
    }

    pub fn into_dataset(self) -> UnifiedDataset {
        UnifiedDataset::new(self.context, self.records)
    }
}

/// Row counts per source, in order of first appearance.
fn count_by_source(records: &[CanonicalRecord]) -> Vec<(Source, usize)> {
    let mut counts: Vec<(Source, usize)> = Vec::new();
    for record in records {
        match counts.iter_mut().find(|(s, _)| *s == record.source) {
            Some((_, n)) => *n += 1,
            None => counts.push((record.source, 1)),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(columns: &[&str], rows: &[&[&str]]) -> Frame {
        Frame::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_batches_append_in_arrival_order() {
        let mut consolidator = Consolidator::new(TenantContext::new("tenant-a"));
        let meta = frame(&["Campaign name", "Amount spent"], &[&["M1", "10"], &["M2", "20"]]);
        let google = frame(&["Campaign", "Cost"], &[&["G1", "5"]]);

        assert_eq!(consolidator.add_frame(&meta, Source::Meta), 2);
        assert_eq!(consolidator.add_frame(&google, Source::GoogleAds), 1);

        let dataset = consolidator.snapshot();
        let names: Vec<&str> = dataset.iter().map(|r| r.campaign_name.as_str()).collect();
        assert_eq!(names, vec!["M1", "M2", "G1"]);
        assert_eq!(dataset.records()[2].source, Source::GoogleAds);
        assert_eq!(dataset.context().user_id, "tenant-a");
    }

    #[test]
    fn test_add_scrubs_records() {
        let mut consolidator = Consolidator::new(TenantContext::new("tenant-b"));
        let mut record = CanonicalRecord::empty(Source::Meta);
        record.spend = f64::NAN;
        record.campaign_name = String::new();
        consolidator.add(vec![record]);

        let dataset = consolidator.into_dataset();
        assert_eq!(dataset.records()[0].spend, 0.0);
        assert_eq!(dataset.records()[0].campaign_name, "Unknown");
    }

    #[test]
    fn test_api_batch() {
        let mut consolidator = Consolidator::new(TenantContext::new("tenant-c"));
        let rows = vec![
            json!({"date": "2024-01-01", "sessions": 100, "engagementRate": 0.4}),
            json!({"date": "2024-01-02", "sessions": "80"}),
        ];
        assert_eq!(consolidator.add_api_batch(&rows, Source::Ga4), 2);
        let dataset = consolidator.snapshot();
        assert!((dataset.records()[0].sessions - 100.0).abs() < f64::EPSILON);
        assert!((dataset.records()[0].engagement_rate - 0.4).abs() < f64::EPSILON);
        assert!((dataset.records()[1].sessions - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mixed_batch_counted_per_source() {
        let batch = vec![
            CanonicalRecord::empty(Source::Meta),
            CanonicalRecord::empty(Source::Ga4),
            CanonicalRecord::empty(Source::Meta),
            CanonicalRecord::empty(Source::GoogleAds),
        ];
        assert_eq!(
            count_by_source(&batch),
            vec![(Source::Meta, 2), (Source::Ga4, 1), (Source::GoogleAds, 1)]
        );

        let mut consolidator = Consolidator::new(TenantContext::new("tenant-d"));
        assert_eq!(consolidator.add(batch), 4);
        assert_eq!(consolidator.len(), 4);
    }

    #[test]
    fn test_tenants_are_isolated() {
        let mut a = Consolidator::new(TenantContext::new("a"));
        let b = Consolidator::new(TenantContext::new("b"));
        a.add(vec![CanonicalRecord::empty(Source::Ga4)]);
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
