//! Platform-specific export parsers, evaluated as an ordered chain. Each
//! parser pairs a cheap detection predicate over the filename and the head
//! of the decoded text with a parse routine that tries its own strategies.

use insights_core::config::IngestConfig;
use insights_core::{Frame, Source};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reader::{read_table, ReadOptions, Table};

/// Export layout recognised by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    GoogleAds,
    Ga4,
    Meta,
    Generic,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleAds => "google_ads",
            Self::Ga4 => "ga4",
            Self::Meta => "meta",
            Self::Generic => "generic",
        }
    }

    /// The platform implied by the layout. Generic exports need
    /// column-based inference.
    pub fn source(&self) -> Option<Source> {
        match self {
            Self::GoogleAds => Some(Source::GoogleAds),
            Self::Ga4 => Some(Source::Ga4),
            Self::Meta => Some(Source::Meta),
            Self::Generic => None,
        }
    }
}

/// What a parser predicate gets to look at.
#[derive(Debug, Clone)]
pub struct Sniff<'a> {
    pub filename: String,
    pub head: &'a str,
}

impl<'a> Sniff<'a> {
    pub fn new(filename: &str, text: &'a str, max_chars: usize) -> Self {
        let end = text
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        Self {
            filename: filename.to_lowercase(),
            head: &text[..end],
        }
    }

    fn head_contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.head.contains(n))
    }
}

/// A successfully parsed export.
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    pub frame: Frame,
    pub strategy: String,
    pub dropped_rows: usize,
}

/// One link of the format chain.
pub trait ExportParser: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Whether this parser should be attempted for the given input.
    fn matches(&self, sniff: &Sniff<'_>) -> bool;

    /// Parse the decoded text. Every strategy label attempted is appended
    /// to `tried`, successful or not.
    fn parse(
        &self,
        text: &str,
        cfg: &IngestConfig,
        tried: &mut Vec<String>,
    ) -> Result<ParsedFrame, String>;
}

/// The default chain in priority order.
pub fn default_chain() -> Vec<Box<dyn ExportParser>> {
    vec![
        Box::new(GoogleAdsParser),
        Box::new(Ga4Parser),
        Box::new(MetaParser),
        Box::new(GenericParser),
    ]
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn split_lines(text: &str) -> Vec<&str> {
    text.trim().split('\n').collect()
}

fn count_indicators(line: &str, indicators: &[&str]) -> usize {
    indicators.iter().filter(|i| line.contains(*i)).count()
}

fn is_total_row(line: &str) -> bool {
    let line = line.trim_start().trim_start_matches('"');
    line.starts_with("Total:")
}

fn has_rows(table: &Table) -> Result<(), String> {
    if table.frame.is_empty() {
        Err("parsed frame has no data rows".to_string())
    } else {
        Ok(())
    }
}

fn accept(strategy: String, table: Table) -> ParsedFrame {
    ParsedFrame {
        frame: table.frame,
        strategy,
        dropped_rows: table.dropped_rows,
    }
}

const SEPARATORS: [(u8, &str); 3] = [(b'\t', "tab"), (b',', "comma"), (b';', "semicolon")];

/// Parse a vendor export that carries title rows above the real header.
/// The header is the first line with enough indicator hits; everything
/// above it, `Total:` summary rows and blank lines are dropped, then the
/// separator is auto-detected.
fn parse_titled_export(
    label: &str,
    text: &str,
    header_idx: usize,
    tried: &mut Vec<String>,
) -> Result<ParsedFrame, String> {
    let lines = split_lines(text);
    let mut summary_rows = 0;
    let data_lines: Vec<&str> = lines[header_idx..]
        .iter()
        .copied()
        .filter(|line| {
            if is_total_row(line) {
                summary_rows += 1;
                return false;
            }
            !line.trim().is_empty()
        })
        .collect();

    if data_lines.len() < 2 {
        return Err(format!("{label}: not enough data lines after header"));
    }
    if header_idx > 0 || summary_rows > 0 {
        debug!(
            parser = label,
            title_rows = header_idx,
            summary_rows = summary_rows,
            "Stripped export boilerplate"
        );
    }
    let body = data_lines.join("\n");

    let mut last_error = String::new();
    for (sep, name) in SEPARATORS {
        let strategy = format!("{label}:{name}");
        tried.push(strategy.clone());
        match read_table(&body, &ReadOptions::default().delimiter(sep).skip_bad_lines()) {
            Ok(table)
                if table.frame.width() > 2
                    && !table.frame.columns.iter().all(|c| c.starts_with("Unnamed")) =>
            {
                has_rows(&table)?;
                return Ok(accept(strategy, table));
            }
            Ok(_) => debug!(parser = label, separator = name, "Separator yielded too few columns"),
            Err(e) => {
                debug!(parser = label, separator = name, error = %e, "Separator failed");
                last_error = e;
            }
        }
    }

    let strategy = format!("{label}:fallback_comma");
    tried.push(strategy.clone());
    let table = read_table(&body, &ReadOptions::default().skip_bad_lines())
        .map_err(|e| if last_error.is_empty() { e } else { format!("{e}; {last_error}") })?;
    has_rows(&table)?;
    Ok(accept(strategy, table))
}

fn find_header(text: &str, indicators: &[&str], min_matches: usize) -> Option<usize> {
    split_lines(text)
        .iter()
        .position(|line| count_indicators(line, indicators) >= min_matches)
}

// ---------------------------------------------------------------------------
// Google Ads
// ---------------------------------------------------------------------------

const GOOGLE_HEADER_INDICATORS: [&str; 6] =
    ["Campaign", "Ad group", "Clicks", "Impr.", "Cost", "Conversions"];

pub struct GoogleAdsParser;

impl ExportParser for GoogleAdsParser {
    fn format(&self) -> ExportFormat {
        ExportFormat::GoogleAds
    }

    fn matches(&self, sniff: &Sniff<'_>) -> bool {
        sniff.filename.contains("google")
            || sniff.filename.contains("ads performance")
            || sniff.head_contains_any(&[
                "Campaign,Ad group",
                "Clicks,Impr.,CTR",
                "Cost,Conversions",
            ])
    }

    fn parse(
        &self,
        text: &str,
        cfg: &IngestConfig,
        tried: &mut Vec<String>,
    ) -> Result<ParsedFrame, String> {
        match find_header(text, &GOOGLE_HEADER_INDICATORS, cfg.header_min_matches) {
            Some(idx) => parse_titled_export("google_ads", text, idx, tried),
            None => {
                let strategy = "google_ads:plain".to_string();
                tried.push(strategy.clone());
                let table = read_table(text, &ReadOptions::default())?;
                has_rows(&table)?;
                Ok(accept(strategy, table))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GA4
// ---------------------------------------------------------------------------

pub struct Ga4Parser;

impl Ga4Parser {
    /// Keep the header plus only the lines whose comma count matches it.
    fn clean_lines_only(body: &str) -> Result<Table, String> {
        let lines = split_lines(body);
        let Some((header, rest)) = lines.split_first() else {
            return Err("empty GA4 body".to_string());
        };
        let expected = header.split(',').count();
        let mut dropped_rows = 0;
        let mut kept = vec![*header];
        for line in rest {
            if line.split(',').count() == expected {
                kept.push(line);
            } else {
                dropped_rows += 1;
            }
        }
        if kept.len() < 2 {
            return Err("no consistent GA4 data lines".to_string());
        }
        let mut table = read_table(&kept.join("\n"), &ReadOptions::default())?;
        table.dropped_rows += dropped_rows;
        Ok(table)
    }
}

impl ExportParser for Ga4Parser {
    fn format(&self) -> ExportFormat {
        ExportFormat::Ga4
    }

    fn matches(&self, sniff: &Sniff<'_>) -> bool {
        sniff.filename.contains("ga4") || sniff.head.starts_with('#')
    }

    fn parse(
        &self,
        text: &str,
        _cfg: &IngestConfig,
        tried: &mut Vec<String>,
    ) -> Result<ParsedFrame, String> {
        let lines = split_lines(text);
        let start = lines
            .iter()
            .position(|line| {
                !line.starts_with('#') && line.contains(',') && !line.trim().is_empty()
            })
            .ok_or_else(|| "ga4: could not find data start".to_string())?;
        let body = lines[start..].join("\n");

        let strategies: [(&str, fn(&str) -> Result<Table, String>); 3] = [
            ("ga4:default", |b| read_table(b, &ReadOptions::default())),
            ("ga4:skip_bad_lines", |b| {
                read_table(b, &ReadOptions::default().skip_bad_lines())
            }),
            ("ga4:clean_lines_only", Ga4Parser::clean_lines_only),
        ];

        let mut last_error = "ga4: no strategy produced rows".to_string();
        for (name, strategy) in strategies {
            tried.push(name.to_string());
            match strategy(&body).and_then(|t| has_rows(&t).map(|_| t)) {
                Ok(table) => return Ok(accept(name.to_string(), table)),
                Err(e) => {
                    debug!(strategy = name, error = %e, "GA4 strategy failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

const META_HEADER_INDICATORS: [&str; 6] =
    ["Ad group", "Campaign", "Impr.", "Cost", "Conversions", "Interactions"];

pub struct MetaParser;

impl ExportParser for MetaParser {
    fn format(&self) -> ExportFormat {
        ExportFormat::Meta
    }

    fn matches(&self, sniff: &Sniff<'_>) -> bool {
        sniff.filename.contains("meta")
            || sniff.filename.contains("ad group report")
            || sniff.head.to_lowercase().contains("ad group report")
            || sniff.head_contains_any(&[
                "Ad group status",
                "Ad group\tCampaign",
                "Impr.\tInteractions",
                "All time",
            ])
    }

    fn parse(
        &self,
        text: &str,
        cfg: &IngestConfig,
        tried: &mut Vec<String>,
    ) -> Result<ParsedFrame, String> {
        let idx = find_header(text, &META_HEADER_INDICATORS, cfg.header_min_matches)
            .ok_or_else(|| "meta: could not find header row".to_string())?;
        parse_titled_export("meta", text, idx, tried)
    }
}

// ---------------------------------------------------------------------------
// Generic
// ---------------------------------------------------------------------------

pub struct GenericParser;

impl GenericParser {
    fn strategies() -> Vec<(&'static str, ReadOptions)> {
        vec![
            ("default_comma", ReadOptions::default()),
            ("skip_bad_lines", ReadOptions::default().skip_bad_lines()),
            ("semicolon", ReadOptions::default().delimiter(b';')),
            ("skip_rows_1", ReadOptions::default().skip_rows(1)),
            ("skip_rows_2", ReadOptions::default().skip_rows(2)),
            ("quote_all", ReadOptions::default().escape(b'\\')),
        ]
    }

    fn usable(table: &Table) -> bool {
        table.frame.width() > 1 && !table.frame.is_empty()
    }
}

impl ExportParser for GenericParser {
    fn format(&self) -> ExportFormat {
        ExportFormat::Generic
    }

    fn matches(&self, _sniff: &Sniff<'_>) -> bool {
        true
    }

    fn parse(
        &self,
        text: &str,
        cfg: &IngestConfig,
        tried: &mut Vec<String>,
    ) -> Result<ParsedFrame, String> {
        let mut last_error = "generic: no strategy produced more than one column".to_string();

        for (name, opts) in Self::strategies() {
            tried.push(name.to_string());
            match read_table(text, &opts) {
                Ok(table) if Self::usable(&table) => return Ok(accept(name.to_string(), table)),
                Ok(_) => debug!(strategy = name, "Strategy produced an unusable frame"),
                Err(e) => {
                    debug!(strategy = name, error = %e, "Strategy failed");
                    last_error = e;
                }
            }
        }

        // Last resort: re-read from later start lines, skipping bad rows.
        let lines = split_lines(text);
        if lines.len() > 5 {
            let retries = cfg.max_start_line_retries.min(lines.len() - 2);
            for start in 0..retries {
                let name = format!("start_line_{}", start + 1);
                tried.push(name.clone());
                let subset = lines[start..].join("\n");
                match read_table(&subset, &ReadOptions::default().skip_bad_lines()) {
                    Ok(table) if Self::usable(&table) => return Ok(accept(name, table)),
                    Ok(_) => {}
                    Err(e) => last_error = e,
                }
            }
        }

        Err(last_error)
    }
}
