//! Loader: turns the raw bytes of an uploaded export into a `Frame`,
//! trying every candidate encoding against every matching parser.

use insights_core::config::IngestConfig;
use insights_core::{Frame, ParseFailure};
use tracing::{debug, info, warn};

use crate::encoding;
use crate::parsers::{default_chain, ExportFormat, ExportParser, Sniff};

/// A decoded, parsed export and how it was obtained.
#[derive(Debug, Clone)]
pub struct LoadedFrame {
    pub frame: Frame,
    pub format: ExportFormat,
    pub encoding: String,
    pub strategy: String,
    /// Malformed rows discarded by a lenient strategy.
    pub dropped_rows: usize,
}

pub struct Loader {
    parsers: Vec<Box<dyn ExportParser>>,
    config: IngestConfig,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

impl Loader {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            parsers: default_chain(),
            config,
        }
    }

    /// Replace the parser chain. Order is priority.
    pub fn with_parsers(mut self, parsers: Vec<Box<dyn ExportParser>>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn load(&self, bytes: &[u8], filename: &str) -> Result<LoadedFrame, ParseFailure> {
        let mut attempted_encodings = Vec::new();
        let mut attempted_strategies: Vec<String> = Vec::new();
        let mut last_error = None;

        for candidate in encoding::candidates(bytes) {
            let label = candidate.label();
            attempted_encodings.push(label.clone());

            let Some(text) = candidate.decode(bytes) else {
                debug!(filename, encoding = %label, "Decode failed");
                continue;
            };

            let sniff = Sniff::new(filename, &text, self.config.sniff_chars);
            for parser in self.parsers.iter().filter(|p| p.matches(&sniff)) {
                let format = parser.format();
                let mut tried = Vec::new();
                let result = parser.parse(&text, &self.config, &mut tried);
                for strategy in tried {
                    if !attempted_strategies.contains(&strategy) {
                        attempted_strategies.push(strategy);
                    }
                }

                match result {
                    Ok(parsed) => {
                        if parsed.dropped_rows > 0 {
                            warn!(
                                filename,
                                format = format.as_str(),
                                dropped_rows = parsed.dropped_rows,
                                "Dropped malformed rows"
                            );
                            metrics::counter!("ingest.dropped_rows", "format" => format.as_str())
                                .increment(parsed.dropped_rows as u64);
                        }
                        metrics::counter!("ingest.files", "format" => format.as_str()).increment(1);
                        info!(
                            filename,
                            format = format.as_str(),
                            encoding = %label,
                            strategy = %parsed.strategy,
                            rows = parsed.frame.len(),
                            columns = parsed.frame.width(),
                            "Export loaded"
                        );
                        return Ok(LoadedFrame {
                            frame: parsed.frame,
                            format,
                            encoding: label,
                            strategy: parsed.strategy,
                            dropped_rows: parsed.dropped_rows,
                        });
                    }
                    Err(e) => {
                        debug!(
                            filename,
                            format = format.as_str(),
                            encoding = %label,
                            error = %e,
                            "Parser failed"
                        );
                        last_error = Some(e);
                    }
                }
            }
        }

        warn!(filename, "Could not parse export with any encoding");
        Err(ParseFailure {
            filename: filename.to_string(),
            attempted_encodings,
            attempted_strategies,
            last_error,
        })
    }
}

/// Load with the default parser chain and ingest settings.
pub fn load(bytes: &[u8], filename: &str) -> Result<LoadedFrame, ParseFailure> {
    Loader::default().load(bytes, filename)
}
