use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type InsightsResult<T> = Result<T, InsightsError>;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error("No data available")]
    EmptyDataset,

    #[error("Analysis timed out after {0} seconds")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for InsightsError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Raised only when no encoding/parser/strategy combination produced a frame.
#[derive(Debug, Clone, Serialize)]
pub struct ParseFailure {
    pub filename: String,
    pub attempted_encodings: Vec<String>,
    pub attempted_strategies: Vec<String>,
    pub last_error: Option<String>,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "could not parse '{}': tried encodings [{}] and strategies [{}]",
            self.filename,
            self.attempted_encodings.join(", "),
            self.attempted_strategies.join(", ")
        )?;
        if let Some(last) = &self.last_error {
            write!(f, "; last error: {last}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_lists_attempts() {
        let failure = ParseFailure {
            filename: "export.csv".into(),
            attempted_encodings: vec!["utf-8".into(), "latin-1".into()],
            attempted_strategies: vec!["default_comma".into(), "semicolon".into()],
            last_error: Some("no columns".into()),
        };
        let msg = InsightsError::from(failure).to_string();
        assert!(msg.contains("export.csv"));
        assert!(msg.contains("utf-8, latin-1"));
        assert!(msg.contains("default_comma, semicolon"));
        assert!(msg.ends_with("last error: no columns"));
    }
}
