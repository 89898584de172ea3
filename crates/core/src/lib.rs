//! Shared types for the campaign insights workspace: the canonical record
//! schema, tabular frames, the per-tenant dataset, configuration and the
//! error taxonomy.

pub mod config;
pub mod error;
pub mod tenant;
pub mod types;

pub use config::AppConfig;
pub use error::{InsightsError, InsightsResult, ParseFailure};
pub use tenant::TenantContext;
pub use types::{CanonicalField, CanonicalRecord, Frame, Outcome, Source, UnifiedDataset};
