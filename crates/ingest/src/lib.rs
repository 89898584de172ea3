//! Ingestion for marketing exports: encoding detection, platform
//! parsers, the byte-level loader, schema standardization and per-tenant
//! consolidation.

pub mod consolidator;
pub mod encoding;
pub mod loader;
pub mod parsers;
pub mod reader;
pub mod standardizer;

pub use consolidator::Consolidator;
pub use loader::{load, LoadedFrame, Loader};
pub use parsers::{ExportFormat, ExportParser};
pub use standardizer::{clean_numeric, infer_source, standardize, to_frame};
