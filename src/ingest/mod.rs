//! Data ingestion.
//!
//! Fetching and parsing of the dashboard's data sources, plus the offline
//! helpers that prepare those sources from monthly CSV exports.

pub mod loader;
pub mod reports;

pub use loader::*;
