//! Analysis modules.
//!
//! Aggregation of raw claim data into per-provider monthly summaries.

pub mod aggregator;

pub use aggregator::*;
