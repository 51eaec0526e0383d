//! Report generation modules.
//!
//! Builds the provider tables and renders dashboard views.

pub mod generator;
pub mod table;

pub use generator::*;
