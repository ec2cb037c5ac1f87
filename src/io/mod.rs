//! Input/output helpers.
//!
//! - CSV event ingest (`ingest`)
//! - result, event and summary exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
