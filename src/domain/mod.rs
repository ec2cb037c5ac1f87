//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measured inputs (`JetCandidate`, `LeptonCandidate`, `MissingMomentum`, `EventRecord`)
//! - the branch assignment and fit parameter vector
//! - fit outputs (`FitResult`, `EventFit`) and run configuration

pub mod types;

pub use types::*;
