//! The kinematic-fit objective.
//!
//! Kept as a pure function of the parameters over an immutable event context so
//! the minimizer can stay generic.

pub mod chi2;

pub use chi2::*;
