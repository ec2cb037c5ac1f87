//! Kinematic fit.
//!
//! Responsibilities:
//!
//! - decide which tagged jet belongs to which top branch
//! - minimize the event chi-square over the six fit parameters
//! - fit batches of events (parallel) and collect rejections

pub mod assignment;
pub mod fitter;
pub mod minimizer;

pub use assignment::*;
pub use fitter::*;
pub use minimizer::*;
