//! `top-kinfit` library crate.
//!
//! The binary (`kinfit`) is a thin wrapper around this library so that:
//!
//! - the fit is testable without spawning processes
//! - event-level pieces (resolver, objective, minimizer) are reusable on their own

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
