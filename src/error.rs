//! Error types.
//!
//! Two layers:
//! - [`AppError`] terminates the process (bad flags, unreadable files, empty input)
//!   and carries the exit code `main` returns.
//! - [`EventError`] rejects a single event. The batch driver records it and moves
//!   on to the next event.

use thiserror::Error;

/// Exit code for usage, configuration and I/O problems.
pub const EXIT_USAGE: u8 = 2;
/// Exit code when no usable events remain.
pub const EXIT_NO_DATA: u8 = 3;
/// Exit code for internal numeric failures.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Why an event was rejected before (or instead of) fitting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    /// Object counts do not match two tagged jets, two light jets, one lepton, one MET.
    #[error(
        "malformed input: expected 2 tagged jets, 2 light jets, 1 lepton, 1 MET; \
         got {tagged} tagged, {light} light, {leptons} leptons, {met} MET"
    )]
    Cardinality {
        tagged: usize,
        light: usize,
        leptons: usize,
        met: usize,
    },

    /// A measured quantity is NaN or infinite.
    #[error("malformed input: non-finite {field} in {object}")]
    NonFinite {
        object: &'static str,
        field: &'static str,
    },
}
