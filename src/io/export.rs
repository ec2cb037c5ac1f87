//! Exports: per-event results (CSV), events (CSV) and the run summary (JSON).
//!
//! The CSV outputs are meant to be easy to consume in spreadsheets or
//! downstream scripts. The event CSV uses the same layout `ingest` reads.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{CovarianceQuality, EventFit, EventRecord, FitConfig, FitStatus};
use crate::error::{AppError, EXIT_USAGE};
use crate::report::RunStats;

/// One row of the per-event result export.
#[derive(Debug, Clone, Serialize)]
struct ResultRow {
    event: u64,
    pairing: usize,
    discriminant: f64,
    prefit_hadronic_top: f64,
    prefit_leptonic_top: f64,
    initial_top_mass: f64,
    status: FitStatus,
    chi2: f64,
    edm: f64,
    iterations: usize,
    calls: usize,
    jbh: f64,
    jbl: f64,
    jl1: f64,
    jl2: f64,
    pnz: f64,
    mtop: f64,
    mtop_err: f64,
    covariance: CovarianceQuality,
    hadronic_w: f64,
    leptonic_w: f64,
    hadronic_top: f64,
    leptonic_top: f64,
    leptonic_top_prefit_nu: f64,
    disagrees_with_truth: Option<bool>,
    bjet_resolution_prefit: Option<f64>,
    bjet_resolution_postfit: Option<f64>,
}

impl ResultRow {
    fn from_fit(fit: &EventFit) -> Self {
        let p = |i: usize| fit.result.params.get(i).copied().unwrap_or(f64::NAN);
        Self {
            event: fit.id,
            pairing: fit.decision.assignment.index(),
            discriminant: fit.decision.discriminant,
            prefit_hadronic_top: fit.prefit_hadronic_top_mass,
            prefit_leptonic_top: fit.prefit_leptonic_top_mass,
            initial_top_mass: fit.initial_top_mass,
            status: fit.result.status,
            chi2: fit.chi2(),
            edm: fit.result.edm,
            iterations: fit.result.iterations,
            calls: fit.result.function_calls,
            jbh: p(0),
            jbl: p(1),
            jl1: p(2),
            jl2: p(3),
            pnz: p(4),
            mtop: p(5),
            mtop_err: fit.result.errors.get(5).copied().unwrap_or(f64::NAN),
            covariance: fit.result.covariance_quality,
            hadronic_w: fit.post_fit.hadronic_w_mass,
            leptonic_w: fit.post_fit.leptonic_w_mass,
            hadronic_top: fit.post_fit.hadronic_top_mass,
            leptonic_top: fit.post_fit.leptonic_top_mass,
            leptonic_top_prefit_nu: fit.leptonic_top_mass_prefit_neutrino,
            disagrees_with_truth: fit.disagrees_with_truth,
            bjet_resolution_prefit: fit.leptonic_bjet_resolution_prefit,
            bjet_resolution_postfit: fit.leptonic_bjet_resolution_postfit,
        }
    }
}

/// One object row of the event CSV.
#[derive(Debug, Clone, Serialize)]
struct ObjectRow {
    event: u64,
    object: &'static str,
    pt: f64,
    eta: Option<f64>,
    phi: f64,
    label: Option<i32>,
    truth: Option<u8>,
    truth_pt: Option<f64>,
}

/// Run summary JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryFile<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub input: String,
    pub step: f64,
    pub max_iterations: usize,
    pub max_calls: usize,
    pub edm_tolerance: f64,
    pub error_def: f64,
    pub skip_swapped: bool,
    pub stats: &'a RunStats,
}

/// Write per-event fit results to a CSV file.
pub fn write_results_csv(path: &Path, fits: &[EventFit]) -> Result<(), AppError> {
    let file = create(path, "export CSV")?;
    write_results(file, fits)
}

pub fn write_results<W: Write>(sink: W, fits: &[EventFit]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(sink);
    for fit in fits {
        writer
            .serialize(ResultRow::from_fit(fit))
            .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to write export CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to flush export CSV: {e}")))
}

/// Write events in the ingest layout.
pub fn write_events_csv(path: &Path, events: &[EventRecord]) -> Result<(), AppError> {
    let file = create(path, "event CSV")?;
    write_events(file, events)
}

pub fn write_events<W: Write>(sink: W, events: &[EventRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(sink);
    let mut put = |row: ObjectRow| {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to write event CSV row: {e}")))
    };

    for event in events {
        for jet in &event.jets {
            put(ObjectRow {
                event: event.id,
                object: "jet",
                pt: jet.pt,
                eta: Some(jet.eta),
                phi: jet.phi,
                label: Some(jet.label),
                truth: jet.truth_leptonic.map(u8::from),
                truth_pt: jet.truth_pt,
            })?;
        }
        for lepton in &event.leptons {
            put(ObjectRow {
                event: event.id,
                object: "lepton",
                pt: lepton.pt,
                eta: Some(lepton.eta),
                phi: lepton.phi,
                label: None,
                truth: None,
                truth_pt: None,
            })?;
        }
        for met in &event.met {
            put(ObjectRow {
                event: event.id,
                object: "met",
                pt: met.magnitude,
                eta: None,
                phi: met.phi,
                label: None,
                truth: None,
                truth_pt: None,
            })?;
        }
    }

    writer
        .flush()
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to flush event CSV: {e}")))
}

/// Write the run summary JSON.
pub fn write_summary_json(path: &Path, input: &Path, stats: &RunStats, config: &FitConfig) -> Result<(), AppError> {
    let file = create(path, "summary JSON")?;
    let summary = SummaryFile {
        tool: "kinfit",
        version: env!("CARGO_PKG_VERSION"),
        generated_at: Utc::now(),
        input: input.display().to_string(),
        step: config.minimizer.step,
        max_iterations: config.minimizer.max_iterations,
        max_calls: config.minimizer.max_calls,
        edm_tolerance: config.minimizer.edm_tolerance,
        error_def: config.minimizer.error_def,
        skip_swapped: config.skip_swapped,
        stats,
    };
    serde_json::to_writer_pretty(file, &summary)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to write summary JSON: {e}")))
}

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path).map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to create {what} '{}': {e}", path.display())))
}
