//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place keeps the core workflow reusable outside the CLI:
//! CSV ingest -> per-event validation/assignment/fit -> run statistics

use std::path::Path;

use crate::domain::{EventRecord, FitConfig};
use crate::error::{AppError, EXIT_NO_DATA};
use crate::fit::{BatchOutput, fit_events};
use crate::io::{IngestedEvents, load_events};
use crate::report::RunStats;

/// All computed outputs of a single `kinfit fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedEvents,
    pub batch: BatchOutput,
    pub stats: RunStats,
}

/// Execute the full pipeline on an event CSV.
pub fn run_fit(input: &Path, config: &FitConfig) -> Result<RunOutput, AppError> {
    let ingest = load_events(input)?;
    for e in &ingest.row_errors {
        tracing::warn!(line = e.line, event = e.event, "{}", e.message);
    }
    run_fit_on_events(ingest, config)
}

/// Execute the pipeline on already ingested events.
pub fn run_fit_on_events(ingest: IngestedEvents, config: &FitConfig) -> Result<RunOutput, AppError> {
    tracing::info!(events = ingest.events.len(), parallel = config.parallel, "fitting events");
    let batch = fit_events(&ingest.events, config);

    if batch.fits.is_empty() && batch.skipped.is_empty() {
        return Err(AppError::new(EXIT_NO_DATA, "No valid events remain after validation."));
    }

    let stats = RunStats::from_batch(ingest.events.len(), ingest.row_errors.len(), &batch, config.top_n);
    tracing::info!(
        fitted = stats.fitted,
        rejected = stats.rejected,
        skipped = stats.skipped,
        "fit run finished"
    );

    Ok(RunOutput { ingest, batch, stats })
}

/// Wrap in-memory events (e.g. freshly generated) as ingest output.
pub fn ingest_from_events(events: Vec<EventRecord>) -> IngestedEvents {
    IngestedEvents {
        rows_read: events.iter().map(|e| e.jets.len() + e.leptons.len() + e.met.len()).sum(),
        events,
        row_errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SampleConfig, generate_sample};
    use crate::domain::FitStatus;

    #[test]
    fn generated_events_fit_near_the_generated_top_mass() {
        let events = generate_sample(&SampleConfig {
            events: 40,
            seed: 11,
            ..SampleConfig::default()
        })
        .unwrap();
        let run = run_fit_on_events(ingest_from_events(events), &FitConfig::default()).unwrap();

        assert_eq!(run.stats.fitted, 40);
        assert_eq!(run.stats.rejected, 0);
        assert!(run.stats.count(FitStatus::Converged) >= 20);
        let mt = run.stats.fitted_top_mass.unwrap();
        assert!((mt.mean - 172.5).abs() < 20.0, "mean fitted top mass {}", mt.mean);
    }

    #[test]
    fn all_rejected_is_a_no_data_error() {
        let events = vec![EventRecord {
            id: 1,
            ..EventRecord::default()
        }];
        let err = run_fit_on_events(ingest_from_events(events), &FitConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_DATA);
    }
}
