//! Per-event fit orchestration and the batch driver.
//!
//! For one event we:
//! - validate the raw record (two tagged jets, two light jets, one lepton, one MET)
//! - resolve the tagged-jet branch assignment
//! - start the minimizer from the measured pT values, zero neutrino pz and the
//!   mean of the two pre-fit top masses
//! - derive post-fit kinematics and truth diagnostics
//!
//! Events are independent, so the batch driver fits them in parallel. Output
//! order always equals input order.

use rayon::prelude::*;

use crate::domain::{
    AssignmentDecision, BranchAssignment, EventCandidates, EventFit, EventRecord, FitConfig, JetCandidate,
    MinimizerConfig, N_PARAMS,
};
use crate::error::EventError;
use crate::fit::{Minimizer, resolve_event, truth_assignment};
use crate::models::EventContext;

/// Result of fitting a batch of events.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// Fitted events, in input order.
    pub fits: Vec<EventFit>,
    /// Events rejected before fitting.
    pub rejected: Vec<(u64, EventError)>,
    /// Events dropped by `skip_swapped`.
    pub skipped: Vec<u64>,
    /// Resolved events whose pairing differs from the truth pairing.
    pub disagreements: usize,
}

impl BatchOutput {
    /// Number of events that reached the resolver.
    pub fn resolved(&self) -> usize {
        self.fits.len() + self.skipped.len()
    }
}

enum Outcome {
    Fitted(Box<EventFit>),
    Skipped { id: u64, disagrees: bool },
    Rejected { id: u64, error: EventError },
}

/// Check cardinality and finiteness, and split jets into tagged / light.
///
/// Tagged jets keep their input order; see [`BranchAssignment`] for the pairings.
pub fn validate_event(record: &EventRecord) -> Result<EventCandidates, EventError> {
    let tagged: Vec<JetCandidate> = record
        .jets
        .iter()
        .filter(|j| j.is_tagged())
        .map(|j| j.to_candidate())
        .collect();
    let light: Vec<JetCandidate> = record
        .jets
        .iter()
        .filter(|j| !j.is_tagged())
        .map(|j| j.to_candidate())
        .collect();

    let (Ok(tagged), Ok(light), [lepton], [met]) = (
        <[JetCandidate; 2]>::try_from(tagged.as_slice()),
        <[JetCandidate; 2]>::try_from(light.as_slice()),
        record.leptons.as_slice(),
        record.met.as_slice(),
    ) else {
        return Err(EventError::Cardinality {
            tagged: record.jets.iter().filter(|j| j.is_tagged()).count(),
            light: record.jets.iter().filter(|j| !j.is_tagged()).count(),
            leptons: record.leptons.len(),
            met: record.met.len(),
        });
    };

    for (object, jets) in [("tagged jet", &tagged), ("light jet", &light)] {
        for jet in jets {
            check_finite(object, "pt", jet.pt)?;
            check_finite(object, "eta", jet.eta)?;
            check_finite(object, "phi", jet.phi)?;
        }
    }
    check_finite("lepton", "pt", lepton.pt)?;
    check_finite("lepton", "eta", lepton.eta)?;
    check_finite("lepton", "phi", lepton.phi)?;
    check_finite("met", "magnitude", met.magnitude)?;
    check_finite("met", "phi", met.phi)?;

    Ok(EventCandidates {
        id: record.id,
        tagged,
        light,
        lepton: *lepton,
        met: *met,
    })
}

fn check_finite(object: &'static str, field: &'static str, value: f64) -> Result<(), EventError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EventError::NonFinite { object, field })
    }
}

/// Fit one validated event under an already resolved assignment.
pub fn fit_resolved(event: &EventCandidates, decision: AssignmentDecision, config: &MinimizerConfig) -> EventFit {
    let context = EventContext::from_candidates(event, decision.assignment);
    let prefit = decision.chosen();
    let initial_top_mass = prefit.mean();
    let initial = context.initial_parameters(initial_top_mass).to_array();

    let result = Minimizer::new(*config).minimize(&context.objective(), &initial);
    let best: [f64; N_PARAMS] = result.parameters().map(|p| p.to_array()).unwrap_or(initial);
    let post_fit = context.kinematics(&best);

    let leptonic_top_mass_prefit_neutrino =
        (post_fit.leptonic_bjet + context.lepton.momentum() + event.met.prefit_neutrino()).mass();

    let truth_pt = context.leptonic_bjet.truth_pt.filter(|t| t.is_finite() && *t > 0.0);
    let leptonic_bjet_resolution_prefit = truth_pt.map(|t| (context.leptonic_bjet.pt - t) / t);
    let leptonic_bjet_resolution_postfit = truth_pt.map(|t| (post_fit.leptonic_bjet.pt() - t) / t);

    if !result.status.is_converged() {
        tracing::warn!(event = event.id, status = result.status.label(), edm = result.edm, "fit did not converge");
    }
    tracing::debug!(
        event = event.id,
        pairing = decision.assignment.index(),
        chi2 = result.chi2,
        top_mass = best[5],
        calls = result.function_calls,
        "event fitted"
    );

    EventFit {
        id: event.id,
        decision,
        prefit_hadronic_top_mass: prefit.hadronic,
        prefit_leptonic_top_mass: prefit.leptonic,
        initial_top_mass,
        result,
        post_fit,
        leptonic_top_mass_prefit_neutrino,
        disagrees_with_truth: disagreement(&event.tagged, decision.assignment),
        leptonic_bjet_resolution_prefit,
        leptonic_bjet_resolution_postfit,
    }
}

/// Resolve and fit one validated event.
pub fn fit_candidates(event: &EventCandidates, config: &MinimizerConfig) -> EventFit {
    fit_resolved(event, resolve_event(event), config)
}

/// Validate, resolve and fit one raw event.
pub fn fit_event(record: &EventRecord, config: &MinimizerConfig) -> Result<EventFit, EventError> {
    let event = validate_event(record)?;
    Ok(fit_candidates(&event, config))
}

fn disagreement(tagged: &[JetCandidate; 2], chosen: BranchAssignment) -> Option<bool> {
    truth_assignment(tagged).map(|truth| truth != chosen)
}

fn process(record: &EventRecord, config: &FitConfig) -> Outcome {
    let event = match validate_event(record) {
        Ok(event) => event,
        Err(error) => return Outcome::Rejected { id: record.id, error },
    };

    let decision = resolve_event(&event);
    if config.skip_swapped && decision.assignment == BranchAssignment::FirstHadronic {
        return Outcome::Skipped {
            id: event.id,
            disagrees: disagreement(&event.tagged, decision.assignment).unwrap_or(false),
        };
    }

    Outcome::Fitted(Box::new(fit_resolved(&event, decision, &config.minimizer)))
}

/// Fit every event. A bad event is recorded and never stops the batch.
pub fn fit_events(records: &[EventRecord], config: &FitConfig) -> BatchOutput {
    let outcomes: Vec<Outcome> = if config.parallel {
        records.par_iter().map(|r| process(r, config)).collect()
    } else {
        records.iter().map(|r| process(r, config)).collect()
    };

    let mut out = BatchOutput::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Fitted(fit) => {
                if fit.disagrees_with_truth == Some(true) {
                    out.disagreements += 1;
                }
                out.fits.push(*fit);
            }
            Outcome::Skipped { id, disagrees } => {
                if disagrees {
                    out.disagreements += 1;
                }
                out.skipped.push(id);
            }
            Outcome::Rejected { id, error } => {
                tracing::warn!(event = id, %error, "event rejected");
                out.rejected.push((id, error));
            }
        }
    }
    out
}
