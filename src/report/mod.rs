//! Reporting utilities: run statistics and worst-fit rankings.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::{BranchAssignment, EventFit, FitStatus};
use crate::fit::BatchOutput;

/// Mean and RMS (standard deviation) of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanRms {
    pub n: usize,
    pub mean: f64,
    pub rms: f64,
}

impl MeanRms {
    /// Non-finite values are ignored. `None` for an empty sample.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let values: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        Some(Self {
            n,
            mean,
            rms: var.sqrt(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: FitStatus,
    pub count: usize,
}

/// One row of the worst-chi² listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedFit {
    pub id: u64,
    pub chi2: f64,
    pub top_mass: f64,
    pub status: FitStatus,
    pub pairing: BranchAssignment,
}

impl RankedFit {
    fn from_fit(fit: &EventFit) -> Self {
        Self {
            id: fit.id,
            chi2: fit.chi2(),
            top_mass: fit.top_mass(),
            status: fit.result.status,
            pairing: fit.decision.assignment,
        }
    }
}

/// Aggregate numbers for one `fit` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub events_read: usize,
    pub row_errors: usize,
    pub fitted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub disagreements: usize,
    pub status_counts: Vec<StatusCount>,
    /// Events per chosen pairing, `[pairing 0, pairing 1]`, over fitted events.
    pub pairing_counts: [usize; 2],
    /// Both pre-fit top masses of every fitted event.
    pub prefit_top_mass: Option<MeanRms>,
    /// Fitted top-mass parameter, converged fits only.
    pub fitted_top_mass: Option<MeanRms>,
    /// Post-fit leptonic top with the pre-fit neutrino, converged fits only.
    pub leptonic_top_mass_prefit_neutrino: Option<MeanRms>,
    /// Minimized chi², converged fits only.
    pub chi2: Option<MeanRms>,
    pub median_chi2: Option<f64>,
    pub worst: Vec<RankedFit>,
}

impl RunStats {
    pub fn from_batch(events_read: usize, row_errors: usize, batch: &BatchOutput, top_n: usize) -> Self {
        let status_counts = FitStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: batch.fits.iter().filter(|f| f.result.status == status).count(),
            })
            .collect();

        let mut pairing_counts = [0usize; 2];
        for fit in &batch.fits {
            pairing_counts[fit.decision.assignment.index()] += 1;
        }

        let converged: Vec<&EventFit> = batch.fits.iter().filter(|f| f.result.status.is_converged()).collect();

        let prefit_top_mass = MeanRms::from_values(
            batch
                .fits
                .iter()
                .flat_map(|f| [f.prefit_hadronic_top_mass, f.prefit_leptonic_top_mass]),
        );
        let fitted_top_mass = MeanRms::from_values(converged.iter().map(|f| f.top_mass()));
        let leptonic_top_mass_prefit_neutrino =
            MeanRms::from_values(converged.iter().map(|f| f.leptonic_top_mass_prefit_neutrino));
        let chi2 = MeanRms::from_values(converged.iter().map(|f| f.chi2()));
        let mut chi2_values: Vec<f64> = converged.iter().map(|f| f.chi2()).filter(|v| v.is_finite()).collect();

        Self {
            events_read,
            row_errors,
            fitted: batch.fits.len(),
            rejected: batch.rejected.len(),
            skipped: batch.skipped.len(),
            disagreements: batch.disagreements,
            status_counts,
            pairing_counts,
            prefit_top_mass,
            fitted_top_mass,
            leptonic_top_mass_prefit_neutrino,
            chi2,
            median_chi2: median_mut(&mut chi2_values),
            worst: rank_worst(&batch.fits, top_n),
        }
    }

    pub fn count(&self, status: FitStatus) -> usize {
        self.status_counts
            .iter()
            .find(|c| c.status == status)
            .map(|c| c.count)
            .unwrap_or(0)
    }
}

/// Top-N fits by descending chi². Non-finite chi² ranks first; ties keep input order.
pub fn rank_worst(fits: &[EventFit], top_n: usize) -> Vec<RankedFit> {
    let mut ranked: Vec<RankedFit> = fits.iter().map(RankedFit::from_fit).collect();
    ranked.sort_by(|a, b| sort_key(b.chi2).total_cmp(&sort_key(a.chi2)));
    ranked.truncate(top_n);
    ranked
}

fn sort_key(chi2: f64) -> f64 {
    if chi2.is_finite() { chi2 } else { f64::INFINITY }
}

fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{
        AssignmentDecision, CovarianceQuality, FitResult, PairingMasses, PostFitKinematics,
    };
    use crate::math::FourMomentum;

    pub(crate) fn synthetic_fit(id: u64, chi2: f64, top_mass: f64, status: FitStatus) -> EventFit {
        let masses = PairingMasses {
            hadronic: top_mass - 5.0,
            leptonic: top_mass + 5.0,
        };
        let zero = FourMomentum::zero();
        EventFit {
            id,
            decision: AssignmentDecision {
                assignment: BranchAssignment::FirstLeptonic,
                discriminant: 1.0,
                pairings: [masses, masses],
            },
            prefit_hadronic_top_mass: masses.hadronic,
            prefit_leptonic_top_mass: masses.leptonic,
            initial_top_mass: top_mass,
            result: FitResult {
                params: vec![50.0, 60.0, 40.0, 35.0, 0.0, top_mass],
                errors: vec![1.0; 6],
                covariance: None,
                covariance_quality: CovarianceQuality::Unavailable,
                chi2,
                edm: 0.0,
                iterations: 10,
                function_calls: 200,
                status,
            },
            post_fit: PostFitKinematics {
                hadronic_bjet: zero,
                leptonic_bjet: zero,
                light_jets: [zero, zero],
                neutrino: zero,
                hadronic_w_mass: 80.0,
                leptonic_w_mass: 80.0,
                hadronic_top_mass: top_mass,
                leptonic_top_mass: top_mass,
            },
            leptonic_top_mass_prefit_neutrino: top_mass,
            disagrees_with_truth: None,
            leptonic_bjet_resolution_prefit: None,
            leptonic_bjet_resolution_postfit: None,
        }
    }

    #[test]
    fn mean_rms_ignores_non_finite_values() {
        let s = MeanRms::from_values([1.0, 3.0, f64::NAN]).unwrap();
        assert_eq!(s.n, 2);
        assert!((s.mean - 2.0).abs() < 1e-12);
        assert!((s.rms - 1.0).abs() < 1e-12);
        assert!(MeanRms::from_values([]).is_none());
    }

    #[test]
    fn run_stats_summarize_a_batch() {
        let batch = BatchOutput {
            fits: vec![
                synthetic_fit(1, 2.0, 170.0, FitStatus::Converged),
                synthetic_fit(2, 8.0, 174.0, FitStatus::Converged),
                synthetic_fit(3, 50.0, 300.0, FitStatus::CallLimit),
                synthetic_fit(4, 4.0, 172.0, FitStatus::Converged),
            ],
            rejected: vec![(5, crate::error::EventError::NonFinite { object: "met", field: "phi" })],
            skipped: vec![6],
            disagreements: 1,
        };
        let stats = RunStats::from_batch(6, 0, &batch, 2);

        assert_eq!(stats.fitted, 4);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.count(FitStatus::Converged), 3);
        assert_eq!(stats.count(FitStatus::CallLimit), 1);
        assert_eq!(stats.pairing_counts, [4, 0]);

        // Non-converged fits stay out of the fitted-mass and chi² summaries.
        let mt = stats.fitted_top_mass.unwrap();
        assert_eq!(mt.n, 3);
        assert!((mt.mean - 172.0).abs() < 1e-12);
        assert_eq!(stats.median_chi2, Some(4.0));
        assert_eq!(stats.prefit_top_mass.unwrap().n, 8);

        assert_eq!(stats.worst.iter().map(|w| w.id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn worst_ranking_puts_non_finite_first_and_is_stable() {
        let fits = vec![
            synthetic_fit(1, 3.0, 172.0, FitStatus::Converged),
            synthetic_fit(2, f64::NAN, 172.0, FitStatus::NonFiniteStart),
            synthetic_fit(3, 3.0, 172.0, FitStatus::Converged),
        ];
        let ranked = rank_worst(&fits, 10);
        assert_eq!(ranked.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn median_of_even_sample_is_midpoint() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median_mut(&mut v), Some(2.5));
        assert_eq!(median_mut(&mut []), None);
    }
}
