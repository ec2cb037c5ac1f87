//! Shared domain types.
//!
//! Inputs (`JetCandidate`, `LeptonCandidate`, `MissingMomentum`) are immutable
//! measurements. A fit never mutates them; post-fit objects are derived copies.

use serde::{Deserialize, Serialize};

use crate::math::FourMomentum;

/// W boson mass hypothesis (GeV).
pub const W_MASS: f64 = 80.379;
/// W boson width used as the mass-constraint scale (GeV).
pub const W_WIDTH: f64 = 2.085;
/// Top quark width used as the mass-constraint scale (GeV).
pub const TOP_WIDTH: f64 = 1.35;
/// Fractional jet pT resolution.
pub const JET_RESOLUTION: f64 = 0.2;
/// Rest mass assigned to tagged (b) jets (GeV).
pub const TAGGED_JET_MASS: f64 = 5.0;
/// Rest mass assigned to light jets (GeV).
pub const LIGHT_JET_MASS: f64 = 0.0;
/// Rest mass assigned to the charged lepton (GeV).
pub const LEPTON_MASS: f64 = 0.1;
/// Flavour label marking a tagged jet in the input.
pub const TAGGED_LABEL: i32 = 5;

/// Number of free parameters in the kinematic fit.
pub const N_PARAMS: usize = 6;

/// A measured jet: fixed direction, measured pT and an assumed rest mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JetCandidate {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    /// Truth-matched pT, for resolution diagnostics only.
    pub truth_pt: Option<f64>,
    /// Truth says this jet belongs to the leptonic branch.
    pub truth_leptonic: Option<bool>,
}

impl JetCandidate {
    pub fn tagged(pt: f64, eta: f64, phi: f64) -> Self {
        Self {
            pt,
            eta,
            phi,
            mass: TAGGED_JET_MASS,
            truth_pt: None,
            truth_leptonic: None,
        }
    }

    pub fn light(pt: f64, eta: f64, phi: f64) -> Self {
        Self {
            pt,
            eta,
            phi,
            mass: LIGHT_JET_MASS,
            truth_pt: None,
            truth_leptonic: None,
        }
    }

    pub fn momentum(&self) -> FourMomentum {
        FourMomentum::from_pt_eta_phi_m(self.pt, self.eta, self.phi, self.mass)
    }

    /// Same direction and mass, transverse momentum replaced by `pt`.
    pub fn momentum_with_pt(&self, pt: f64) -> FourMomentum {
        FourMomentum::from_pt_eta_phi_m(pt, self.eta, self.phi, self.mass)
    }
}

/// The charged lepton. Always exactly one per event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeptonCandidate {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
}

impl LeptonCandidate {
    pub fn new(pt: f64, eta: f64, phi: f64) -> Self {
        Self { pt, eta, phi }
    }

    pub fn momentum(&self) -> FourMomentum {
        FourMomentum::from_pt_eta_phi_m(self.pt, self.eta, self.phi, LEPTON_MASS)
    }
}

/// Missing transverse momentum, the neutrino proxy.
///
/// Only the transverse components are measured. Pre-fit, the neutrino is
/// taken massless with zero longitudinal momentum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingMomentum {
    pub magnitude: f64,
    pub phi: f64,
}

impl MissingMomentum {
    pub fn new(magnitude: f64, phi: f64) -> Self {
        Self { magnitude, phi }
    }

    pub fn px(&self) -> f64 {
        self.magnitude * self.phi.cos()
    }

    pub fn py(&self) -> f64 {
        self.magnitude * self.phi.sin()
    }

    /// Pre-fit neutrino: `pz = 0`, on-shell and massless.
    pub fn prefit_neutrino(&self) -> FourMomentum {
        FourMomentum::from_pt_eta_phi_m(self.magnitude, 0.0, self.phi, 0.0)
    }
}

/// Which tagged jet goes to which branch.
///
/// Tagged jets keep their input order. Pairing 0 sends the first one to the
/// leptonic branch, which is also the layout of truth-ordered inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchAssignment {
    /// Pairing 0: first tagged jet → leptonic, second → hadronic.
    FirstLeptonic,
    /// Pairing 1: first tagged jet → hadronic, second → leptonic.
    FirstHadronic,
}

impl BranchAssignment {
    pub const ALL: [BranchAssignment; 2] = [BranchAssignment::FirstLeptonic, BranchAssignment::FirstHadronic];

    /// Pairing index (0 or 1).
    pub fn index(self) -> usize {
        match self {
            BranchAssignment::FirstLeptonic => 0,
            BranchAssignment::FirstHadronic => 1,
        }
    }

    /// Input index of the tagged jet sent to the leptonic branch.
    pub fn leptonic_index(self) -> usize {
        match self {
            BranchAssignment::FirstLeptonic => 0,
            BranchAssignment::FirstHadronic => 1,
        }
    }

    /// Split the tagged jets (input order) into `(hadronic, leptonic)`.
    pub fn split<T: Copy>(self, tagged: &[T; 2]) -> (T, T) {
        let lep = self.leptonic_index();
        (tagged[1 - lep], tagged[lep])
    }
}

/// Candidate top masses under one pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairingMasses {
    pub hadronic: f64,
    pub leptonic: f64,
}

impl PairingMasses {
    pub fn abs_difference(&self) -> f64 {
        (self.hadronic - self.leptonic).abs()
    }

    pub fn mean(&self) -> f64 {
        0.5 * (self.hadronic + self.leptonic)
    }
}

/// Resolver output: the chosen pairing plus the numbers behind the choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub assignment: BranchAssignment,
    pub discriminant: f64,
    /// Masses indexed by pairing (`[pairing 0, pairing 1]`).
    pub pairings: [PairingMasses; 2],
}

impl AssignmentDecision {
    /// Masses under the chosen pairing.
    pub fn chosen(&self) -> PairingMasses {
        self.pairings[self.assignment.index()]
    }
}

/// The six fit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParameters {
    pub hadronic_bjet_pt: f64,
    pub leptonic_bjet_pt: f64,
    pub light_jet0_pt: f64,
    pub light_jet1_pt: f64,
    pub neutrino_pz: f64,
    pub top_mass: f64,
}

impl FitParameters {
    pub fn to_array(&self) -> [f64; N_PARAMS] {
        [
            self.hadronic_bjet_pt,
            self.leptonic_bjet_pt,
            self.light_jet0_pt,
            self.light_jet1_pt,
            self.neutrino_pz,
            self.top_mass,
        ]
    }

    /// Read the first six values of `values`; `None` if fewer are supplied.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f, ..] => Some(Self {
                hadronic_bjet_pt: *a,
                leptonic_bjet_pt: *b,
                light_jet0_pt: *c,
                light_jet1_pt: *d,
                neutrino_pz: *e,
                top_mass: *f,
            }),
            _ => None,
        }
    }
}

/// How the minimizer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    /// Estimated distance to minimum fell below tolerance.
    Converged,
    /// Iteration budget exhausted.
    IterationLimit,
    /// Function-evaluation budget exhausted.
    CallLimit,
    /// No descent step with a finite objective could be found.
    LineSearchFailed,
    /// The starting point is non-finite and no nearby finite point was found.
    NonFiniteStart,
}

impl FitStatus {
    pub const ALL: [FitStatus; 5] = [
        FitStatus::Converged,
        FitStatus::IterationLimit,
        FitStatus::CallLimit,
        FitStatus::LineSearchFailed,
        FitStatus::NonFiniteStart,
    ];

    pub fn is_converged(self) -> bool {
        self == FitStatus::Converged
    }

    pub fn label(self) -> &'static str {
        match self {
            FitStatus::Converged => "converged",
            FitStatus::IterationLimit => "iteration-limit",
            FitStatus::CallLimit => "call-limit",
            FitStatus::LineSearchFailed => "line-search-failed",
            FitStatus::NonFiniteStart => "non-finite-start",
        }
    }
}

/// How the parameter errors were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceQuality {
    /// Hessian was positive definite.
    Accurate,
    /// Diagonal damping was needed.
    Damped,
    /// SVD pseudo-inverse of a singular Hessian.
    PseudoInverse,
    /// Hessian unusable; errors come from the variable-metric approximation.
    Approximate,
    /// No error estimate available.
    Unavailable,
}

/// Minimizer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: Vec<f64>,
    /// One-sigma errors (Δχ² = error definition).
    pub errors: Vec<f64>,
    /// Row-major covariance, if one could be formed.
    pub covariance: Option<Vec<f64>>,
    pub covariance_quality: CovarianceQuality,
    /// Objective re-evaluated at `params`.
    pub chi2: f64,
    /// Estimated distance to minimum at termination.
    pub edm: f64,
    pub iterations: usize,
    pub function_calls: usize,
    pub status: FitStatus,
}

impl FitResult {
    pub fn parameters(&self) -> Option<FitParameters> {
        FitParameters::from_slice(&self.params)
    }
}

/// One reconstructed-object record before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetRecord {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub label: i32,
    /// `Some(true)` for a jet from the leptonic branch.
    pub truth_leptonic: Option<bool>,
    pub truth_pt: Option<f64>,
}

impl JetRecord {
    pub fn is_tagged(&self) -> bool {
        self.label == TAGGED_LABEL
    }

    pub fn to_candidate(&self) -> JetCandidate {
        let base = if self.is_tagged() {
            JetCandidate::tagged(self.pt, self.eta, self.phi)
        } else {
            JetCandidate::light(self.pt, self.eta, self.phi)
        };
        JetCandidate {
            truth_pt: self.truth_pt,
            truth_leptonic: self.truth_leptonic,
            ..base
        }
    }
}

/// Raw per-event input as read from disk. Cardinality is not yet checked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventRecord {
    pub id: u64,
    pub jets: Vec<JetRecord>,
    pub leptons: Vec<LeptonCandidate>,
    pub met: Vec<MissingMomentum>,
}

/// Validated event: exactly two tagged jets, two light jets, one lepton, one MET.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventCandidates {
    pub id: u64,
    /// `[A, B]` in input order.
    pub tagged: [JetCandidate; 2],
    pub light: [JetCandidate; 2],
    pub lepton: LeptonCandidate,
    pub met: MissingMomentum,
}

/// Post-fit kinematics derived from the best-fit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostFitKinematics {
    pub hadronic_bjet: FourMomentum,
    pub leptonic_bjet: FourMomentum,
    pub light_jets: [FourMomentum; 2],
    pub neutrino: FourMomentum,
    pub hadronic_w_mass: f64,
    pub leptonic_w_mass: f64,
    pub hadronic_top_mass: f64,
    pub leptonic_top_mass: f64,
}

/// Everything the orchestrator reports for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFit {
    pub id: u64,
    pub decision: AssignmentDecision,
    pub prefit_hadronic_top_mass: f64,
    pub prefit_leptonic_top_mass: f64,
    pub initial_top_mass: f64,
    pub result: FitResult,
    pub post_fit: PostFitKinematics,
    /// Post-fit leptonic b-jet + lepton + *pre-fit* neutrino.
    pub leptonic_top_mass_prefit_neutrino: f64,
    /// Chosen pairing differs from the truth pairing (`None` without truth).
    pub disagrees_with_truth: Option<bool>,
    /// `(pt - truth_pt) / truth_pt` for the leptonic b-jet, before the fit.
    pub leptonic_bjet_resolution_prefit: Option<f64>,
    /// Same, after the fit.
    pub leptonic_bjet_resolution_postfit: Option<f64>,
}

impl EventFit {
    pub fn chi2(&self) -> f64 {
        self.result.chi2
    }

    pub fn top_mass(&self) -> f64 {
        self.result.params.get(5).copied().unwrap_or(f64::NAN)
    }
}

/// Run configuration as understood by the pipeline.
///
/// Derived from CLI flags (plus defaults). Physics constants are not part of it.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub minimizer: MinimizerConfig,
    /// Drop events whose resolver picks pairing 1.
    pub skip_swapped: bool,
    /// Fit events in parallel.
    pub parallel: bool,
    /// Number of worst-chi² events listed in the report.
    pub top_n: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            minimizer: MinimizerConfig::default(),
            skip_swapped: false,
            parallel: true,
            top_n: 10,
        }
    }
}

/// Minimizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerConfig {
    /// Initial step size, applied to every parameter.
    pub step: f64,
    pub max_iterations: usize,
    pub max_calls: usize,
    /// Convergence threshold on the estimated distance to minimum.
    pub edm_tolerance: f64,
    /// Objective increase that defines one standard deviation.
    pub error_def: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            step: 0.01,
            max_iterations: 1000,
            max_calls: 20_000,
            edm_tolerance: 1e-4,
            error_def: 1.0,
        }
    }
}
