//! Synthetic semileptonic top-pair events.
//!
//! Per event:
//! - two tops with Gaussian transverse momentum (back to back in the transverse
//!   plane) and independent Gaussian pz
//! - Breit-Wigner (Cauchy, truncated at `MASS_WINDOW` widths) top and W masses
//! - `t → W b` and `W → q q'` / `W → l ν` as isotropic two-body decays in the
//!   parent rest frame, boosted to the lab
//! - Gaussian fractional pT smearing of jets and the lepton
//! - MET = -(visible reconstructed pT) + Gaussian unclustered noise
//!
//! The first top decays hadronically, the second leptonically. Tagged jets are
//! emitted in random order with the truth flag on the leptonic one.

use std::f64::consts::PI;

use nalgebra::Vector3;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Cauchy, Normal};

use crate::domain::{
    EventRecord, JetRecord, LEPTON_MASS, LIGHT_JET_MASS, LeptonCandidate, MissingMomentum, TAGGED_JET_MASS,
    TAGGED_LABEL, TOP_WIDTH, W_MASS, W_WIDTH,
};
use crate::error::{AppError, EXIT_NUMERIC};
use crate::math::FourMomentum;

/// Breit-Wigner truncation, in widths around the pole.
const MASS_WINDOW: f64 = 5.0;
/// Attempts per truncated Breit-Wigner draw before falling back to the pole.
const MAX_DRAWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub events: usize,
    pub seed: u64,
    /// Generated top pole mass (GeV).
    pub top_mass: f64,
    /// Fractional jet pT resolution.
    pub jet_smearing: f64,
    /// Fractional lepton pT resolution.
    pub lepton_smearing: f64,
    /// Per-component unclustered MET noise (GeV).
    pub met_noise: f64,
    /// Width of each top's transverse momentum components (GeV).
    pub top_pt_sigma: f64,
    /// Width of each top's longitudinal momentum (GeV).
    pub top_pz_sigma: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            events: 1000,
            seed: 42,
            top_mass: 172.5,
            jet_smearing: 0.1,
            lepton_smearing: 0.01,
            met_noise: 10.0,
            top_pt_sigma: 60.0,
            top_pz_sigma: 200.0,
        }
    }
}

impl SampleConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.events == 0 {
            return Err(AppError::usage("Event count must be > 0."));
        }
        let non_negative = [
            self.jet_smearing,
            self.lepton_smearing,
            self.met_noise,
            self.top_pt_sigma,
            self.top_pz_sigma,
        ];
        if non_negative.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(AppError::usage("Smearing and momentum widths must be finite and >= 0."));
        }
        let lightest_top = self.top_mass - MASS_WINDOW * TOP_WIDTH;
        let heaviest_w = W_MASS + MASS_WINDOW * W_WIDTH;
        if !(self.top_mass.is_finite() && lightest_top > heaviest_w + TAGGED_JET_MASS) {
            return Err(AppError::usage(format!(
                "Top mass {} GeV is too light for t -> W b (needs > {:.2} GeV).",
                self.top_mass,
                heaviest_w + TAGGED_JET_MASS + MASS_WINDOW * TOP_WIDTH
            )));
        }
        Ok(())
    }
}

/// Generate `config.events` events. Identical config gives identical events.
pub fn generate_sample(config: &SampleConfig) -> Result<Vec<EventRecord>, AppError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let dists = Distributions::new(config)?;

    let events: Vec<EventRecord> = (0..config.events)
        .map(|i| generate_event(i as u64 + 1, config, &dists, &mut rng))
        .collect();

    tracing::info!(events = events.len(), seed = config.seed, "generated toy events");
    Ok(events)
}

struct Distributions {
    unit: Normal<f64>,
    top_mass: Cauchy<f64>,
    w_mass: Cauchy<f64>,
}

impl Distributions {
    fn new(config: &SampleConfig) -> Result<Self, AppError> {
        let err = |e: rand_distr::NormalError| AppError::new(EXIT_NUMERIC, format!("Noise distribution error: {e}"));
        let cauchy_err =
            |e: rand_distr::CauchyError| AppError::new(EXIT_NUMERIC, format!("Mass distribution error: {e}"));
        Ok(Self {
            unit: Normal::new(0.0, 1.0).map_err(err)?,
            // Cauchy scale is the half width at half maximum.
            top_mass: Cauchy::new(config.top_mass, 0.5 * TOP_WIDTH).map_err(cauchy_err)?,
            w_mass: Cauchy::new(W_MASS, 0.5 * W_WIDTH).map_err(cauchy_err)?,
        })
    }

    fn gauss(&self, rng: &mut StdRng, sigma: f64) -> f64 {
        sigma * self.unit.sample(rng)
    }
}

/// Truncated Breit-Wigner draw.
fn draw_mass(dist: &Cauchy<f64>, pole: f64, width: f64, rng: &mut StdRng) -> f64 {
    for _ in 0..MAX_DRAWS {
        let m = dist.sample(rng);
        if (m - pole).abs() <= MASS_WINDOW * width {
            return m;
        }
    }
    pole
}

/// Isotropic two-body decay of `parent` into daughters of mass `m1`, `m2`.
fn two_body_decay(parent: &FourMomentum, m1: f64, m2: f64, rng: &mut StdRng) -> (FourMomentum, FourMomentum) {
    let m = parent.mass();
    let p_star = ((m * m - (m1 + m2).powi(2)) * (m * m - (m1 - m2).powi(2))).max(0.0).sqrt() / (2.0 * m);

    let cos_theta: f64 = rng.gen_range(-1.0..=1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi: f64 = rng.gen_range(0.0..2.0 * PI);
    let dir = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

    let beta = parent.boost_vector();
    let d1 = FourMomentum::from_px_py_pz_m(p_star * dir.x, p_star * dir.y, p_star * dir.z, m1).boost(&beta);
    let d2 = FourMomentum::from_px_py_pz_m(-p_star * dir.x, -p_star * dir.y, -p_star * dir.z, m2).boost(&beta);
    (d1, d2)
}

/// A non-positive smeared value keeps the true pT.
fn smeared_pt(pt: f64, fraction: f64, dists: &Distributions, rng: &mut StdRng) -> f64 {
    let smeared = pt * (1.0 + dists.gauss(rng, fraction));
    if smeared > 0.0 { smeared } else { pt }
}

fn generate_event(id: u64, config: &SampleConfig, dists: &Distributions, rng: &mut StdRng) -> EventRecord {
    // Top pair, back to back in the transverse plane.
    let px = dists.gauss(rng, config.top_pt_sigma);
    let py = dists.gauss(rng, config.top_pt_sigma);
    let m_had = draw_mass(&dists.top_mass, config.top_mass, TOP_WIDTH, rng);
    let m_lep = draw_mass(&dists.top_mass, config.top_mass, TOP_WIDTH, rng);
    let pz_had = dists.gauss(rng, config.top_pz_sigma);
    let pz_lep = dists.gauss(rng, config.top_pz_sigma);
    let top_had = FourMomentum::from_px_py_pz_m(px, py, pz_had, m_had);
    let top_lep = FourMomentum::from_px_py_pz_m(-px, -py, pz_lep, m_lep);

    // Hadronic branch.
    let w_had_mass = draw_mass(&dists.w_mass, W_MASS, W_WIDTH, rng);
    let (w_had, b_had) = two_body_decay(&top_had, w_had_mass, TAGGED_JET_MASS, rng);
    let (q1, q2) = two_body_decay(&w_had, LIGHT_JET_MASS, LIGHT_JET_MASS, rng);

    // Leptonic branch.
    let w_lep_mass = draw_mass(&dists.w_mass, W_MASS, W_WIDTH, rng);
    let (w_lep, b_lep) = two_body_decay(&top_lep, w_lep_mass, TAGGED_JET_MASS, rng);
    let (lepton, _neutrino) = two_body_decay(&w_lep, LEPTON_MASS, 0.0, rng);

    let reco_jet = |truth: &FourMomentum, label: i32, leptonic: Option<bool>, rng: &mut StdRng| JetRecord {
        pt: smeared_pt(truth.pt(), config.jet_smearing, dists, rng),
        eta: truth.eta(),
        phi: truth.phi(),
        label,
        truth_leptonic: leptonic,
        truth_pt: Some(truth.pt()),
    };

    let mut tagged = [
        reco_jet(&b_had, TAGGED_LABEL, Some(false), rng),
        reco_jet(&b_lep, TAGGED_LABEL, Some(true), rng),
    ];
    if rng.gen_bool(0.5) {
        tagged.swap(0, 1);
    }
    let light = [reco_jet(&q1, 0, None, rng), reco_jet(&q2, 0, None, rng)];

    let lepton = LeptonCandidate::new(
        smeared_pt(lepton.pt(), config.lepton_smearing, dists, rng),
        lepton.eta(),
        lepton.phi(),
    );

    let jets: Vec<JetRecord> = tagged.into_iter().chain(light).collect();
    let visible: FourMomentum = jets
        .iter()
        .map(|j| FourMomentum::from_pt_eta_phi_m(j.pt, j.eta, j.phi, 0.0))
        .chain(std::iter::once(lepton.momentum()))
        .sum();
    let met_x = -visible.px() + dists.gauss(rng, config.met_noise);
    let met_y = -visible.py() + dists.gauss(rng, config.met_noise);

    EventRecord {
        id,
        jets,
        leptons: vec![lepton],
        met: vec![MissingMomentum::new(met_x.hypot(met_y), met_y.atan2(met_x))],
    }
}
