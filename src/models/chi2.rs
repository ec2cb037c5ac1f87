//! Chi-square objective for the semileptonic top-pair hypothesis.
//!
//! Parameters (see [`FitParameters`]):
//!
//! ```text
//! p[0] hadronic b-jet pT     p[3] light jet 2 pT
//! p[1] leptonic b-jet pT     p[4] neutrino pz
//! p[2] light jet 1 pT        p[5] common top mass
//! ```
//!
//! Jet directions and masses are fixed. The neutrino transverse momentum is not
//! a parameter: it is recomputed from transverse balance,
//!
//! ```text
//! p⃗T(ν) = -( Σ adjusted jets + lepton )T
//! ```
//!
//! and the neutrino is put on shell with zero mass.
//!
//! The resolution terms divide by the *adjusted* jet pT. A jet pT parameter
//! that is zero, negative or `NaN` has no physical meaning, and its resolution
//! term is `+inf`; a non-finite value tells the minimizer to back off.

use crate::domain::{
    BranchAssignment, EventCandidates, FitParameters, JET_RESOLUTION, JetCandidate, LeptonCandidate, N_PARAMS,
    PostFitKinematics, TOP_WIDTH, W_MASS, W_WIDTH,
};
use crate::math::FourMomentum;

/// Fixed, assignment-resolved inputs of one event's fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventContext {
    pub hadronic_bjet: JetCandidate,
    pub leptonic_bjet: JetCandidate,
    pub light_jets: [JetCandidate; 2],
    pub lepton: LeptonCandidate,
}

/// Individual penalty contributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chi2Terms {
    /// Resolution terms in parameter order (hadronic b, leptonic b, light 1, light 2).
    pub resolution: [f64; 4],
    pub leptonic_top: f64,
    pub hadronic_top: f64,
    pub leptonic_w: f64,
    pub hadronic_w: f64,
}

impl Chi2Terms {
    pub fn total(&self) -> f64 {
        self.resolution.iter().sum::<f64>()
            + self.leptonic_top
            + self.hadronic_top
            + self.leptonic_w
            + self.hadronic_w
    }
}

/// Four-momenta of the fit hypothesis at one parameter point.
#[derive(Debug, Clone, Copy)]
struct Hypothesis {
    hadronic_bjet: FourMomentum,
    leptonic_bjet: FourMomentum,
    light_jets: [FourMomentum; 2],
    neutrino: FourMomentum,
    lepton: FourMomentum,
}

impl Hypothesis {
    fn leptonic_w(&self) -> FourMomentum {
        self.lepton + self.neutrino
    }

    fn leptonic_top(&self) -> FourMomentum {
        self.leptonic_w() + self.leptonic_bjet
    }

    fn hadronic_w(&self) -> FourMomentum {
        self.light_jets[0] + self.light_jets[1]
    }

    fn hadronic_top(&self) -> FourMomentum {
        self.hadronic_w() + self.hadronic_bjet
    }
}

impl EventContext {
    /// Context for a resolved branch assignment.
    pub fn new(
        hadronic_bjet: JetCandidate,
        leptonic_bjet: JetCandidate,
        light_jets: [JetCandidate; 2],
        lepton: LeptonCandidate,
    ) -> Self {
        Self {
            hadronic_bjet,
            leptonic_bjet,
            light_jets,
            lepton,
        }
    }

    pub fn from_candidates(event: &EventCandidates, assignment: BranchAssignment) -> Self {
        let (hadronic, leptonic) = assignment.split(&event.tagged);
        Self::new(hadronic, leptonic, event.light, event.lepton)
    }

    /// Starting point: measured pT values, zero neutrino pz, the given top mass.
    pub fn initial_parameters(&self, top_mass: f64) -> FitParameters {
        FitParameters {
            hadronic_bjet_pt: self.hadronic_bjet.pt,
            leptonic_bjet_pt: self.leptonic_bjet.pt,
            light_jet0_pt: self.light_jets[0].pt,
            light_jet1_pt: self.light_jets[1].pt,
            neutrino_pz: 0.0,
            top_mass,
        }
    }

    fn hypothesis(&self, p: &[f64; N_PARAMS]) -> Hypothesis {
        let hadronic_bjet = self.hadronic_bjet.momentum_with_pt(p[0]);
        let leptonic_bjet = self.leptonic_bjet.momentum_with_pt(p[1]);
        let light0 = self.light_jets[0].momentum_with_pt(p[2]);
        let light1 = self.light_jets[1].momentum_with_pt(p[3]);
        let lepton = self.lepton.momentum();

        let nu_px = -(hadronic_bjet.px() + leptonic_bjet.px() + light0.px() + light1.px() + lepton.px());
        let nu_py = -(hadronic_bjet.py() + leptonic_bjet.py() + light0.py() + light1.py() + lepton.py());
        let nu_pz = p[4];
        let nu_e = (nu_px * nu_px + nu_py * nu_py + nu_pz * nu_pz).sqrt();
        let neutrino = FourMomentum::from_px_py_pz_e(nu_px, nu_py, nu_pz, nu_e);

        Hypothesis {
            hadronic_bjet,
            leptonic_bjet,
            light_jets: [light0, light1],
            neutrino,
            lepton,
        }
    }

    /// Per-term breakdown of the objective.
    pub fn terms(&self, p: &[f64; N_PARAMS]) -> Chi2Terms {
        let h = self.hypothesis(p);
        let top_mass = p[5];

        let measured = [
            self.hadronic_bjet.pt,
            self.leptonic_bjet.pt,
            self.light_jets[0].pt,
            self.light_jets[1].pt,
        ];
        let adjusted = [
            h.hadronic_bjet.pt(),
            h.leptonic_bjet.pt(),
            h.light_jets[0].pt(),
            h.light_jets[1].pt(),
        ];
        let mut resolution = [f64::INFINITY; 4];
        for i in 0..4 {
            if p[i] > 0.0 {
                resolution[i] = pull(adjusted[i], measured[i], JET_RESOLUTION * adjusted[i]);
            }
        }

        Chi2Terms {
            resolution,
            leptonic_top: pull(h.leptonic_top().mass(), top_mass, TOP_WIDTH),
            hadronic_top: pull(h.hadronic_top().mass(), top_mass, TOP_WIDTH),
            leptonic_w: pull(h.leptonic_w().mass(), W_MASS, W_WIDTH),
            hadronic_w: pull(h.hadronic_w().mass(), W_MASS, W_WIDTH),
        }
    }

    /// The objective value. Never panics; `inf` unless every jet pT parameter is positive.
    pub fn chi2(&self, p: &[f64; N_PARAMS]) -> f64 {
        self.terms(p).total()
    }

    /// Objective over a parameter slice, for the minimizer.
    ///
    /// Slices shorter than six parameters evaluate to `NaN`.
    pub fn chi2_slice(&self, p: &[f64]) -> f64 {
        match FitParameters::from_slice(p) {
            Some(params) => self.chi2(&params.to_array()),
            None => f64::NAN,
        }
    }

    /// Pure closure over this context, `parameters → χ²`.
    pub fn objective(&self) -> impl Fn(&[f64]) -> f64 + '_ {
        move |p| self.chi2_slice(p)
    }

    /// Full post-fit kinematics at `p`.
    pub fn kinematics(&self, p: &[f64; N_PARAMS]) -> PostFitKinematics {
        let h = self.hypothesis(p);
        PostFitKinematics {
            hadronic_bjet: h.hadronic_bjet,
            leptonic_bjet: h.leptonic_bjet,
            light_jets: h.light_jets,
            neutrino: h.neutrino,
            hadronic_w_mass: h.hadronic_w().mass(),
            leptonic_w_mass: h.leptonic_w().mass(),
            hadronic_top_mass: h.hadronic_top().mass(),
            leptonic_top_mass: h.leptonic_top().mass(),
        }
    }
}

/// `((observed - expected) / scale)²`
fn pull(observed: f64, expected: f64, scale: f64) -> f64 {
    let r = (observed - expected) / scale;
    r * r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JetCandidate, LeptonCandidate};

    fn context() -> EventContext {
        EventContext::new(
            JetCandidate::tagged(60.0, -0.3, 1.0),
            JetCandidate::tagged(50.0, 0.1, 0.2),
            [
                JetCandidate::light(40.0, 0.5, -1.0),
                JetCandidate::light(35.0, 0.2, 2.0),
            ],
            LeptonCandidate::new(45.0, 0.0, 0.5),
        )
    }

    #[test]
    fn objective_is_finite_and_non_negative_for_positive_pts() {
        let ctx = context();
        let grid = [1.0, 10.0, 45.0, 120.0];
        for &a in &grid {
            for &b in &grid {
                for &pz in &[-200.0, 0.0, 75.0] {
                    for &mt in &[0.0, 172.5, 400.0] {
                        let v = ctx.chi2(&[a, b, 40.0 - a / 4.0, 35.0, pz, mt]);
                        assert!(v.is_finite(), "chi2 not finite at a={a} b={b} pz={pz} mt={mt}");
                        assert!(v >= 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn resolution_terms_vanish_at_measured_pts() {
        let ctx = context();
        let p = ctx.initial_parameters(172.5).to_array();
        let terms = ctx.terms(&p);
        for r in terms.resolution {
            assert!(r.abs() < 1e-20, "resolution term {r} should vanish");
        }
        // Only mass terms remain and none of them vanishes for this event.
        let mass_only = terms.leptonic_top + terms.hadronic_top + terms.leptonic_w + terms.hadronic_w;
        assert!((ctx.chi2(&p) - mass_only).abs() < 1e-9 * mass_only.max(1.0));
        assert!(terms.hadronic_w > 0.0 && terms.leptonic_w > 0.0);
        assert!(terms.hadronic_top > 0.0 || terms.leptonic_top > 0.0);
    }

    #[test]
    fn resolution_term_divides_by_adjusted_pt() {
        let ctx = context();
        let mut p = ctx.initial_parameters(172.5).to_array();
        p[2] = 80.0;
        let terms = ctx.terms(&p);
        // (80 - 40) / (0.2 * 80) = 2.5
        assert!((terms.resolution[2] - 6.25).abs() < 1e-9);
    }

    #[test]
    fn neutrino_balances_transverse_momentum() {
        let ctx = context();
        let p = [55.0, 47.0, 42.0, 33.0, 20.0, 170.0];
        let k = ctx.kinematics(&p);
        let lepton = ctx.lepton.momentum();
        let total = k.hadronic_bjet + k.leptonic_bjet + k.light_jets[0] + k.light_jets[1] + lepton + k.neutrino;
        assert!(total.px().abs() < 1e-9);
        assert!(total.py().abs() < 1e-9);
        assert!((k.neutrino.pz() - 20.0).abs() < 1e-12);
        assert!(k.neutrino.mass2().abs() < 1e-6);
    }

    #[test]
    fn top_terms_vanish_only_when_mass_parameter_matches_both_tops() {
        let ctx = context();
        let mut p = ctx.initial_parameters(0.0).to_array();
        let k = ctx.kinematics(&p);
        p[5] = k.hadronic_top_mass;
        let terms = ctx.terms(&p);
        assert!(terms.hadronic_top < 1e-18);
        assert!(terms.leptonic_top > 0.0);
    }

    #[test]
    fn zero_pt_is_non_finite_without_panicking() {
        let ctx = context();
        let mut p = ctx.initial_parameters(172.5).to_array();
        p[0] = 0.0;
        assert!(!ctx.chi2(&p).is_finite());
    }

    #[test]
    fn non_positive_jet_pt_is_non_finite() {
        let ctx = context();
        let p = [55.0, 47.0, 42.0, 33.0, 20.0, 170.0];
        assert!(ctx.chi2(&p).is_finite());
        for i in 0..4 {
            for bad in [-p[i], -1e-9, f64::NAN] {
                let mut q = p;
                q[i] = bad;
                let terms = ctx.terms(&q);
                assert_eq!(terms.resolution[i], f64::INFINITY, "parameter {i} = {bad}");
                assert!(!ctx.chi2(&q).is_finite());
            }
        }
        // Neutrino pz and the top mass may take any sign.
        let mut q = p;
        q[4] = -80.0;
        q[5] = -10.0;
        assert!(ctx.chi2(&q).is_finite());
    }

    #[test]
    fn objective_closure_matches_direct_evaluation() {
        let ctx = context();
        let p = [55.0, 47.0, 42.0, 33.0, 20.0, 170.0];
        let f = ctx.objective();
        assert_eq!(f(&p[..]), ctx.chi2(&p));
        assert!(f(&p[..3]).is_nan());
    }
}
