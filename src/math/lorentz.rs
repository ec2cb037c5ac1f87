//! Four-momentum arithmetic.
//!
//! Components are stored as `(px, py, pz, E)` in a nalgebra `Vector4`, so sums
//! are plain vector additions. Conventions follow the usual collider ones:
//!
//! - `pt = sqrt(px² + py²)`, `phi = atan2(py, px)`
//! - `eta = asinh(pz / pt)` (pseudorapidity)
//! - `mass` is signed: a space-like vector (`m² < 0`) reports `-sqrt(-m²)`

use std::iter::Sum;
use std::ops::Add;

use nalgebra::{Vector3, Vector4};

const PX: usize = 0;
const PY: usize = 1;
const PZ: usize = 2;
const E: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FourMomentum {
    p: Vector4<f64>,
}

impl FourMomentum {
    pub fn from_px_py_pz_e(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self {
            p: Vector4::new(px, py, pz, e),
        }
    }

    /// Build from detector coordinates.
    ///
    /// `pt` is taken by absolute value; the energy is `sqrt(p² + m²)`.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        Self::from_px_py_pz_m(px, py, pz, mass)
    }

    /// Build from a three-momentum and a rest mass.
    pub fn from_px_py_pz_m(px: f64, py: f64, pz: f64, mass: f64) -> Self {
        let p2 = px * px + py * py + pz * pz;
        let e = if mass >= 0.0 {
            (p2 + mass * mass).sqrt()
        } else {
            (p2 - mass * mass).max(0.0).sqrt()
        };
        Self::from_px_py_pz_e(px, py, pz, e)
    }

    pub fn zero() -> Self {
        Self { p: Vector4::zeros() }
    }

    pub fn px(&self) -> f64 {
        self.p[PX]
    }

    pub fn py(&self) -> f64 {
        self.p[PY]
    }

    pub fn pz(&self) -> f64 {
        self.p[PZ]
    }

    pub fn e(&self) -> f64 {
        self.p[E]
    }

    pub fn three_momentum(&self) -> Vector3<f64> {
        Vector3::new(self.px(), self.py(), self.pz())
    }

    /// Magnitude of the three-momentum.
    pub fn p(&self) -> f64 {
        self.three_momentum().norm()
    }

    pub fn pt(&self) -> f64 {
        self.px().hypot(self.py())
    }

    pub fn phi(&self) -> f64 {
        if self.px() == 0.0 && self.py() == 0.0 {
            0.0
        } else {
            self.py().atan2(self.px())
        }
    }

    /// Pseudorapidity. Purely longitudinal vectors map to `±inf` (and `0` at rest).
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt > 0.0 {
            (self.pz() / pt).asinh()
        } else if self.pz() > 0.0 {
            f64::INFINITY
        } else if self.pz() < 0.0 {
            f64::NEG_INFINITY
        } else {
            0.0
        }
    }

    /// Invariant mass squared, `E² - p²`.
    pub fn mass2(&self) -> f64 {
        let p = self.three_momentum();
        self.e() * self.e() - p.norm_squared()
    }

    /// Signed invariant mass.
    pub fn mass(&self) -> f64 {
        let m2 = self.mass2();
        if m2 < 0.0 { -(-m2).sqrt() } else { m2.sqrt() }
    }

    /// Velocity of this system's rest frame, `p / E`.
    pub fn boost_vector(&self) -> Vector3<f64> {
        self.three_momentum() / self.e()
    }

    /// Lorentz boost by velocity `beta` (`|beta| < 1`).
    pub fn boost(&self, beta: &Vector3<f64>) -> Self {
        let b2 = beta.norm_squared();
        if b2 == 0.0 {
            return *self;
        }
        let gamma = 1.0 / (1.0 - b2).sqrt();
        let p = self.three_momentum();
        let bp = beta.dot(&p);
        let gamma2 = (gamma - 1.0) / b2;

        let p_new = p + beta * (gamma2 * bp + gamma * self.e());
        let e_new = gamma * (self.e() + bp);
        Self::from_px_py_pz_e(p_new.x, p_new.y, p_new.z, e_new)
    }
}

impl Add for FourMomentum {
    type Output = FourMomentum;

    fn add(self, rhs: FourMomentum) -> FourMomentum {
        FourMomentum { p: self.p + rhs.p }
    }
}

impl Sum for FourMomentum {
    fn sum<I: Iterator<Item = FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::zero(), |acc, p| acc + p)
    }
}

impl<'a> Sum<&'a FourMomentum> for FourMomentum {
    fn sum<I: Iterator<Item = &'a FourMomentum>>(iter: I) -> Self {
        iter.fold(FourMomentum::zero(), |acc, p| acc + *p)
    }
}
