//! Covariance estimation from a numerically differentiated Hessian.
//!
//! Near a minimum a chi-square behaves like
//!
//! ```text
//! χ²(x) ≈ χ²_min + ½ (x - x̂)ᵀ H (x - x̂)
//! ```
//!
//! so the contour `χ² = χ²_min + UP` is reached at one standard deviation when
//! the covariance is `V = 2 · UP · H⁻¹`.
//!
//! Finite-difference Hessians are often slightly indefinite even at a genuine
//! minimum. We therefore try, in order:
//! - a plain Cholesky factorisation
//! - Cholesky with geometrically increasing diagonal damping
//! - an SVD pseudo-inverse with progressively looser tolerances

use nalgebra::{Cholesky, DMatrix};

use crate::domain::CovarianceQuality;

/// Number of damping escalations before falling back to SVD.
const MAX_DAMPING_ATTEMPTS: usize = 10;

/// Invert `hessian` into a covariance matrix scaled for error definition `up`.
///
/// Returns `None` if no strategy yields finite, positive variances.
pub fn covariance_from_hessian(
    hessian: &DMatrix<f64>,
    up: f64,
) -> Option<(DMatrix<f64>, CovarianceQuality)> {
    let n = hessian.nrows();
    if n == 0 || hessian.ncols() != n || hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let scale = 2.0 * up;
    let identity = DMatrix::<f64>::identity(n, n);

    if let Some(chol) = Cholesky::new(hessian.clone()) {
        let cov = chol.solve(&identity) * scale;
        if has_positive_variances(&cov) {
            return Some((cov, CovarianceQuality::Accurate));
        }
    }

    // Damping is scaled to the Hessian diagonal so it is unit-free.
    let diag_scale = (0..n)
        .map(|i| hessian[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let mut damped = hessian.clone();
    let mut damping = 0.0_f64;
    for _ in 0..MAX_DAMPING_ATTEMPTS {
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            damped[(i, i)] += next - damping;
        }
        damping = next;

        if let Some(chol) = Cholesky::new(damped.clone()) {
            let cov = chol.solve(&identity) * scale;
            if has_positive_variances(&cov) {
                return Some((cov, CovarianceQuality::Damped));
            }
        }
    }

    let svd = hessian.clone().svd(true, true);
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(pinv) = svd.clone().pseudo_inverse(tol) {
            let cov = pinv * scale;
            if has_positive_variances(&cov) {
                return Some((cov, CovarianceQuality::PseudoInverse));
            }
        }
    }

    None
}

/// Square roots of the covariance diagonal.
pub fn standard_errors(covariance: &DMatrix<f64>) -> Vec<f64> {
    (0..covariance.nrows())
        .map(|i| covariance[(i, i)].max(0.0).sqrt())
        .collect()
}

fn has_positive_variances(cov: &DMatrix<f64>) -> bool {
    cov.iter().all(|v| v.is_finite()) && (0..cov.nrows()).all(|i| cov[(i, i)] > 0.0)
}
