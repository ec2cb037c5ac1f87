//! Variable-metric minimizer with numerical derivatives.
//!
//! The objective is a black box `parameters → f64`. We:
//!
//! 1. move a non-finite starting point to the nearest finite one found by
//!    stepping single coordinates (then all of them) by growing multiples of
//!    the step size
//! 2. iterate quasi-Newton steps `d = -V g`, where `g` is a central-difference
//!    gradient and `V` an inverse-Hessian estimate seeded from numerical second
//!    derivatives and refined with BFGS updates
//! 3. accept a step only if the objective is finite and decreases enough
//!    (Armijo backtracking), so singular regions are never entered
//! 4. stop once the estimated distance to minimum `EDM = ½ gᵀ V g` is below
//!    tolerance, or a budget runs out
//! 5. estimate errors from a finite-difference Hessian at the optimum
//!
//! There are no parameter bounds.

use nalgebra::{DMatrix, DVector};

use crate::domain::{CovarianceQuality, FitResult, FitStatus, MinimizerConfig};
use crate::math::{covariance_from_hessian, standard_errors};

/// Sufficient-decrease constant of the line search.
const ARMIJO: f64 = 1e-4;
/// Maximum backtracking steps per line search.
const MAX_BACKTRACKS: usize = 40;
/// Doublings of the step size tried when escaping a non-finite start.
const MAX_ESCAPE_DOUBLINGS: usize = 24;
/// Inverse-curvature used when a numerical second derivative is unusable.
const FALLBACK_INVERSE_CURVATURE: f64 = 1.0;

/// Anything that maps a parameter vector to a scalar.
pub trait Objective {
    fn value(&self, params: &[f64]) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64,
{
    fn value(&self, params: &[f64]) -> f64 {
        self(params)
    }
}

/// Objective wrapper that counts evaluations.
struct Counted<'a, O: ?Sized> {
    objective: &'a O,
    calls: usize,
}

impl<O: Objective + ?Sized> Counted<'_, O> {
    fn eval(&mut self, x: &DVector<f64>) -> f64 {
        self.calls += 1;
        self.objective.value(x.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct Minimizer {
    config: MinimizerConfig,
}

impl Minimizer {
    /// Every parameter uses `config.step`.
    pub fn new(config: MinimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` starting from `initial`.
    ///
    /// Never panics on a misbehaving objective: non-finite regions are avoided and
    /// budget exhaustion is reported through [`FitStatus`].
    pub fn minimize<O: Objective + ?Sized>(&self, objective: &O, initial: &[f64]) -> FitResult {
        let n = initial.len();
        let steps = vec![self.config.step; n];
        let mut counted = Counted {
            objective,
            calls: 0,
        };

        let x0 = DVector::from_column_slice(initial);
        let f0 = counted.eval(&x0);
        let start = if f0.is_finite() {
            Some((x0, f0))
        } else {
            let escaped = escape_non_finite(&mut counted, &x0, &steps);
            if escaped.is_some() {
                tracing::debug!(calls = counted.calls, "moved non-finite start into a finite region");
            }
            escaped
        };

        let Some((mut x, mut f)) = start else {
            return FitResult {
                params: initial.to_vec(),
                errors: vec![f64::NAN; n],
                covariance: None,
                covariance_quality: CovarianceQuality::Unavailable,
                chi2: f0,
                edm: f64::NAN,
                iterations: 0,
                function_calls: counted.calls,
                status: FitStatus::NonFiniteStart,
            };
        };

        let (mut g, mut g2) = gradient(&mut counted, &x, f, &steps);
        let mut v = diagonal_metric(&g2);
        let mut metric_fresh = true;
        let mut edm = estimated_distance(&g, &v);
        let mut iterations = 0;

        let status = loop {
            if edm < self.config.edm_tolerance {
                break FitStatus::Converged;
            }
            if iterations >= self.config.max_iterations {
                break FitStatus::IterationLimit;
            }
            if counted.calls >= self.config.max_calls {
                break FitStatus::CallLimit;
            }
            iterations += 1;

            let mut d = -(&v * &g);
            let mut slope = g.dot(&d);
            if !(slope < 0.0) {
                v = diagonal_metric(&g2);
                metric_fresh = true;
                d = -(&v * &g);
                slope = g.dot(&d);
                if !(slope < 0.0) {
                    break FitStatus::LineSearchFailed;
                }
            }

            let Some((x_new, f_new)) = line_search(&mut counted, &x, f, &d, slope, self.config.max_calls) else {
                if counted.calls >= self.config.max_calls {
                    break FitStatus::CallLimit;
                }
                if metric_fresh {
                    break FitStatus::LineSearchFailed;
                }
                // The accumulated metric may be stale; retry once along the diagonal one.
                v = diagonal_metric(&g2);
                metric_fresh = true;
                edm = estimated_distance(&g, &v);
                continue;
            };

            let (g_new, g2_new) = gradient(&mut counted, &x_new, f_new, &steps);
            let s = &x_new - &x;
            let y = &g_new - &g;
            let sy = s.dot(&y);
            if sy.is_finite() && sy > 0.0 {
                v = bfgs_update(&v, &s, &y, sy);
                metric_fresh = false;
            } else {
                v = diagonal_metric(&g2_new);
                metric_fresh = true;
            }

            x = x_new;
            f = f_new;
            g = g_new;
            g2 = g2_new;
            edm = estimated_distance(&g, &v);
        };

        let hessian = numerical_hessian(&mut counted, &x, f, &steps);
        let (covariance, covariance_quality) = match covariance_from_hessian(&hessian, self.config.error_def) {
            Some((cov, CovarianceQuality::Accurate)) => (Some(cov), CovarianceQuality::Accurate),
            Some((cov, quality)) => {
                tracing::debug!(?quality, "hessian needed regularization at the optimum");
                (Some(cov), quality)
            }
            None => {
                let approx = &v * (2.0 * self.config.error_def);
                if (0..n).all(|i| approx[(i, i)].is_finite() && approx[(i, i)] > 0.0) {
                    tracing::warn!("hessian not invertible at the optimum; using variable-metric errors");
                    (Some(approx), CovarianceQuality::Approximate)
                } else {
                    tracing::warn!("no usable covariance at the optimum");
                    (None, CovarianceQuality::Unavailable)
                }
            }
        };
        let errors = covariance
            .as_ref()
            .map(standard_errors)
            .unwrap_or_else(|| vec![f64::NAN; n]);

        // Deterministic re-evaluation at the reported optimum.
        let chi2 = counted.eval(&x);

        FitResult {
            params: x.iter().copied().collect(),
            errors,
            covariance: covariance.map(|c| c.transpose().iter().copied().collect()),
            covariance_quality,
            chi2,
            edm,
            iterations,
            function_calls: counted.calls,
            status,
        }
    }
}

/// Step used for first derivatives.
fn gradient_step(x: f64, step: f64) -> f64 {
    (x.abs() * 1e-6).max(step * 1e-2)
}

/// Step used for the final Hessian.
fn hessian_step(x: f64, step: f64) -> f64 {
    (x.abs() * 1e-3).max(step)
}

/// Central-difference gradient and diagonal second derivatives.
///
/// If one side of a coordinate is non-finite the one-sided difference is used
/// and the second derivative is marked unusable (`NaN`).
fn gradient<O: Objective + ?Sized>(
    counted: &mut Counted<'_, O>,
    x: &DVector<f64>,
    fx: f64,
    steps: &[f64],
) -> (DVector<f64>, DVector<f64>) {
    let n = x.len();
    let mut g = DVector::zeros(n);
    let mut g2 = DVector::from_element(n, f64::NAN);

    for i in 0..n {
        let h = gradient_step(x[i], steps[i]);
        let mut xp = x.clone();
        xp[i] += h;
        let fp = counted.eval(&xp);
        let mut xm = x.clone();
        xm[i] -= h;
        let fm = counted.eval(&xm);

        match (fp.is_finite(), fm.is_finite()) {
            (true, true) => {
                g[i] = (fp - fm) / (2.0 * h);
                g2[i] = (fp - 2.0 * fx + fm) / (h * h);
            }
            (true, false) => g[i] = (fp - fx) / h,
            (false, true) => g[i] = (fx - fm) / h,
            (false, false) => {}
        }
    }

    (g, g2)
}

/// Diagonal inverse-Hessian from second derivatives.
fn diagonal_metric(g2: &DVector<f64>) -> DMatrix<f64> {
    let diag = g2.map(|c| {
        if c.is_finite() && c > 0.0 {
            1.0 / c
        } else {
            FALLBACK_INVERSE_CURVATURE
        }
    });
    DMatrix::from_diagonal(&diag)
}

fn estimated_distance(g: &DVector<f64>, v: &DMatrix<f64>) -> f64 {
    0.5 * g.dot(&(v * g))
}

/// BFGS update of the inverse Hessian:
/// `V⁺ = (I - ρ s yᵀ) V (I - ρ y sᵀ) + ρ s sᵀ`, `ρ = 1 / sᵀy`.
fn bfgs_update(v: &DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>, sy: f64) -> DMatrix<f64> {
    let n = s.len();
    let rho = 1.0 / sy;
    let a = DMatrix::<f64>::identity(n, n) - (s * y.transpose()) * rho;
    &a * v * a.transpose() + (s * s.transpose()) * rho
}

/// Backtracking line search along `d`. Non-finite trial values are rejected.
fn line_search<O: Objective + ?Sized>(
    counted: &mut Counted<'_, O>,
    x: &DVector<f64>,
    f: f64,
    d: &DVector<f64>,
    slope: f64,
    max_calls: usize,
) -> Option<(DVector<f64>, f64)> {
    let mut alpha = 1.0_f64;
    for _ in 0..MAX_BACKTRACKS {
        if counted.calls >= max_calls {
            return None;
        }
        let trial = x + d * alpha;
        let f_trial = counted.eval(&trial);
        if f_trial.is_finite() && f_trial <= f + ARMIJO * alpha * slope {
            return Some((trial, f_trial));
        }

        alpha = if f_trial.is_finite() {
            // Minimum of the parabola through f, slope and f_trial, kept in [0.1α, 0.5α].
            let denom = 2.0 * (f_trial - f - slope * alpha);
            let parabolic = if denom > 0.0 { -slope * alpha * alpha / denom } else { 0.5 * alpha };
            parabolic.clamp(0.1 * alpha, 0.5 * alpha)
        } else {
            0.5 * alpha
        };
    }
    None
}

/// Find a finite point near a non-finite start.
fn escape_non_finite<O: Objective + ?Sized>(
    counted: &mut Counted<'_, O>,
    x0: &DVector<f64>,
    steps: &[f64],
) -> Option<(DVector<f64>, f64)> {
    let n = x0.len();
    let step_vec = DVector::from_column_slice(steps);

    for k in 0..MAX_ESCAPE_DOUBLINGS {
        let scale = f64::powi(2.0, k as i32);
        for i in 0..n {
            for sign in [1.0, -1.0] {
                let mut x = x0.clone();
                x[i] += sign * scale * steps[i];
                let f = counted.eval(&x);
                if f.is_finite() {
                    return Some((x, f));
                }
            }
        }
        for sign in [1.0, -1.0] {
            let x = x0 + &step_vec * (sign * scale);
            let f = counted.eval(&x);
            if f.is_finite() {
                return Some((x, f));
            }
        }
    }
    None
}

fn eval_shifted<O: Objective + ?Sized>(counted: &mut Counted<'_, O>, x: &DVector<f64>, moves: &[(usize, f64)]) -> f64 {
    let mut xs = x.clone();
    for &(i, delta) in moves {
        xs[i] += delta;
    }
    counted.eval(&xs)
}

/// Finite-difference Hessian from function values.
fn numerical_hessian<O: Objective + ?Sized>(
    counted: &mut Counted<'_, O>,
    x: &DVector<f64>,
    fx: f64,
    steps: &[f64],
) -> DMatrix<f64> {
    let n = x.len();
    let h: Vec<f64> = (0..n).map(|i| hessian_step(x[i], steps[i])).collect();
    let mut hess = DMatrix::zeros(n, n);

    for i in 0..n {
        let fp = eval_shifted(counted, x, &[(i, h[i])]);
        let fm = eval_shifted(counted, x, &[(i, -h[i])]);
        hess[(i, i)] = (fp - 2.0 * fx + fm) / (h[i] * h[i]);
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let fpp = eval_shifted(counted, x, &[(i, h[i]), (j, h[j])]);
            let fpm = eval_shifted(counted, x, &[(i, h[i]), (j, -h[j])]);
            let fmp = eval_shifted(counted, x, &[(i, -h[i]), (j, h[j])]);
            let fmm = eval_shifted(counted, x, &[(i, -h[i]), (j, -h[j])]);
            let hij = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            hess[(i, j)] = hij;
            hess[(j, i)] = hij;
        }
    }

    hess
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(p: &[f64]) -> f64 {
        let (x, y) = (p[0], p[1]);
        (1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2)
    }

    #[test]
    fn quadratic_bowl_recovers_minimum_and_errors() {
        let f = |p: &[f64]| ((p[0] - 1.0) / 2.0).powi(2) + ((p[1] + 2.0) / 0.5).powi(2);
        let result = Minimizer::new(MinimizerConfig::default()).minimize(&f, &[10.0, 10.0]);

        assert_eq!(result.status, FitStatus::Converged);
        assert!((result.params[0] - 1.0).abs() < 1e-3);
        assert!((result.params[1] + 2.0).abs() < 1e-3);
        assert!((result.errors[0] - 2.0).abs() < 1e-3);
        assert!((result.errors[1] - 0.5).abs() < 1e-3);
        assert_eq!(result.covariance_quality, CovarianceQuality::Accurate);
        assert!(result.chi2 < 1e-4);
    }

    #[test]
    fn rosenbrock_valley_is_followed_to_the_minimum() {
        let config = MinimizerConfig {
            edm_tolerance: 1e-6,
            ..MinimizerConfig::default()
        };
        let result = Minimizer::new(config).minimize(&rosenbrock, &[-1.2, 1.0]);
        assert_eq!(result.status, FitStatus::Converged);
        assert!((result.params[0] - 1.0).abs() < 1e-2, "x = {}", result.params[0]);
        assert!((result.params[1] - 1.0).abs() < 2e-2, "y = {}", result.params[1]);
    }

    #[test]
    fn reported_value_matches_objective_at_reported_parameters() {
        let result = Minimizer::new(MinimizerConfig::default()).minimize(&rosenbrock, &[-1.2, 1.0]);
        assert_eq!(result.chi2, rosenbrock(&result.params));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let m = Minimizer::new(MinimizerConfig::default());
        let a = m.minimize(&rosenbrock, &[-1.2, 1.0]);
        let b = m.minimize(&rosenbrock, &[-1.2, 1.0]);
        assert_eq!(a.params, b.params);
        assert_eq!(a.chi2.to_bits(), b.chi2.to_bits());
        assert_eq!(a.function_calls, b.function_calls);
        assert_eq!(a.status, b.status);
    }

    #[test]
    fn call_budget_exhaustion_is_not_reported_as_success() {
        let config = MinimizerConfig {
            max_calls: 10,
            ..MinimizerConfig::default()
        };
        let result = Minimizer::new(config).minimize(&rosenbrock, &[-1.2, 1.0]);
        assert_eq!(result.status, FitStatus::CallLimit);
        assert!(result.chi2.is_finite());
    }

    #[test]
    fn iteration_budget_exhaustion_is_reported() {
        let config = MinimizerConfig {
            max_iterations: 1,
            ..MinimizerConfig::default()
        };
        let result = Minimizer::new(config).minimize(&rosenbrock, &[-1.2, 1.0]);
        assert_eq!(result.status, FitStatus::IterationLimit);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn singular_start_is_escaped_and_not_reported_as_optimum() {
        // Same shape as a jet resolution term: singular at zero.
        let f = |p: &[f64]| ((p[0] - 50.0) / (0.2 * p[0].abs())).powi(2);
        assert!(!f(&[0.0]).is_finite());

        let result = Minimizer::new(MinimizerConfig::default()).minimize(&f, &[0.0]);
        assert_eq!(result.status, FitStatus::Converged);
        assert!(result.chi2.is_finite());
        assert!((result.params[0] - 50.0).abs() < 0.5, "x = {}", result.params[0]);
    }

    #[test]
    fn objective_that_is_never_finite_reports_non_finite_start() {
        let f = |_: &[f64]| f64::NAN;
        let result = Minimizer::new(MinimizerConfig::default()).minimize(&f, &[1.0, 2.0]);
        assert_eq!(result.status, FitStatus::NonFiniteStart);
        assert_eq!(result.params, vec![1.0, 2.0]);
        assert_eq!(result.covariance_quality, CovarianceQuality::Unavailable);
    }
}
