//! Bounded nonlinear least squares for a two-Gaussian mixture.
//!
//! The model is `a1*exp(-(x-m1)^2/(2 s1^2)) + a2*exp(-(x-m2)^2/(2 s2^2))`,
//! fitted with Levenberg-Marquardt steps projected onto box bounds. The fit
//! never errors: every way it can go wrong is reported as a [`FitFailure`].

/// One Gaussian component of the mixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianMode {
    pub mean: f64,
    pub std: f64,
    pub amplitude: f64,
}

impl GaussianMode {
    pub fn new(mean: f64, std: f64, amplitude: f64) -> Self {
        Self { mean, std, amplitude }
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.amplitude * (-(x - self.mean).powi(2) / (2.0 * self.std * self.std)).exp()
    }

    fn to_params(self) -> [f64; 3] {
        [self.mean, self.std, self.amplitude]
    }

    fn from_params(p: &[f64]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Box constraints shared by both modes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitBounds {
    pub mean: (f64, f64),
    pub std: (f64, f64),
    pub amplitude: (f64, f64),
}

impl Default for FitBounds {
    fn default() -> Self {
        Self {
            mean: (-30.0, 5.0),
            std: (1e-10, 5.0),
            amplitude: (0.0, 1.0),
        }
    }
}

impl FitBounds {
    fn lower(&self) -> [f64; 6] {
        [self.mean.0, self.std.0, self.amplitude.0, self.mean.0, self.std.0, self.amplitude.0]
    }

    fn upper(&self) -> [f64; 6] {
        [self.mean.1, self.std.1, self.amplitude.1, self.mean.1, self.std.1, self.amplitude.1]
    }
}

/// Why a mixture fit was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitFailure {
    /// Sample has no spread to fit
    DegenerateSample,
    /// Observations contain NaN or infinity
    NonFiniteData,
    /// Initial guess lies outside the bounds
    InfeasibleStart,
    /// Normal equations could not be solved at any damping
    SingularSystem,
    /// Evaluation budget exhausted before convergence
    MaxEvaluations,
}

/// Result of fitting the mixture; modes are ordered by ascending mean
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Converged { first: GaussianMode, second: GaussianMode },
    Failed(FitFailure),
}

impl FitOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, FitOutcome::Converged { .. })
    }
}

const FTOL: f64 = 1e-8;
const XTOL: f64 = 1e-8;
const GTOL: f64 = 1e-8;
const MAX_EVALUATIONS: usize = 600;
const MAX_DAMPING: f64 = 1e16;

fn model(p: &[f64; 6], x: f64) -> f64 {
    GaussianMode::from_params(&p[..3]).eval(x) + GaussianMode::from_params(&p[3..]).eval(x)
}

fn residuals(p: &[f64; 6], x: &[f64], y: &[f64]) -> Vec<f64> {
    x.iter().zip(y).map(|(&xi, &yi)| model(p, xi) - yi).collect()
}

fn cost(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

/// Analytic Jacobian row for one abscissa
fn jacobian_row(p: &[f64; 6], x: f64) -> [f64; 6] {
    let mut row = [0.0; 6];
    for k in 0..2 {
        let (m, s, a) = (p[3 * k], p[3 * k + 1], p[3 * k + 2]);
        let d = x - m;
        let e = (-d * d / (2.0 * s * s)).exp();
        row[3 * k] = a * e * d / (s * s);
        row[3 * k + 1] = a * e * d * d / (s * s * s);
        row[3 * k + 2] = e;
    }
    row
}

/// Solve a 6x6 system by Gaussian elimination with partial pivoting
fn solve6(mut a: [[f64; 6]; 6], mut b: [f64; 6]) -> Option<[f64; 6]> {
    for col in 0..6 {
        let pivot = (col..6).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..6 {
            let factor = a[row][col] / a[col][col];
            for k in col..6 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 6];
    for row in (0..6).rev() {
        let tail: f64 = (row + 1..6).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Fit the two-Gaussian mixture to `(x, y)` starting from `initial`.
pub fn fit_bimodal(
    x: &[f64],
    y: &[f64],
    initial: (GaussianMode, GaussianMode),
    bounds: &FitBounds,
) -> FitOutcome {
    if x.len() != y.len() || x.len() < 6 || y.iter().chain(x).any(|v| !v.is_finite()) {
        return FitOutcome::Failed(FitFailure::NonFiniteData);
    }

    let lower = bounds.lower();
    let upper = bounds.upper();
    let mut p = [0.0; 6];
    p[..3].copy_from_slice(&initial.0.to_params());
    p[3..].copy_from_slice(&initial.1.to_params());
    if p.iter().zip(lower.iter().zip(&upper)).any(|(v, (lo, hi))| !(v >= lo && v <= hi)) {
        return FitOutcome::Failed(FitFailure::InfeasibleStart);
    }

    let mut r = residuals(&p, x, y);
    let mut current_cost = cost(&r);
    let mut evaluations = 1;
    let mut damping = 1e-3;

    loop {
        // normal equations J^T J and gradient J^T r
        let mut jtj = [[0.0; 6]; 6];
        let mut grad = [0.0; 6];
        for (&xi, &ri) in x.iter().zip(&r) {
            let row = jacobian_row(&p, xi);
            for i in 0..6 {
                grad[i] += row[i] * ri;
                for j in 0..6 {
                    jtj[i][j] += row[i] * row[j];
                }
            }
        }

        if grad.iter().fold(0.0f64, |m, g| m.max(g.abs())) < GTOL {
            break;
        }

        let mut stepped = false;
        while damping <= MAX_DAMPING {
            if evaluations >= MAX_EVALUATIONS {
                return FitOutcome::Failed(FitFailure::MaxEvaluations);
            }

            let mut system = jtj;
            for (i, row) in system.iter_mut().enumerate() {
                row[i] += damping * jtj[i][i].max(1e-12);
            }
            let rhs = grad.map(|g| -g);
            let Some(delta) = solve6(system, rhs) else {
                damping *= 10.0;
                continue;
            };

            let mut trial = p;
            for i in 0..6 {
                trial[i] = (p[i] + delta[i]).clamp(lower[i], upper[i]);
            }
            let trial_r = residuals(&trial, x, y);
            let trial_cost = cost(&trial_r);
            evaluations += 1;

            let step: Vec<f64> = trial.iter().zip(&p).map(|(a, b)| a - b).collect();
            let step_norm = norm(&step);

            if trial_cost.is_finite() && trial_cost < current_cost {
                let reduction = current_cost - trial_cost;
                let small_step = step_norm <= XTOL * (XTOL + norm(&p));
                p = trial;
                r = trial_r;
                let converged = reduction <= FTOL * current_cost || small_step;
                current_cost = trial_cost;
                damping = (damping / 10.0).max(1e-12);
                stepped = true;
                if converged {
                    return converged_outcome(&p);
                }
                break;
            }

            if step_norm <= XTOL * (XTOL + norm(&p)) {
                // no representable improvement left
                return converged_outcome(&p);
            }
            damping *= 10.0;
        }

        if !stepped {
            return if current_cost.is_finite() {
                converged_outcome(&p)
            } else {
                FitOutcome::Failed(FitFailure::SingularSystem)
            };
        }
    }

    converged_outcome(&p)
}

fn converged_outcome(p: &[f64; 6]) -> FitOutcome {
    if p.iter().any(|v| !v.is_finite()) {
        return FitOutcome::Failed(FitFailure::NonFiniteData);
    }
    let a = GaussianMode::from_params(&p[..3]);
    let b = GaussianMode::from_params(&p[3..]);
    let (first, second) = if a.mean > b.mean { (b, a) } else { (a, b) };
    FitOutcome::Converged { first, second }
}
