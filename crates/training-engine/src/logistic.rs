//! L2-Regularised Binary Logistic Regression
//!
//! Minimises `0.5 * ||w||^2 + C * sum_i s_i * logloss(y_i, x_i . w + b)`,
//! where `s_i` is the class weight of row `i`. Two solvers are provided:
//!
//! - `Newton`: full Newton steps with backtracking; the intercept is
//!   penalised like any other coefficient.
//! - `Lbfgs`: limited-memory BFGS with Armijo backtracking; the intercept
//!   is left unpenalised.
//!
//! Non-convergence within `max_iter` is logged, not an error.

use crate::TrainingError;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Optimisation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    #[serde(alias = "liblinear")]
    Newton,
    Lbfgs,
}

impl Solver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Solver::Newton => "newton",
            Solver::Lbfgs => "lbfgs",
        }
    }

    /// Whether the intercept is part of the L2 penalty
    pub fn penalizes_intercept(&self) -> bool {
        matches!(self, Solver::Newton)
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Solver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newton" | "liblinear" => Ok(Solver::Newton),
            "lbfgs" => Ok(Solver::Lbfgs),
            other => Err(format!("unknown solver: {}", other)),
        }
    }
}

/// Per-class sample weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeight {
    pub negative: f64,
    pub positive: f64,
}

impl ClassWeight {
    /// Every row weighs 1
    pub fn uniform() -> Self {
        Self {
            negative: 1.0,
            positive: 1.0,
        }
    }

    /// `{0: x, 1: 1 - x}`
    pub fn from_negative(x: f64) -> Self {
        Self {
            negative: x,
            positive: 1.0 - x,
        }
    }

    pub fn weight(&self, label: u8) -> f64 {
        if label == 1 {
            self.positive
        } else {
            self.negative
        }
    }
}

impl Default for ClassWeight {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Fit parameters for a single regularisation strength
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Inverse regularisation strength
    pub c: f64,
    pub solver: Solver,
    pub class_weight: ClassWeight,
    pub max_iter: usize,
    /// Stop when the largest gradient component falls below this
    pub tol: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            solver: Solver::Newton,
            class_weight: ClassWeight::uniform(),
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

/// Fitted binary logistic regression
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    pub coef: Array1<f64>,
    pub intercept: f64,
    pub n_iter: usize,
    pub converged: bool,
}

/// Labels must be 0/1 and both classes present
pub(crate) fn check_binary(y: &[u8]) -> Result<(), TrainingError> {
    if let Some(bad) = y.iter().find(|&&v| v > 1) {
        return Err(TrainingError::InvalidLabel(*bad as f64));
    }
    let positives = y.iter().filter(|&&v| v == 1).count();
    if y.is_empty() {
        return Err(TrainingError::EmptySplit("no training rows".to_string()));
    }
    if positives == 0 {
        return Err(TrainingError::SingleClass(0));
    }
    if positives == y.len() {
        return Err(TrainingError::SingleClass(1));
    }
    Ok(())
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Regularised weighted log-loss over `[x | 1]`
struct Objective {
    design: Array2<f64>,
    y: Array1<f64>,
    sample_weight: Array1<f64>,
    penalty: Array1<f64>,
    c: f64,
}

impl Objective {
    fn new(x: ArrayView2<f64>, y: &[u8], config: &LogisticConfig) -> Self {
        let (n, d) = x.dim();
        let mut design = Array2::<f64>::ones((n, d + 1));
        design.slice_mut(s![.., ..d]).assign(&x);

        let mut penalty = Array1::<f64>::ones(d + 1);
        if !config.solver.penalizes_intercept() {
            penalty[d] = 0.0;
        }

        Self {
            design,
            y: y.iter().map(|&v| v as f64).collect(),
            sample_weight: y.iter().map(|&v| config.class_weight.weight(v)).collect(),
            penalty,
            c: config.c,
        }
    }

    fn n_params(&self) -> usize {
        self.design.ncols()
    }

    fn value(&self, theta: &Array1<f64>) -> f64 {
        let z = self.design.dot(theta);
        let loss: f64 = z
            .iter()
            .zip(&self.y)
            .zip(&self.sample_weight)
            .map(|((z, y), s)| s * (softplus(*z) - y * z))
            .sum();
        let reg: f64 = theta
            .iter()
            .zip(&self.penalty)
            .map(|(t, p)| p * t * t)
            .sum();
        0.5 * reg + self.c * loss
    }

    fn gradient(&self, theta: &Array1<f64>) -> Array1<f64> {
        let z = self.design.dot(theta);
        let residual: Array1<f64> = z
            .iter()
            .zip(&self.y)
            .zip(&self.sample_weight)
            .map(|((z, y), s)| s * (sigmoid(*z) - y))
            .collect();
        &self.penalty * theta + &(self.design.t().dot(&residual) * self.c)
    }

    fn hessian(&self, theta: &Array1<f64>) -> Array2<f64> {
        let z = self.design.dot(theta);
        let curvature: Array1<f64> = z
            .iter()
            .zip(&self.sample_weight)
            .map(|(z, s)| {
                let p = sigmoid(*z);
                self.c * s * p * (1.0 - p)
            })
            .collect();
        let weighted = &self.design * &curvature.view().insert_axis(Axis(1));
        let mut h = self.design.t().dot(&weighted);
        for (i, p) in self.penalty.iter().enumerate() {
            h[[i, i]] += p;
        }
        h
    }
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, TrainingError> {
    let n = b.len();
    let mut b = b.clone();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(TrainingError::Numerical(format!(
                "singular Hessian at column {}",
                col
            )));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-12;
const LBFGS_MEMORY: usize = 10;

struct Solution {
    theta: Array1<f64>,
    n_iter: usize,
    converged: bool,
}

fn newton(obj: &Objective, config: &LogisticConfig) -> Result<Solution, TrainingError> {
    let mut theta = Array1::<f64>::zeros(obj.n_params());
    let mut f = obj.value(&theta);

    for iter in 0..config.max_iter {
        let g = obj.gradient(&theta);
        if max_abs(&g) <= config.tol {
            return Ok(Solution {
                theta,
                n_iter: iter,
                converged: true,
            });
        }

        let step = solve(obj.hessian(&theta), &g)?;
        let decrease = g.dot(&step);
        let mut t = 1.0;
        loop {
            let candidate = &theta - &(&step * t);
            let fc = obj.value(&candidate);
            if fc <= f - ARMIJO * t * decrease {
                theta = candidate;
                f = fc;
                break;
            }
            t *= 0.5;
            if t < MIN_STEP {
                debug!("Newton line search stalled at iteration {}", iter);
                return Ok(Solution {
                    theta,
                    n_iter: iter,
                    converged: false,
                });
            }
        }
    }

    let converged = max_abs(&obj.gradient(&theta)) <= config.tol;
    Ok(Solution {
        theta,
        n_iter: config.max_iter,
        converged,
    })
}

fn lbfgs(obj: &Objective, config: &LogisticConfig) -> Solution {
    let mut theta = Array1::<f64>::zeros(obj.n_params());
    let mut f = obj.value(&theta);
    let mut g = obj.gradient(&theta);
    // (s, y, 1 / s.y)
    let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> =
        VecDeque::with_capacity(LBFGS_MEMORY);

    for iter in 0..config.max_iter {
        if max_abs(&g) <= config.tol {
            return Solution {
                theta,
                n_iter: iter,
                converged: true,
            };
        }

        // Two-loop recursion
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y, rho) in history.iter().rev() {
            let a = rho * s.dot(&q);
            q.scaled_add(-a, y);
            alphas.push(a);
        }
        let gamma = history
            .back()
            .map(|(s, y, _)| s.dot(y) / y.dot(y))
            .unwrap_or(1.0);
        let mut r = q * gamma;
        for ((s, y, rho), a) in history.iter().zip(alphas.iter().rev()) {
            let b = rho * y.dot(&r);
            r.scaled_add(a - b, s);
        }

        let mut direction = -r;
        let mut slope = g.dot(&direction);
        if slope >= 0.0 {
            direction = -&g;
            slope = -g.dot(&g);
            history.clear();
        }

        let mut t = if history.is_empty() {
            (1.0 / max_abs(&g)).min(1.0)
        } else {
            1.0
        };
        let (candidate, fc) = loop {
            let candidate = &theta + &(&direction * t);
            let fc = obj.value(&candidate);
            if fc <= f + ARMIJO * t * slope {
                break (candidate, fc);
            }
            t *= 0.5;
            if t < MIN_STEP {
                debug!("L-BFGS line search stalled at iteration {}", iter);
                return Solution {
                    theta,
                    n_iter: iter,
                    converged: false,
                };
            }
        };

        let g_new = obj.gradient(&candidate);
        let s = &candidate - &theta;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > 1e-10 {
            if history.len() == LBFGS_MEMORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        theta = candidate;
        f = fc;
        g = g_new;
    }

    let converged = max_abs(&g) <= config.tol;
    Solution {
        theta,
        n_iter: config.max_iter,
        converged,
    }
}

impl LogisticRegression {
    /// Fit on a scaled design matrix and 0/1 labels
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[u8],
        config: &LogisticConfig,
    ) -> Result<Self, TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        check_binary(y)?;

        let obj = Objective::new(x, y, config);
        let solution = match config.solver {
            Solver::Newton => newton(&obj, config)?,
            Solver::Lbfgs => lbfgs(&obj, config),
        };

        if !solution.converged {
            warn!(
                "{} solver did not converge in {} iterations (C={})",
                config.solver, solution.n_iter, config.c
            );
        }

        let d = x.ncols();
        let theta = solution.theta;
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(TrainingError::Numerical(
                "non-finite coefficients".to_string(),
            ));
        }

        Ok(Self {
            coef: theta.slice(s![..d]).to_owned(),
            intercept: theta[d],
            n_iter: solution.n_iter,
            converged: solution.converged,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    /// Signed distance to the decision boundary, per row
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, TrainingError> {
        if x.ncols() != self.n_features() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(&self.coef) + self.intercept)
    }

    /// Probability of the positive class, per row
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, TrainingError> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }

    /// Class labels, 1 where the decision value is positive
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<u8>, TrainingError> {
        Ok(self
            .decision_function(x)?
            .iter()
            .map(|&z| u8::from(z > 0.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Vec<u8>) {
        let x = array![
            [-2.0, -1.0],
            [-1.5, -0.5],
            [-1.0, -1.5],
            [-0.5, -0.2],
            [0.5, 0.2],
            [1.0, 1.5],
            [1.5, 0.5],
            [2.0, 1.0]
        ];
        (x, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn test_both_solvers_separate() {
        let (x, y) = separable();
        for solver in [Solver::Newton, Solver::Lbfgs] {
            let config = LogisticConfig {
                solver,
                ..Default::default()
            };
            let model = LogisticRegression::fit(x.view(), &y, &config).unwrap();
            assert!(model.converged, "{} did not converge", solver);
            assert_eq!(model.predict(x.view()).unwrap(), y, "{} misclassified", solver);
            assert!(model.coef.iter().all(|c| *c > 0.0));
        }
    }

    #[test]
    fn test_solvers_agree_without_intercept_signal() {
        // Symmetric data: optimum intercept is 0 for both penalties
        let (x, y) = separable();
        let newton = LogisticRegression::fit(x.view(), &y, &LogisticConfig::default()).unwrap();
        let lbfgs = LogisticRegression::fit(
            x.view(),
            &y,
            &LogisticConfig {
                solver: Solver::Lbfgs,
                tol: 1e-8,
                max_iter: 500,
                ..Default::default()
            },
        )
        .unwrap();
        for (a, b) in newton.coef.iter().zip(&lbfgs.coef) {
            assert!((a - b).abs() < 0.05, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_stronger_penalty_shrinks_coefficients() {
        let (x, y) = separable();
        let weak = LogisticRegression::fit(x.view(), &y, &LogisticConfig::default()).unwrap();
        let strong = LogisticRegression::fit(
            x.view(),
            &y,
            &LogisticConfig {
                c: 1e-4,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(strong.coef.dot(&strong.coef) < weak.coef.dot(&weak.coef));
    }

    #[test]
    fn test_class_weight_shifts_predictions() {
        let (x, y) = separable();
        let config = LogisticConfig {
            class_weight: ClassWeight::from_negative(0.0),
            ..Default::default()
        };
        let model = LogisticRegression::fit(x.view(), &y, &config).unwrap();
        // Only positives carry weight, so the intercept leans positive
        assert!(model.intercept > 0.0);
        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba.iter().skip(4).all(|p| *p > 0.5));
    }

    #[test]
    fn test_single_class_rejected() {
        let x = array![[1.0], [2.0]];
        assert!(matches!(
            LogisticRegression::fit(x.view(), &[1, 1], &LogisticConfig::default()),
            Err(TrainingError::SingleClass(1))
        ));
        assert!(matches!(
            LogisticRegression::fit(x.view(), &[0, 2], &LogisticConfig::default()),
            Err(TrainingError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_solver_names() {
        assert_eq!("liblinear".parse::<Solver>().unwrap(), Solver::Newton);
        assert_eq!(Solver::Lbfgs.to_string(), "lbfgs");
        assert!("sag".parse::<Solver>().is_err());
    }

    #[test]
    fn test_solve_linear_system() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(a, &b).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }
}
