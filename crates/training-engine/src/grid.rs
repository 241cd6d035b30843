//! Hyper-Parameter Grid Search
//!
//! Every candidate is a cross-validated logistic regression. Candidates are
//! scored by mean F1 over stratified outer folds; a fold that cannot be
//! fitted scores NaN and removes its candidate from the running.

use crate::cv::{complement, select, stratified_folds, LogisticRegressionCv};
use crate::logistic::{check_binary, ClassWeight, Solver};
use crate::scoring::f1_score;
use crate::TrainingError;
use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One point of the search grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub solver: Solver,
    /// Number of strengths searched by the inner cross-validation
    pub cs: usize,
    pub class_weight: ClassWeight,
}

impl Candidate {
    /// The estimator this candidate describes
    pub fn estimator(&self, folds: usize) -> LogisticRegressionCv {
        LogisticRegressionCv::new(self.cs)
            .with_solver(self.solver)
            .with_class_weight(self.class_weight)
            .with_folds(folds)
    }
}

/// Axes of the search grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub solvers: Vec<Solver>,
    pub cs: Vec<usize>,
    /// Weight `x` of class 0; class 1 gets `1 - x`
    pub negative_weights: Vec<f64>,
    /// Outer folds used to score candidates
    pub folds: usize,
    /// Inner folds of each candidate's own strength search
    pub inner_folds: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            solvers: vec![Solver::Newton, Solver::Lbfgs],
            cs: vec![1, 10, 100],
            negative_weights: vec![0.0, 0.25, 0.5, 0.75],
            folds: 2,
            inner_folds: 2,
        }
    }
}

impl GridConfig {
    /// Candidates in evaluation order: `cs` varies slowest, then class weight, then solver
    pub fn candidates(&self) -> Vec<Candidate> {
        let mut out =
            Vec::with_capacity(self.cs.len() * self.negative_weights.len() * self.solvers.len());
        for &cs in &self.cs {
            for &x in &self.negative_weights {
                for &solver in &self.solvers {
                    out.push(Candidate {
                        solver,
                        cs,
                        class_weight: ClassWeight::from_negative(x),
                    });
                }
            }
        }
        out
    }
}

/// Fold scores of one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub candidate: Candidate,
    pub fold_scores: Vec<f64>,
    /// NaN when any fold failed
    pub mean: f64,
}

/// Outcome of a grid search
#[derive(Debug, Clone)]
pub struct GridResult {
    pub best: Candidate,
    pub best_score: f64,
    pub scores: Vec<CandidateScore>,
}

pub struct GridSearch {
    config: GridConfig,
}

impl GridSearch {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    fn score(
        &self,
        candidate: &Candidate,
        x: ArrayView2<f64>,
        y: &[u8],
        folds: &[Vec<usize>],
    ) -> CandidateScore {
        let estimator = candidate.estimator(self.config.inner_folds);
        let fold_scores: Vec<f64> = folds
            .iter()
            .map(|test| {
                let train = complement(y.len(), test);
                let y_train = select(y, &train);
                let y_test = select(y, test);
                let fitted = estimator
                    .fit(x.select(Axis(0), &train).view(), &y_train)
                    .and_then(|fit| fit.model.predict(x.select(Axis(0), test).view()));
                match fitted {
                    Ok(predicted) => f1_score(&y_test, &predicted),
                    Err(e) => {
                        debug!("Candidate {:?} failed on a fold: {}", candidate, e);
                        f64::NAN
                    }
                }
            })
            .collect();

        let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        CandidateScore {
            candidate: *candidate,
            fold_scores,
            mean,
        }
    }

    /// Score every candidate and return the first with the highest mean F1
    pub fn fit(&self, x: ArrayView2<f64>, y: &[u8]) -> Result<GridResult, TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        check_binary(y)?;

        let folds = stratified_folds(y, self.config.folds);
        let candidates = self.config.candidates();
        info!(
            "Grid search over {} candidates with {} folds",
            candidates.len(),
            folds.len()
        );

        let scores: Vec<CandidateScore> = candidates
            .iter()
            .map(|c| self.score(c, x, y, &folds))
            .collect();

        let failed = scores.iter().filter(|s| s.mean.is_nan()).count();
        if failed > 0 {
            warn!("{} of {} grid candidates failed to fit", failed, scores.len());
        }

        let best = scores
            .iter()
            .filter(|s| !s.mean.is_nan())
            .fold(None::<&CandidateScore>, |best, s| match best {
                Some(b) if b.mean >= s.mean => Some(b),
                _ => Some(s),
            })
            .ok_or(TrainingError::NoValidCandidate)?;

        info!(
            solver = %best.candidate.solver,
            cs = best.candidate.cs,
            negative_weight = best.candidate.class_weight.negative,
            "Best grid candidate with F1 {:.4}",
            best.mean
        );

        Ok(GridResult {
            best: best.candidate,
            best_score: best.mean,
            scores,
        })
    }
}

impl Default for GridSearch {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}
