//! Cross-Validated Regularisation Search

use crate::logistic::{check_binary, ClassWeight, LogisticConfig, LogisticRegression, Solver};
use crate::scoring::accuracy_score;
use crate::TrainingError;
use ndarray::{ArrayView2, Axis};
use tracing::debug;

/// `n` values evenly spaced on a log10 scale from `10^start` to `10^stop`
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(start)],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| 10f64.powf(start + step * i as f64))
                .collect()
        }
    }
}

/// Test-row indices per fold, without shuffling.
///
/// Fold `f` takes the class mix of every `k`-th entry (from `f`) of the
/// label-sorted rows. Each class then fills the folds in row order, so a
/// fold holds a contiguous run of every class.
pub fn stratified_folds(y: &[u8], k: usize) -> Vec<Vec<usize>> {
    let k = k.max(1);
    let n_negative = y.iter().filter(|&&label| label != 1).count();
    let per_fold = |n: usize, fold: usize| (n + k - 1).saturating_sub(fold) / k;

    // Rows of each class per fold
    let allocation: Vec<[usize; 2]> = (0..k)
        .map(|fold| {
            let negatives = per_fold(n_negative, fold);
            [negatives, per_fold(y.len(), fold) - negatives]
        })
        .collect();

    let mut folds = vec![Vec::new(); k];
    let mut fold_of = [0usize; 2];
    let mut filled = [0usize; 2];
    for (row, &label) in y.iter().enumerate() {
        let class = usize::from(label == 1);
        while fold_of[class] < k && filled[class] == allocation[fold_of[class]][class] {
            fold_of[class] += 1;
            filled[class] = 0;
        }
        folds[fold_of[class].min(k - 1)].push(row);
        filled[class] += 1;
    }
    folds
}

/// Rows not in `test`
pub(crate) fn complement(n_rows: usize, test: &[usize]) -> Vec<usize> {
    let mut in_test = vec![false; n_rows];
    for &i in test {
        in_test[i] = true;
    }
    (0..n_rows).filter(|&i| !in_test[i]).collect()
}

pub(crate) fn select(y: &[u8], rows: &[usize]) -> Vec<u8> {
    rows.iter().map(|&i| y[i]).collect()
}

/// Logistic regression whose `C` is chosen by stratified k-fold accuracy,
/// then refit on every row.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegressionCv {
    /// Candidate inverse regularisation strengths
    pub cs: Vec<f64>,
    pub solver: Solver,
    pub class_weight: ClassWeight,
    pub folds: usize,
    pub max_iter: usize,
    pub tol: f64,
}

/// Result of a cross-validated fit
#[derive(Debug, Clone)]
pub struct CvFit {
    pub model: LogisticRegression,
    /// Selected inverse regularisation strength
    pub c: f64,
    /// Mean fold accuracy per entry of `cs`
    pub scores: Vec<f64>,
}

impl LogisticRegressionCv {
    /// Search `n_cs` strengths on `logspace(-4, 4, n_cs)`
    pub fn new(n_cs: usize) -> Self {
        Self {
            cs: logspace(-4.0, 4.0, n_cs),
            solver: Solver::Newton,
            class_weight: ClassWeight::uniform(),
            folds: 2,
            max_iter: 100,
            tol: 1e-4,
        }
    }

    pub fn with_solver(mut self, solver: Solver) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    fn config(&self, c: f64) -> LogisticConfig {
        LogisticConfig {
            c,
            solver: self.solver,
            class_weight: self.class_weight,
            max_iter: self.max_iter,
            tol: self.tol,
        }
    }

    pub fn fit(&self, x: ArrayView2<f64>, y: &[u8]) -> Result<CvFit, TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        check_binary(y)?;
        if self.cs.is_empty() {
            return Err(TrainingError::EmptySplit(
                "no regularisation strengths to search".to_string(),
            ));
        }

        let folds = stratified_folds(y, self.folds);
        let mut totals = vec![0.0; self.cs.len()];
        for test in &folds {
            let train = complement(y.len(), test);
            let x_train = x.select(Axis(0), &train);
            let y_train = select(y, &train);
            let x_test = x.select(Axis(0), test);
            let y_test = select(y, test);

            for (total, &c) in totals.iter_mut().zip(&self.cs) {
                let model = LogisticRegression::fit(x_train.view(), &y_train, &self.config(c))?;
                let predicted = model.predict(x_test.view())?;
                *total += accuracy_score(&y_test, &predicted);
            }
        }

        let scores: Vec<f64> = totals.iter().map(|t| t / folds.len() as f64).collect();
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        let c = self.cs[best];
        debug!(
            "{} CV picked C={:.4e} (accuracy {:.4})",
            self.solver, c, scores[best]
        );

        let model = LogisticRegression::fit(x, y, &self.config(c))?;
        Ok(CvFit { model, c, scores })
    }
}

impl Default for LogisticRegressionCv {
    fn default() -> Self {
        Self::new(10)
    }
}
