//! Training Run
//!
//! Labelled rows → seeded split → scaling → baseline CV fit → grid search →
//! refit of the winner → held-out scores.

use crate::cv::{CvFit, LogisticRegressionCv};
use crate::grid::{GridConfig, GridResult, GridSearch};
use crate::model::{design_matrix, FittedModel};
use crate::scaler::StandardScaler;
use crate::scoring::{ConfusionMatrix, HeldOutMetrics};
use crate::split::{train_test_split, Split};
use crate::TrainingError;
use feature_engine::FeatureTable;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Training run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub test_fraction: f64,
    /// Strengths searched by the baseline model
    pub baseline_cs: usize,
    /// Folds of every cross-validated fit
    pub cv_folds: usize,
    pub grid: GridConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            baseline_cs: 10,
            cv_folds: 2,
            grid: GridConfig::default(),
        }
    }
}

/// Everything a training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: FittedModel,
    pub baseline: CvFit,
    pub grid: GridResult,
    /// Feature-table row of each labelled row
    pub labelled_rows: Vec<usize>,
    /// Indices into the labelled rows
    pub split: Split,
    /// Rows dropped for lacking a label
    pub n_dropped: usize,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit and evaluate the failure classifier
    pub fn train(&self, features: &FeatureTable) -> Result<TrainingOutcome, TrainingError> {
        let inputs = features.model_inputs()?;
        let labelled: Vec<(usize, u8)> = features
            .labels()?
            .into_iter()
            .enumerate()
            .filter_map(|(row, label)| label.map(|l| (row, l)))
            .collect();
        let n_dropped = inputs.n_rows - labelled.len();
        if n_dropped > 0 {
            info!("Dropping {} rows without a label", n_dropped);
        }

        let rows: Vec<usize> = labelled.iter().map(|(row, _)| *row).collect();
        let y: Vec<u8> = labelled.iter().map(|(_, label)| *label).collect();
        let x = design_matrix(&inputs)?.select(Axis(0), &rows);

        let split = train_test_split(y.len(), self.config.test_fraction, self.config.seed)?;
        let y_train: Vec<u8> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| y[i]).collect();
        let (scaler, x_train) = StandardScaler::fit_transform(x.select(Axis(0), &split.train).view())?;
        let x_test = scaler.transform(x.select(Axis(0), &split.test).view())?;
        info!(
            "Training on {} rows, holding out {}",
            y_train.len(),
            y_test.len()
        );

        let baseline = LogisticRegressionCv::new(self.config.baseline_cs)
            .with_folds(self.config.cv_folds)
            .fit(x_train.view(), &y_train)?;
        info!("Baseline model selected C={:.4e}", baseline.c);

        let grid = GridSearch::new(self.config.grid.clone()).fit(x_train.view(), &y_train)?;

        let fit = grid
            .best
            .estimator(self.config.cv_folds)
            .fit(x_train.view(), &y_train)?;
        if !fit.model.converged {
            warn!("Final model did not converge; scores may be unstable");
        }

        let predicted = fit.model.predict(x_test.view())?;
        let metrics =
            HeldOutMetrics::from_confusion(ConfusionMatrix::from_predictions(&y_test, &predicted));
        metrics.report();

        let model = FittedModel {
            feature_names: inputs.names.clone(),
            feature_config: features.config().clone(),
            scaler,
            coef: fit.model.coef.to_vec(),
            intercept: fit.model.intercept,
            c: fit.c,
            candidate: grid.best,
            metrics,
        };

        Ok(TrainingOutcome {
            model,
            baseline,
            grid,
            labelled_rows: rows,
            split,
            n_dropped,
        })
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}
