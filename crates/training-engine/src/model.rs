//! Persisted Failure Classifier

use crate::evaluation::{evaluate, EvaluationReport};
use crate::grid::Candidate;
use crate::logistic::LogisticRegression;
use crate::scaler::StandardScaler;
use crate::scoring::HeldOutMetrics;
use crate::TrainingError;
use feature_engine::{FeatureConfig, FeatureMatrix};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Row-major feature matrix as an ndarray design matrix
pub(crate) fn design_matrix(inputs: &FeatureMatrix) -> Result<Array2<f64>, TrainingError> {
    Array2::from_shape_vec((inputs.n_rows, inputs.n_features()), inputs.values.clone()).map_err(
        |e| TrainingError::ShapeMismatch {
            expected: format!("{} x {}", inputs.n_rows, inputs.n_features()),
            actual: e.to_string(),
        },
    )
}

/// Scaler, coefficients and provenance of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    /// Model input columns, in order
    pub feature_names: Vec<String>,
    /// Window settings the features were extracted with
    pub feature_config: FeatureConfig,
    pub scaler: StandardScaler,
    pub coef: Vec<f64>,
    pub intercept: f64,
    /// Selected inverse regularisation strength
    pub c: f64,
    /// Winning grid configuration
    pub candidate: Candidate,
    /// Scores on the held-out split
    pub metrics: HeldOutMetrics,
}

impl FittedModel {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn classifier(&self) -> LogisticRegression {
        LogisticRegression {
            coef: Array1::from(self.coef.clone()),
            intercept: self.intercept,
            n_iter: 0,
            converged: true,
        }
    }

    fn scaled(&self, inputs: &FeatureMatrix) -> Result<Array2<f64>, TrainingError> {
        if inputs.names != self.feature_names {
            return Err(TrainingError::ShapeMismatch {
                expected: self.feature_names.join(","),
                actual: inputs.names.join(","),
            });
        }
        self.scaler.transform(design_matrix(inputs)?.view())
    }

    /// Probability of the positive class, per row
    pub fn predict_proba(&self, inputs: &FeatureMatrix) -> Result<Vec<f64>, TrainingError> {
        let x = self.scaled(inputs)?;
        Ok(self.classifier().predict_proba(x.view())?.to_vec())
    }

    /// Predicted label per row
    pub fn predict(&self, inputs: &FeatureMatrix) -> Result<Vec<u8>, TrainingError> {
        let x = self.scaled(inputs)?;
        self.classifier().predict(x.view())
    }

    /// Diagnostic report against known labels
    pub fn evaluate(
        &self,
        inputs: &FeatureMatrix,
        labels: &[u8],
    ) -> Result<EvaluationReport, TrainingError> {
        evaluate(labels, &self.predict_proba(inputs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistic::{ClassWeight, Solver};

    fn model() -> FittedModel {
        FittedModel {
            feature_names: vec!["a".into(), "b".into()],
            feature_config: FeatureConfig::default(),
            scaler: StandardScaler {
                mean: vec![1.0, 0.0],
                scale: vec![2.0, 1.0],
            },
            coef: vec![1.0, -1.0],
            intercept: 0.0,
            c: 1.0,
            candidate: Candidate {
                solver: Solver::Lbfgs,
                cs: 10,
                class_weight: ClassWeight::from_negative(0.25),
            },
            metrics: HeldOutMetrics::default(),
        }
    }

    fn inputs(names: &[&str], values: Vec<f64>) -> FeatureMatrix {
        FeatureMatrix {
            names: names.iter().map(|s| s.to_string()).collect(),
            n_rows: values.len() / names.len(),
            values,
        }
    }

    #[test]
    fn test_predict_applies_scaler() {
        let m = model();
        // Row 0: (5-1)/2 - 0 = 2 > 0; row 1: (1-1)/2 - 3 = -3 < 0
        let x = inputs(&["a", "b"], vec![5.0, 0.0, 1.0, 3.0]);
        assert_eq!(m.predict(&x).unwrap(), vec![1, 0]);

        let proba = m.predict_proba(&x).unwrap();
        assert!((proba[0] - 1.0 / (1.0 + (-2.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_feature_names_must_match() {
        let x = inputs(&["b", "a"], vec![0.0, 0.0]);
        assert!(matches!(
            model().predict(&x),
            Err(TrainingError::ShapeMismatch { .. })
        ));
    }
}
