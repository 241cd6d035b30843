//! Training Engine
//!
//! Fits the failure classifier: seeded train/test split, standard scaling,
//! L2 logistic regression with cross-validated regularisation, a grid search
//! over solver, strength grid and class weight, and held-out evaluation.

mod cv;
mod evaluation;
mod grid;
mod logistic;
mod model;
mod scaler;
mod scoring;
mod split;
mod trainer;

pub use cv::{logspace, stratified_folds, CvFit, LogisticRegressionCv};
pub use evaluation::{auc, evaluate, roc_curve, EvaluationReport, ProbabilityHistogram, RocCurve};
pub use grid::{Candidate, CandidateScore, GridConfig, GridResult, GridSearch};
pub use logistic::{ClassWeight, LogisticConfig, LogisticRegression, Solver};
pub use model::FittedModel;
pub use scaler::StandardScaler;
pub use scoring::{accuracy_score, f1_score, ConfusionMatrix, HeldOutMetrics};
pub use split::{train_test_split, Split};
pub use trainer::{Trainer, TrainingConfig, TrainingOutcome};

use feature_engine::FeatureError;
use thiserror::Error;

/// Errors during model training
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Training data contains only class {0}")]
    SingleClass(u8),
    #[error("Label {0} is not binary")]
    InvalidLabel(f64),
    #[error("Not enough rows: {0}")]
    EmptySplit(String),
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },
    #[error("No grid candidate produced a valid score")]
    NoValidCandidate,
    #[error("A binary class problem is required, found {0} classes")]
    NotBinary(usize),
    #[error("Numerical failure: {0}")]
    Numerical(String),
}
