//! Inference Engine
//!
//! Loads the persisted failure classifier, re-derives features with the same
//! extractor used in training and appends per-row predictions.

mod engine;

pub use engine::{
    InferenceEngine, InferenceResult, Prediction, PREDICTION_COLUMN, PROBABILITY_COLUMN,
};

use equipment_data::DataError;
use feature_engine::FeatureError;
use storage::StorageError;
use thiserror::Error;
use training_engine::TrainingError;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid prediction table: {0}")]
    Data(#[from] DataError),
}

impl From<TrainingError> for InferenceError {
    fn from(e: TrainingError) -> Self {
        match e {
            TrainingError::ShapeMismatch { expected, actual } => {
                InferenceError::InvalidInputShape { expected, actual }
            }
            other => InferenceError::InferenceFailed(other.to_string()),
        }
    }
}
