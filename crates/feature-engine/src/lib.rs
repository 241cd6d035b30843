//! Feature Engineering Engine
//!
//! Derives the feature table (label, rolling and grouped aggregates, quantile
//! flags) from raw equipment readings. Shared by training and inference.

mod features;
mod statistics;

pub use features::{
    columns, verge_of_failing, FeatureConfig, FeatureExtractor, FeatureMatrix, FeatureTable,
    HISTORY_FEATURES, LABEL_COLUMN, MODEL_FEATURES,
};
pub use statistics::Rolling;

use equipment_data::DataError;
use thiserror::Error;

/// Errors during feature extraction
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Invalid equipment table: {0}")]
    Data(#[from] DataError),
    #[error("Table has no continuous (float) sensor columns")]
    NoContinuousVariables,
    #[error("Feature {feature} is missing at row {row}")]
    MissingValue { feature: String, row: usize },
}
