//! Inference Engine Implementation

use crate::InferenceError;
use equipment_data::{Column, Table};
use feature_engine::{FeatureExtractor, FeatureTable};
use serde::{Deserialize, Serialize};
use storage::{read_artifact, read_table, write_parquet, ArtifactStore};
use tracing::{debug, info};
use training_engine::FittedModel;

/// Predicted label column appended to the feature table
pub const PREDICTION_COLUMN: &str = "PRED";
/// Positive-class probability column appended to the feature table
pub const PROBABILITY_COLUMN: &str = "PRED_PROBA";

/// Prediction for one reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// 1 when the equipment is on the verge of failing
    pub label: u8,
    /// Probability of the positive class (0.0 to 1.0)
    pub probability: f64,
}

/// Result of a batch inference run
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Feature table with the prediction columns appended
    pub table: Table,
    pub predictions: Vec<Prediction>,
    /// Inference latency in milliseconds
    pub latency_ms: u64,
}

impl InferenceResult {
    pub fn n_positive(&self) -> usize {
        self.predictions.iter().filter(|p| p.label == 1).count()
    }
}

/// Applies a fitted model to equipment readings
pub struct InferenceEngine {
    /// Storage path of the model artifact
    model_path: String,
    model: Option<FittedModel>,
}

impl InferenceEngine {
    /// Create an engine for the model stored at `model_path`
    pub fn new(model_path: &str) -> Self {
        info!("Creating inference engine with model: {}", model_path);
        Self {
            model_path: model_path.to_string(),
            model: None,
        }
    }

    /// Create an engine around an in-memory model
    pub fn from_model(model: FittedModel) -> Self {
        Self {
            model_path: "memory".to_string(),
            model: Some(model),
        }
    }

    /// Load the model artifact
    pub fn load(&mut self, store: &dyn ArtifactStore) -> Result<(), InferenceError> {
        let model: FittedModel = read_artifact(store, &self.model_path).map_err(|e| {
            InferenceError::ModelLoadError(format!("{}: {}", self.model_path, e))
        })?;
        info!(
            "Model loaded successfully ({} features, solver {}, C={:.4e})",
            model.n_features(),
            model.candidate.solver,
            model.c
        );
        self.model = Some(model);
        Ok(())
    }

    fn model(&self) -> Result<&FittedModel, InferenceError> {
        self.model
            .as_ref()
            .ok_or_else(|| InferenceError::ModelLoadError("Model not loaded".to_string()))
    }

    /// Predict every row of an extracted feature table
    pub fn predict(&self, features: &FeatureTable) -> Result<Vec<Prediction>, InferenceError> {
        let model = self.model()?;
        let inputs = features.model_inputs()?;
        if inputs.names != model.feature_names {
            return Err(InferenceError::InvalidInputShape {
                expected: model.feature_names.join(","),
                actual: inputs.names.join(","),
            });
        }

        let labels = model.predict(&inputs)?;
        let probabilities = model.predict_proba(&inputs)?;
        Ok(labels
            .into_iter()
            .zip(probabilities)
            .map(|(label, probability)| Prediction { label, probability })
            .collect())
    }

    /// Extract features from raw readings and append the prediction columns
    pub fn run(&self, raw: &Table) -> Result<InferenceResult, InferenceError> {
        let start = std::time::Instant::now();
        let model = self.model()?;

        let features = FeatureExtractor::new(model.feature_config.clone()).extract(raw)?;
        let predictions = self.predict(&features)?;

        let mut table = features.into_table();
        table.insert(Column::int(
            PREDICTION_COLUMN,
            predictions.iter().map(|p| p.label as i64).collect(),
        ))?;
        table.insert(Column::float(
            PROBABILITY_COLUMN,
            predictions.iter().map(|p| p.probability).collect(),
        ))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let result = InferenceResult {
            table,
            predictions,
            latency_ms,
        };
        debug!("Inference completed in {}ms", latency_ms);
        metrics::counter!("predictions_total").increment(result.predictions.len() as u64);
        metrics::gauge!("predictions_positive").set(result.n_positive() as f64);
        Ok(result)
    }

    /// Read raw readings, predict and write the augmented table as parquet
    pub fn run_batch(
        &self,
        store: &dyn ArtifactStore,
        input_path: &str,
        output_path: &str,
    ) -> Result<InferenceResult, InferenceError> {
        let raw = read_table(store, input_path)?;
        let result = self.run(&raw)?;
        write_parquet(store, output_path, &result.table)?;
        info!(
            "Predicted {} rows ({} on the verge of failing) into {}",
            result.predictions.len(),
            result.n_positive(),
            output_path
        );
        Ok(result)
    }

    /// Check if a model is loaded
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Get model path
    pub fn model_path(&self) -> &str {
        &self.model_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use equipment_data::{ColumnData, FAIL_COLUMN, PRESET_1_COLUMN, PRESET_2_COLUMN};
    use feature_engine::{columns, FeatureConfig, MODEL_FEATURES};
    use storage::{write_artifact, OpendalStore};
    use training_engine::{
        Candidate, ClassWeight, HeldOutMetrics, Solver, StandardScaler, Trainer,
    };

    const MODEL_PATH: &str = "abfs://acct/testing/refined/project1/models/model.bin";

    fn readings(n: usize, fail_rows: &[usize]) -> Table {
        let stressed = |i: usize| fail_rows.iter().any(|&f| i == f || i + 1 == f);
        Table::from_columns(vec![
            Column::int(PRESET_1_COLUMN, (0..n).map(|i| (i % 2) as i64 + 1).collect()),
            Column::int(PRESET_2_COLUMN, (0..n).map(|i| (i % 3) as i64 + 1).collect()),
            Column::float(
                "Temperature",
                (0..n)
                    .map(|i| 40.0 + (i % 5) as f64 * 0.5 + if stressed(i) { 15.0 } else { 0.0 })
                    .collect(),
            ),
            Column::float(
                "Pressure",
                (0..n)
                    .map(|i| 100.0 + (i % 3) as f64 + if stressed(i) { 10.0 } else { 0.0 })
                    .collect(),
            ),
            Column::bool(FAIL_COLUMN, (0..n).map(|i| fail_rows.contains(&i)).collect()),
        ])
        .unwrap()
    }

    /// Flags rows whose sensor sum exceeds 150
    fn threshold_model() -> FittedModel {
        let n = MODEL_FEATURES.len();
        let mut coef = vec![0.0; n];
        coef[0] = 1.0;
        FittedModel {
            feature_names: MODEL_FEATURES.iter().map(|s| s.to_string()).collect(),
            feature_config: FeatureConfig::default(),
            scaler: StandardScaler {
                mean: vec![150.0; n],
                scale: vec![1.0; n],
            },
            coef,
            intercept: 0.0,
            c: 1.0,
            candidate: Candidate {
                solver: Solver::Newton,
                cs: 1,
                class_weight: ClassWeight::uniform(),
            },
            metrics: HeldOutMetrics::default(),
        }
    }

    #[test]
    fn test_run_appends_predictions() {
        let engine = InferenceEngine::from_model(threshold_model());
        let result = engine.run(&readings(10, &[4])).unwrap();

        let sums = result.table.require(columns::SUM).unwrap().as_float().unwrap();
        let pred = result.table.require(PREDICTION_COLUMN).unwrap().as_int().unwrap();
        for (sum, label) in sums.iter().zip(pred) {
            assert_eq!(*label, i64::from(*sum > 150.0));
        }
        // Rows 3 and 4 carry the spike
        assert_eq!(result.n_positive(), 2);
        assert!(result.table.column(PROBABILITY_COLUMN).is_some());
    }

    #[test]
    fn test_unloaded_engine() {
        let engine = InferenceEngine::new(MODEL_PATH);
        assert!(!engine.is_loaded());
        assert!(matches!(
            engine.run(&readings(5, &[])),
            Err(InferenceError::ModelLoadError(_))
        ));
    }

    #[test]
    fn test_feature_schema_mismatch() {
        let mut model = threshold_model();
        model.feature_names.reverse();
        let engine = InferenceEngine::from_model(model);
        assert!(matches!(
            engine.run(&readings(5, &[])),
            Err(InferenceError::InvalidInputShape { .. })
        ));
    }

    #[test]
    fn test_missing_model_artifact() {
        let store = OpendalStore::memory().unwrap();
        let mut engine = InferenceEngine::new(MODEL_PATH);
        assert!(matches!(
            engine.load(&store),
            Err(InferenceError::ModelLoadError(_))
        ));
    }

    #[test]
    fn test_trained_model_round_trip() {
        let raw = readings(20, &[4, 9, 14, 18]);
        let features = FeatureExtractor::default().extract(&raw).unwrap();
        let outcome = Trainer::default().train(&features).unwrap();

        let store = OpendalStore::memory().unwrap();
        write_artifact(&store, MODEL_PATH, &outcome.model).unwrap();
        store
            .write(
                "abfs://acct/testing/input/O_G_Equipment_Data.csv",
                &csv_bytes(&raw),
            )
            .unwrap();

        let mut engine = InferenceEngine::new(MODEL_PATH);
        engine.load(&store).unwrap();
        let result = engine
            .run_batch(
                &store,
                "abfs://acct/testing/input/O_G_Equipment_Data.csv",
                "abfs://acct/testing/refined/project1/results/predictions.parquet",
            )
            .unwrap();
        assert_eq!(result.predictions.len(), 20);

        let written = read_table(
            &store,
            "abfs://acct/testing/refined/project1/results/predictions.parquet",
        )
        .unwrap();
        assert_eq!(written.n_rows(), 20);
        assert_eq!(written.require(PREDICTION_COLUMN).unwrap().as_int().unwrap().len(), 20);
    }

    fn csv_bytes(table: &Table) -> Vec<u8> {
        let mut out = table.column_names().join(",");
        out.push('\n');
        for row in 0..table.n_rows() {
            let cells: Vec<String> = table
                .columns()
                .iter()
                .map(|c| match &c.data {
                    ColumnData::Float(v) => format!("{:.2}", v[row]),
                    ColumnData::Int(v) => v[row].to_string(),
                    ColumnData::Bool(v) => if v[row] { "True" } else { "False" }.to_string(),
                    ColumnData::Text(v) => v[row].clone(),
                })
                .collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out.into_bytes()
    }
}
