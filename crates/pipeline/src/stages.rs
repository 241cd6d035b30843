//! Pipeline Stages
//!
//! The steps a dag task can run: `train` fits and stores the model,
//! `predict` scores the latest readings with it.

use crate::config::PipelineConfig;
use anyhow::{bail, Context, Result};
use feature_engine::{FeatureExtractor, FeatureTable};
use inference_engine::{InferenceEngine, InferenceResult};
use std::fmt;
use std::str::FromStr;
use storage::{read_table, write_artifact, ArtifactStore};
use tracing::{info, warn};
use training_engine::{EvaluationReport, Trainer, TrainingOutcome};

/// A runnable pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Predict,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Train => "train",
            Stage::Predict => "predict",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Stage::Train),
            "predict" => Ok(Stage::Predict),
            other => bail!("Unknown stage {:?}", other),
        }
    }
}

/// Runs stages against one store
pub struct StageRunner<'a> {
    config: &'a PipelineConfig,
    store: &'a dyn ArtifactStore,
}

impl<'a> StageRunner<'a> {
    pub fn new(config: &'a PipelineConfig, store: &'a dyn ArtifactStore) -> Self {
        Self { config, store }
    }

    pub fn run(&self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Train => self.train().map(|_| ()),
            Stage::Predict => self.predict().map(|_| ()),
        }
    }

    /// Run one declared step of a dag
    pub fn run_task(&self, dag: &str, step: &str) -> Result<()> {
        let declared = self.config.dag(dag)?;
        if !declared.tasks.iter().any(|t| t == step) {
            bail!("Dag {} has no step {:?}", dag, step);
        }
        let stage: Stage = step.parse()?;
        info!("Running {} of dag {} for {}", stage, dag, self.config.today);
        self.run(stage)
    }

    /// Fit on the input readings and store the model
    pub fn train(&self) -> Result<TrainingOutcome> {
        let input = self.config.folders.input_table();
        info!("Training from {}", input);
        let raw = read_table(self.store, &input)
            .with_context(|| format!("Failed to read {}", input))?;
        let features = FeatureExtractor::default()
            .extract(&raw)
            .context("Feature extraction failed")?;
        let outcome = Trainer::new(self.config.training.clone())
            .train(&features)
            .context("Training failed")?;

        match held_out_report(&features, &outcome) {
            Ok(report) => info!(
                "Held-out AUC {:.3} (fpr {:.3}, tpr {:.3} at 0.5)",
                report.auc, report.decision_point.0, report.decision_point.1
            ),
            Err(e) => warn!("Skipping held-out evaluation: {:#}", e),
        }

        let model_path = self.config.folders.model_path();
        write_artifact(self.store, &model_path, &outcome.model)
            .with_context(|| format!("Failed to write {}", model_path))?;
        info!("Model saved to {}", model_path);
        Ok(outcome)
    }

    /// Score the input readings with the stored model
    pub fn predict(&self) -> Result<InferenceResult> {
        let model_path = self.config.folders.model_path();
        let mut engine = InferenceEngine::new(&model_path);
        engine.load(self.store).context("Failed to load model")?;

        let input = self.config.folders.input_table();
        let output = self.config.folders.predictions_path();
        engine
            .run_batch(self.store, &input, &output)
            .with_context(|| format!("Prediction from {} failed", input))
    }
}

/// ROC and histogram figures for the rows the model never saw
fn held_out_report(features: &FeatureTable, outcome: &TrainingOutcome) -> Result<EvaluationReport> {
    let rows: Vec<usize> = outcome
        .split
        .test
        .iter()
        .map(|&i| outcome.labelled_rows[i])
        .collect();
    let labels = features.labels()?;
    let y: Vec<u8> = rows.iter().filter_map(|&row| labels[row]).collect();
    let inputs = features.model_inputs()?.take_rows(&rows);
    Ok(outcome.model.evaluate(&inputs, &y)?)
}
