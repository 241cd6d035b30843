//! Binary Classifier Evaluation
//!
//! Produces the numbers behind the usual diagnostic charts: confusion matrix,
//! per-class distributions of the predicted probability, and the ROC curve.

use crate::scoring::{ConfusionMatrix, HeldOutMetrics};
use crate::TrainingError;
use serde::{Deserialize, Serialize};
use tracing::info;

const HISTOGRAM_BINS: usize = 25;

/// Receiver operating characteristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Score threshold of each point; the first is `+inf`
    pub thresholds: Vec<f64>,
}

/// Density histograms of the positive-class probability, split by true class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityHistogram {
    /// `HISTOGRAM_BINS + 1` bin edges over [0, 1]
    pub edges: Vec<f64>,
    pub positives: Vec<f64>,
    pub negatives: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: HeldOutMetrics,
    pub roc: RocCurve,
    pub auc: f64,
    /// (false positive rate, true positive rate) at the 0.5 threshold
    pub decision_point: (f64, f64),
    pub histogram: ProbabilityHistogram,
}

fn check_classes(y_true: &[u8]) -> Result<(), TrainingError> {
    let mut present = [false; 2];
    for &label in y_true {
        match label {
            0 | 1 => present[label as usize] = true,
            other => return Err(TrainingError::InvalidLabel(other as f64)),
        }
    }
    let n_classes = present.iter().filter(|p| **p).count();
    if n_classes != 2 {
        return Err(TrainingError::NotBinary(n_classes));
    }
    Ok(())
}

fn check_lengths(y_true: &[u8], scores: &[f64]) -> Result<(), TrainingError> {
    if y_true.len() != scores.len() {
        return Err(TrainingError::ShapeMismatch {
            expected: format!("{} scores", y_true.len()),
            actual: format!("{} scores", scores.len()),
        });
    }
    Ok(())
}

/// ROC curve over every distinct score, highest threshold first
pub fn roc_curve(y_true: &[u8], scores: &[f64]) -> Result<RocCurve, TrainingError> {
    check_lengths(y_true, scores)?;
    check_classes(y_true)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let positives = y_true.iter().filter(|&&v| v == 1).count() as f64;
    let negatives = y_true.len() as f64 - positives;

    let mut roc = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (k, &i) in order.iter().enumerate() {
        if y_true[i] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        // Emit a point once all rows sharing this score are counted
        let last_of_score = order
            .get(k + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_score {
            roc.fpr.push(fp / negatives);
            roc.tpr.push(tp / positives);
            roc.thresholds.push(scores[i]);
        }
    }
    Ok(roc)
}

/// Area under a curve by the trapezoidal rule
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

fn density(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let width = 1.0 / HISTOGRAM_BINS as f64;
    let mut counts = vec![0usize; HISTOGRAM_BINS];
    let mut total = 0usize;
    for v in values {
        let bin = ((v / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
        total += 1;
    }
    counts
        .into_iter()
        .map(|c| {
            if total == 0 {
                0.0
            } else {
                c as f64 / (total as f64 * width)
            }
        })
        .collect()
}

/// Evaluate positive-class probabilities against true labels
pub fn evaluate(y_true: &[u8], proba: &[f64]) -> Result<EvaluationReport, TrainingError> {
    let roc = roc_curve(y_true, proba)?;
    let area = auc(&roc.fpr, &roc.tpr);

    let predicted: Vec<u8> = proba.iter().map(|&p| u8::from(p > 0.5)).collect();
    let confusion = ConfusionMatrix::from_predictions(y_true, &predicted);
    let metrics = HeldOutMetrics::from_confusion(confusion);

    let histogram = ProbabilityHistogram {
        edges: (0..=HISTOGRAM_BINS)
            .map(|i| i as f64 / HISTOGRAM_BINS as f64)
            .collect(),
        positives: density(
            y_true
                .iter()
                .zip(proba)
                .filter(|(y, _)| **y == 1)
                .map(|(_, p)| p.clamp(0.0, 1.0)),
        ),
        negatives: density(
            y_true
                .iter()
                .zip(proba)
                .filter(|(y, _)| **y == 0)
                .map(|(_, p)| p.clamp(0.0, 1.0)),
        ),
    };

    info!(
        "Precision: {:.2} | Recall: {:.2} | F1 Score: {:.2} | AUC Score: {:.2}",
        metrics.precision, metrics.recall, metrics.f1, area
    );

    Ok(EvaluationReport {
        metrics,
        roc,
        auc: area,
        decision_point: (confusion.fpr(), confusion.recall()),
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_ranking_auc() {
        let roc = roc_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.6, 0.9]).unwrap();
        assert_eq!(roc.fpr, vec![0.0, 0.0, 0.0, 0.5, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 0.5, 1.0, 1.0, 1.0]);
        assert_eq!(auc(&roc.fpr, &roc.tpr), 1.0);
    }

    #[test]
    fn test_tied_scores_share_a_point() {
        let roc = roc_curve(&[0, 1, 0, 1], &[0.5, 0.5, 0.2, 0.8]).unwrap();
        assert_eq!(roc.thresholds.len(), 4);
        assert_eq!(roc.fpr, vec![0.0, 0.0, 0.5, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 0.5, 1.0, 1.0]);
        assert!((auc(&roc.fpr, &roc.tpr) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_requires_two_classes() {
        assert!(matches!(
            roc_curve(&[1, 1], &[0.2, 0.3]),
            Err(TrainingError::NotBinary(1))
        ));
        assert!(matches!(
            evaluate(&[0, 1], &[0.2]),
            Err(TrainingError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_evaluate_report() {
        let y = [0, 0, 0, 1, 1];
        let proba = [0.1, 0.3, 0.7, 0.8, 0.98];
        let report = evaluate(&y, &proba).unwrap();

        assert_eq!(report.metrics.confusion.fp, 1);
        assert_eq!(report.metrics.confusion.tp, 2);
        assert_eq!(report.metrics.recall, 1.0);
        assert!((report.auc - 1.0).abs() < 1e-12);
        assert!((report.decision_point.0 - 1.0 / 3.0).abs() < 1e-12);

        let h = &report.histogram;
        assert_eq!(h.edges.len(), 26);
        // Densities integrate to one
        let area: f64 = h.negatives.iter().map(|d| d / 25.0).sum();
        assert!((area - 1.0).abs() < 1e-12);
        // 0.98 lands in the last bin
        assert!(h.positives[24] > 0.0);
    }
}
