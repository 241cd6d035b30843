//! Classification Scores

use serde::{Deserialize, Serialize};
use tracing::info;

/// Binary confusion matrix, positive class 1
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
    pub tp: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
                (true, true) => cm.tp += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// False positive rate
    pub fn fpr(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }
}

pub fn accuracy_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    ConfusionMatrix::from_predictions(y_true, y_pred).accuracy()
}

pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    ConfusionMatrix::from_predictions(y_true, y_pred).f1()
}

/// Scores of the final model on the held-out split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeldOutMetrics {
    pub confusion: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl HeldOutMetrics {
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        Self {
            confusion,
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
        }
    }

    /// Log the scores and publish them as gauges
    pub fn report(&self) {
        let cm = &self.confusion;
        info!(
            tn = cm.tn,
            fp = cm.fp,
            fn_ = cm.fn_,
            tp = cm.tp,
            "Precision: {:.4} | Recall: {:.4} | F1 Score: {:.4}",
            self.precision,
            self.recall,
            self.f1
        );
        metrics::gauge!("training_precision").set(self.precision);
        metrics::gauge!("training_recall").set(self.recall);
        metrics::gauge!("training_f1").set(self.f1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_counts() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 1], &[0, 1, 0, 1, 1]);
        assert_eq!(
            cm,
            ConfusionMatrix {
                tn: 1,
                fp: 1,
                fn_: 1,
                tp: 2
            }
        );
        assert!((cm.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.f1() - 2.0 / 3.0).abs() < 1e-12);
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_denominators() {
        // Nothing predicted positive, nothing actually positive
        let cm = ConfusionMatrix::from_predictions(&[0, 0], &[0, 0]);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.recall(), 0.0);
        assert_eq!(cm.f1(), 0.0);
        assert_eq!(cm.accuracy(), 1.0);

        let metrics = HeldOutMetrics::from_confusion(cm);
        assert_eq!(metrics.f1, 0.0);
        metrics.report();
    }

    #[test]
    fn test_score_helpers() {
        assert_eq!(f1_score(&[1, 0], &[1, 0]), 1.0);
        assert_eq!(accuracy_score(&[1, 0, 1, 0], &[1, 1, 1, 1]), 0.5);
    }
}
