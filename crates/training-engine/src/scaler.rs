//! Standard Scaler

use crate::TrainingError;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardisation `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    /// Population standard deviation; 1 for constant features
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit column statistics
    pub fn fit(x: ArrayView2<f64>) -> Result<Self, TrainingError> {
        if x.nrows() == 0 {
            return Err(TrainingError::EmptySplit(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }

        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / column.len() as f64;
            let var = column.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / column.len() as f64;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Apply the fitted statistics
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, TrainingError> {
        if x.ncols() != self.n_features() {
            return Err(TrainingError::ShapeMismatch {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    pub fn fit_transform(x: ArrayView2<f64>) -> Result<(Self, Array2<f64>), TrainingError> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_scaler_statistics() {
        let x = array![[1.0, 5.0], [3.0, 5.0], [5.0, 5.0]];
        let (scaler, scaled) = StandardScaler::fit_transform(x.view()).unwrap();

        assert_eq!(scaler.mean, vec![3.0, 5.0]);
        assert!((scaler.scale[0] - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // Constant column keeps unit scale
        assert_eq!(scaler.scale[1], 1.0);

        let col0: Vec<f64> = scaled.column(0).to_vec();
        assert!((col0.iter().sum::<f64>()).abs() < 1e-12);
        assert!(scaled.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_scaler_shape_check() {
        let scaler = StandardScaler::fit(array![[1.0, 2.0]].view()).unwrap();
        assert!(matches!(
            scaler.transform(array![[1.0]].view()),
            Err(TrainingError::ShapeMismatch { .. })
        ));
    }
}
