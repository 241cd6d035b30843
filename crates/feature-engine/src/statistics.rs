//! Missing-Aware Statistics
//!
//! Every function treats NaN as a missing value and skips it, so results
//! line up with the dataframe statistics the model was designed against.

/// Trailing window aggregation over a series
#[derive(Debug, Clone, Copy)]
pub struct Rolling {
    /// Window length in rows, including the current row
    pub window: usize,
    /// Minimum non-missing values in the window for a defined result
    pub min_periods: usize,
}

impl Rolling {
    /// Create a new rolling window
    pub fn new(window: usize, min_periods: usize) -> Self {
        Self {
            window: window.max(1),
            min_periods: min_periods.max(1),
        }
    }

    fn apply(&self, values: &[f64], reduce: impl Fn(&[f64]) -> f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        let mut present = Vec::with_capacity(self.window);
        for i in 0..values.len() {
            let start = (i + 1).saturating_sub(self.window);
            present.clear();
            present.extend(values[start..=i].iter().copied().filter(|v| !v.is_nan()));
            if present.len() >= self.min_periods {
                out.push(reduce(&present));
            } else {
                out.push(f64::NAN);
            }
        }
        out
    }

    /// Rolling sum
    pub fn sum(&self, values: &[f64]) -> Vec<f64> {
        self.apply(values, |w| w.iter().sum())
    }

    /// Rolling mean
    pub fn mean(&self, values: &[f64]) -> Vec<f64> {
        self.apply(values, mean_of)
    }

    /// Rolling sample standard deviation (ddof = 1)
    pub fn std(&self, values: &[f64]) -> Vec<f64> {
        self.apply(values, |w| variance_of(w, 1).sqrt())
    }
}

fn mean_of(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance of non-empty, non-missing values with the given delta degrees of freedom
fn variance_of(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let mean = mean_of(values);
    let m2: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    m2 / (values.len() - ddof) as f64
}

fn present(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Sum of non-missing values (0 when all are missing)
pub fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !v.is_nan()).sum()
}

/// Maximum of non-missing values
pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Population standard deviation (ddof = 0) of non-missing values
pub fn population_std(values: &[f64]) -> f64 {
    variance_of(&present(values), 0).sqrt()
}

/// First difference; the first element is missing
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            out.push(f64::NAN);
        } else {
            out.push(values[i] - values[i - 1]);
        }
    }
    out
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = present(values);
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Median of non-missing values
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}
