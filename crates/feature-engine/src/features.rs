//! Feature Table Assembly
//!
//! One pure transformation from a raw equipment table to the feature table.
//! Training and inference both call [`FeatureExtractor::extract`], so the two
//! paths cannot drift apart.

use crate::statistics::{self, Rolling};
use crate::FeatureError;
use equipment_data::{
    fail_flags, Column, ColumnData, Table, Validator, FAIL_COLUMN, PRESET_1_COLUMN,
    PRESET_2_COLUMN,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Label column: failing now or on the next reading
pub const LABEL_COLUMN: &str = "Verge_of_failing";

/// Derived column names
pub mod columns {
    pub const SUM: &str = "Sum_of_variables";
    pub const DIFF_SUM: &str = "Diff_Sum_of_variables";
    pub const DIFF_ACUM_SUM: &str = "Diff_acum_Sum_of_variables";
    pub const SUM_MA: &str = "Sum_of_variables_MA";
    pub const SUM_STD: &str = "Sum_of_variables_std";
    pub const MEDIAN_SUM: &str = "Median_Sum_of_variables";
    pub const DIFF_MEDIAN_SUM: &str = "Diff_Median_Sum_of_variables";
    pub const MEDIAN_SUM_PRESET: &str = "Median_Sum_of_variables_Preset";
    pub const DIFF_MEDIAN_SUM_PRESET: &str = "Diff_Median_Sum_of_variables_Preset";
    pub const MAX_VALUE: &str = "Max_value_among_feat";
    pub const STD_EQUIP: &str = "Std_equip_features";
    pub const N_ABOVE_PCT: &str = "N_equip_feats_abv_85_pct";
    pub const FLAG_PREFIX: &str = "FLAG_";
}

/// Model input features, in model column order
pub const MODEL_FEATURES: [&str; 7] = [
    columns::SUM,
    columns::SUM_MA,
    columns::N_ABOVE_PCT,
    columns::MAX_VALUE,
    columns::SUM_STD,
    columns::DIFF_MEDIAN_SUM_PRESET,
    columns::DIFF_MEDIAN_SUM,
];

/// Features whose early rows lack history and get the sentinel
pub const HISTORY_FEATURES: [&str; 2] = [columns::SUM_MA, columns::SUM_STD];

/// Window configuration for feature extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Window for the moving average of the sum
    pub ma_window: usize,
    /// Window for the rolling std of the sum
    pub std_window: usize,
    /// Window for the accumulated difference of the sum
    pub diff_window: usize,
    /// Minimum observations for any rolling value
    pub min_periods: usize,
    /// Per-column quantile above which a reading is flagged
    pub flag_quantile: f64,
    /// Fill value for rolling features with no history
    pub history_sentinel: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ma_window: 4,
            std_window: 3,
            diff_window: 4,
            min_periods: 2,
            flag_quantile: 0.85,
            history_sentinel: -1.0,
        }
    }
}

/// Dense row-major model input matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    /// Column names, in order
    pub names: Vec<String>,
    /// Row-major values
    pub values: Vec<f64>,
    /// Number of rows
    pub n_rows: usize,
}

impl FeatureMatrix {
    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    /// Borrow one row
    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.n_features();
        &self.values[i * width..(i + 1) * width]
    }

    /// Copy of the given rows, in the given order
    pub fn take_rows(&self, rows: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            values: rows.iter().flat_map(|&i| self.row(i).iter().copied()).collect(),
            n_rows: rows.len(),
        }
    }
}

/// Raw table plus every derived column
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    table: Table,
    continuous: Vec<String>,
    config: FeatureConfig,
}

impl FeatureTable {
    /// The augmented table
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn n_rows(&self) -> usize {
        self.table.n_rows()
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Names of the continuous variables the aggregates were built from
    pub fn continuous_variables(&self) -> &[String] {
        &self.continuous
    }

    /// Labels per row; `None` where the next reading is unknown
    pub fn labels(&self) -> Result<Vec<Option<u8>>, FeatureError> {
        let label = self.table.require(LABEL_COLUMN)?.as_float()?;
        Ok(label
            .iter()
            .map(|&v| if v.is_nan() { None } else { Some(v as u8) })
            .collect())
    }

    /// Model inputs with the history sentinel applied
    pub fn model_inputs(&self) -> Result<FeatureMatrix, FeatureError> {
        let n_rows = self.table.n_rows();
        let mut series = Vec::with_capacity(MODEL_FEATURES.len());
        for name in MODEL_FEATURES {
            let column = self.table.require(name)?;
            let values = column.data.to_f64().ok_or_else(|| FeatureError::MissingValue {
                feature: name.to_string(),
                row: 0,
            })?;
            series.push(values);
        }

        let mut values = Vec::with_capacity(n_rows * MODEL_FEATURES.len());
        for row in 0..n_rows {
            for (name, column) in MODEL_FEATURES.iter().zip(&series) {
                let mut v = column[row];
                if v.is_nan() && HISTORY_FEATURES.contains(name) {
                    v = self.config.history_sentinel;
                }
                if !v.is_finite() {
                    return Err(FeatureError::MissingValue {
                        feature: name.to_string(),
                        row,
                    });
                }
                values.push(v);
            }
        }

        Ok(FeatureMatrix {
            names: MODEL_FEATURES.iter().map(|s| s.to_string()).collect(),
            values,
            n_rows,
        })
    }
}

/// Feature extractor for equipment reading tables
pub struct FeatureExtractor {
    config: FeatureConfig,
    validator: Validator,
}

impl FeatureExtractor {
    /// Create a new feature extractor
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            validator: Validator::default(),
        }
    }

    /// Derive the feature table from a raw reading table
    pub fn extract(&self, raw: &Table) -> Result<FeatureTable, FeatureError> {
        self.validator.validate(raw).into_result()?;

        let continuous: Vec<String> = raw.float_columns().iter().map(|c| c.name.clone()).collect();
        if continuous.is_empty() {
            return Err(FeatureError::NoContinuousVariables);
        }
        let sensors: Vec<&[f64]> = raw
            .float_columns()
            .into_iter()
            .map(|c| c.as_float())
            .collect::<Result<_, _>>()?;

        let n = raw.n_rows();
        debug!(
            "Extracting features: {} rows, {} continuous variables",
            n,
            continuous.len()
        );

        let mut table = raw.clone();

        // Label
        let fail = fail_flags(raw.require(FAIL_COLUMN)?)?;
        let label = verge_of_failing(&fail);
        table.insert(Column::int(FAIL_COLUMN, fail))?;
        table.insert(Column::float(LABEL_COLUMN, label))?;

        // Aggregates of the sum of sensors
        let row_values = |row: usize| -> Vec<f64> { sensors.iter().map(|s| s[row]).collect() };
        let sum: Vec<f64> = (0..n).map(|r| statistics::nan_sum(&row_values(r))).collect();
        let diff = statistics::diff(&sum);
        let diff_acum =
            Rolling::new(self.config.diff_window, self.config.min_periods).sum(&diff);
        let ma = Rolling::new(self.config.ma_window, self.config.min_periods).mean(&sum);
        let std = Rolling::new(self.config.std_window, self.config.min_periods).std(&sum);

        let global_median = statistics::median(&sum);
        let diff_median: Vec<f64> = sum.iter().map(|s| s - global_median).collect();

        let preset_median = group_median(
            &sum,
            &raw.require(PRESET_1_COLUMN)?.data,
            &raw.require(PRESET_2_COLUMN)?.data,
        );
        let diff_preset: Vec<f64> = sum
            .iter()
            .zip(&preset_median)
            .map(|(s, m)| s - m)
            .collect();

        let max_value: Vec<f64> = (0..n).map(|r| statistics::nan_max(&row_values(r))).collect();
        let std_equip: Vec<f64> = (0..n)
            .map(|r| statistics::population_std(&row_values(r)))
            .collect();

        table.insert(Column::float(columns::SUM, sum))?;
        table.insert(Column::float(columns::DIFF_SUM, diff))?;
        table.insert(Column::float(columns::DIFF_ACUM_SUM, diff_acum))?;
        table.insert(Column::float(columns::SUM_MA, ma))?;
        table.insert(Column::float(columns::SUM_STD, std))?;
        table.insert(Column::float(columns::MEDIAN_SUM, vec![global_median; n]))?;
        table.insert(Column::float(columns::DIFF_MEDIAN_SUM, diff_median))?;
        table.insert(Column::float(columns::MEDIAN_SUM_PRESET, preset_median))?;
        table.insert(Column::float(columns::DIFF_MEDIAN_SUM_PRESET, diff_preset))?;
        table.insert(Column::float(columns::MAX_VALUE, max_value))?;
        table.insert(Column::float(columns::STD_EQUIP, std_equip))?;

        // Readings above each sensor's high quantile
        let mut above = vec![0i64; n];
        for (name, values) in continuous.iter().zip(&sensors) {
            let threshold = statistics::quantile(values, self.config.flag_quantile);
            let flags: Vec<bool> = values.iter().map(|&v| v >= threshold).collect();
            for (count, &flag) in above.iter_mut().zip(&flags) {
                *count += i64::from(flag);
            }
            table.insert(Column::bool(format!("{}{}", columns::FLAG_PREFIX, name), flags))?;
        }
        table.insert(Column::int(columns::N_ABOVE_PCT, above))?;

        Ok(FeatureTable {
            table,
            continuous,
            config: self.config.clone(),
        })
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

/// Label each reading 1 if it fails or the next reading fails.
/// The last reading has no successor: it is 1 when failing, otherwise unknown.
pub fn verge_of_failing(fail: &[i64]) -> Vec<f64> {
    (0..fail.len())
        .map(|i| {
            if fail[i] == 1 {
                1.0
            } else {
                fail.get(i + 1).map_or(f64::NAN, |&next| next as f64)
            }
        })
        .collect()
}

/// Median of `values` within each (preset 1, preset 2) group, broadcast back per row
fn group_median(values: &[f64], preset_1: &ColumnData, preset_2: &ColumnData) -> Vec<f64> {
    let keys: Vec<Option<(String, String)>> = (0..values.len())
        .map(|r| Some((preset_1.key_at(r)?, preset_2.key_at(r)?)))
        .collect();

    let mut groups: HashMap<&(String, String), Vec<f64>> = HashMap::new();
    for (key, &v) in keys.iter().zip(values) {
        if let Some(key) = key {
            groups.entry(key).or_default().push(v);
        }
    }
    let medians: HashMap<&(String, String), f64> = groups
        .into_iter()
        .map(|(k, v)| (k, statistics::median(&v)))
        .collect();

    keys.iter()
        .map(|key| {
            key.as_ref()
                .and_then(|k| medians.get(k).copied())
                .unwrap_or(f64::NAN)
        })
        .collect()
}
