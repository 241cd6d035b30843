//! Equipment Table Schema Validation

use crate::error::DataError;
use crate::table::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Failure flag column
pub const FAIL_COLUMN: &str = "Fail";
/// First preset identifier
pub const PRESET_1_COLUMN: &str = "Preset_1";
/// Second preset identifier
pub const PRESET_2_COLUMN: &str = "Preset_2";

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Columns that must be present
    pub required_columns: Vec<String>,
    /// Minimum number of readings
    pub min_rows: usize,
    /// Whether at least one continuous (float) column is required
    pub require_continuous: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required_columns: vec![
                FAIL_COLUMN.to_string(),
                PRESET_1_COLUMN.to_string(),
                PRESET_2_COLUMN.to_string(),
            ],
            min_rows: 1,
            require_continuous: true,
        }
    }
}

/// Result of validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the table passed every check
    pub valid: bool,
    /// Every problem found
    pub errors: Vec<DataError>,
    /// Number of columns inspected
    pub columns_checked: usize,
}

impl ValidationResult {
    /// First error, if any, as a `Result`
    pub fn into_result(self) -> Result<(), DataError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Validator for raw equipment reading tables
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Check a table against the configured schema, collecting every error
    pub fn validate(&self, table: &Table) -> ValidationResult {
        let mut errors = Vec::new();
        let mut columns_checked = 0;

        if table.n_rows() < self.config.min_rows {
            errors.push(DataError::TooFewRows {
                min: self.config.min_rows,
                actual: table.n_rows(),
            });
        }

        for name in &self.config.required_columns {
            columns_checked += 1;
            match table.column(name) {
                None => errors.push(DataError::MissingColumn(name.clone())),
                Some(column) if name == FAIL_COLUMN => {
                    if let Err(e) = fail_flags(column) {
                        errors.push(e);
                    }
                }
                Some(_) => {}
            }
        }

        if self.config.require_continuous && table.float_columns().is_empty() {
            errors.push(DataError::InvalidColumn {
                column: "<continuous>".to_string(),
                reason: "table has no float sensor columns".to_string(),
            });
        }

        debug!(
            "Validated table: {} columns checked, {} errors",
            columns_checked,
            errors.len()
        );

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            columns_checked,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

/// Normalize a failure flag column to 0/1 integers
pub fn fail_flags(column: &Column) -> Result<Vec<i64>, DataError> {
    let invalid = |reason: String| DataError::InvalidColumn {
        column: column.name.clone(),
        reason,
    };

    match &column.data {
        ColumnData::Bool(v) => Ok(v.iter().map(|&b| i64::from(b)).collect()),
        ColumnData::Int(v) => {
            if let Some(bad) = v.iter().find(|&&x| x != 0 && x != 1) {
                return Err(invalid(format!("flag value {} is not 0 or 1", bad)));
            }
            Ok(v.clone())
        }
        other => Err(invalid(format!(
            "expected bool or 0/1 int, found {:?}",
            other.dtype()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equipment_table() -> Table {
        Table::from_columns(vec![
            Column::int(PRESET_1_COLUMN, vec![1, 2]),
            Column::int(PRESET_2_COLUMN, vec![3, 3]),
            Column::float("Temperature", vec![40.0, 41.0]),
            Column::bool(FAIL_COLUMN, vec![false, true]),
        ])
        .unwrap()
    }

    #[test]
    fn test_valid_table() {
        let result = Validator::default().validate(&equipment_table());
        assert!(result.valid);
        assert_eq!(result.columns_checked, 3);
    }

    #[test]
    fn test_missing_preset_reported() {
        let table = Table::from_columns(vec![
            Column::float("Temperature", vec![40.0]),
            Column::bool(FAIL_COLUMN, vec![false]),
        ])
        .unwrap();
        let result = Validator::default().validate(&table);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(result.into_result(), Err(DataError::MissingColumn(_))));
    }

    #[test]
    fn test_no_continuous_columns() {
        let table = Table::from_columns(vec![
            Column::int(PRESET_1_COLUMN, vec![1]),
            Column::int(PRESET_2_COLUMN, vec![1]),
            Column::bool(FAIL_COLUMN, vec![false]),
        ])
        .unwrap();
        assert!(!Validator::default().validate(&table).valid);
    }

    #[test]
    fn test_fail_flags_from_bool_and_int() {
        assert_eq!(
            fail_flags(&Column::bool(FAIL_COLUMN, vec![true, false])).unwrap(),
            vec![1, 0]
        );
        assert_eq!(
            fail_flags(&Column::int(FAIL_COLUMN, vec![0, 1])).unwrap(),
            vec![0, 1]
        );
        assert!(fail_flags(&Column::int(FAIL_COLUMN, vec![2])).is_err());
        assert!(fail_flags(&Column::float(FAIL_COLUMN, vec![1.0])).is_err());
    }

    #[test]
    fn test_empty_table_too_few_rows() {
        let result = Validator::default().validate(&Table::new());
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, DataError::TooFewRows { min: 1, actual: 0 })));
    }
}
