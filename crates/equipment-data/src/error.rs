//! Data Error Types

use thiserror::Error;

/// Errors while building, parsing or validating equipment tables
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Required column is absent
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Column exists but holds unusable values
    #[error("Invalid column {column}: {reason}")]
    InvalidColumn { column: String, reason: String },

    /// Column length does not match the table
    #[error("Column {column} has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Same column name given twice
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    /// CSV could not be parsed
    #[error("CSV parse error: {0}")]
    Csv(String),

    /// Workbook could not be opened or read
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Table has fewer rows than required
    #[error("Table has {actual} rows, at least {min} required")]
    TooFewRows { min: usize, actual: usize },
}

impl From<csv::Error> for DataError {
    fn from(err: csv::Error) -> Self {
        DataError::Csv(err.to_string())
    }
}

impl From<calamine::XlsxError> for DataError {
    fn from(err: calamine::XlsxError) -> Self {
        DataError::Spreadsheet(err.to_string())
    }
}
