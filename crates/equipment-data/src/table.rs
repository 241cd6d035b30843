//! Column-Oriented Table

use crate::error::DataError;
use serde::{Deserialize, Serialize};

/// Logical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float,
    Int,
    Bool,
    Text,
}

/// Typed column storage. Missing floats are NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
}

impl ColumnData {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical type of the storage
    pub fn dtype(&self) -> DataType {
        match self {
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Int(_) => DataType::Int,
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Text(_) => DataType::Text,
        }
    }

    /// Numeric view of the column (bools become 0/1). `None` for text.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            ColumnData::Float(v) => Some(v.clone()),
            ColumnData::Int(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ColumnData::Bool(v) => Some(v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect()),
            ColumnData::Text(_) => None,
        }
    }

    /// Grouping key for a single cell. Missing values have no key.
    pub fn key_at(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Float(v) => {
                let x = v[row];
                if x.is_nan() {
                    None
                } else if x == 0.0 {
                    // -0.0 and 0.0 share a group
                    Some(0.0f64.to_string())
                } else {
                    Some(x.to_string())
                }
            }
            ColumnData::Int(v) => Some(v[row].to_string()),
            ColumnData::Bool(v) => Some(v[row].to_string()),
            ColumnData::Text(v) => Some(v[row].clone()),
        }
    }

    /// Copy of the rows at `indices`, in that order
    pub fn take(&self, indices: &[usize]) -> ColumnData {
        match self {
            ColumnData::Float(v) => ColumnData::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Int(v) => ColumnData::Int(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => {
                ColumnData::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// Named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Float column shorthand
    pub fn float(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float(values))
    }

    /// Integer column shorthand
    pub fn int(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, ColumnData::Int(values))
    }

    /// Boolean column shorthand
    pub fn bool(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::new(name, ColumnData::Bool(values))
    }

    /// Text column shorthand
    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(name, ColumnData::Text(values))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// Borrow float values, failing for any other type
    pub fn as_float(&self) -> Result<&[f64], DataError> {
        match &self.data {
            ColumnData::Float(v) => Ok(v),
            other => Err(DataError::InvalidColumn {
                column: self.name.clone(),
                reason: format!("expected float, found {:?}", other.dtype()),
            }),
        }
    }

    /// Borrow integer values, failing for any other type
    pub fn as_int(&self) -> Result<&[i64], DataError> {
        match &self.data {
            ColumnData::Int(v) => Ok(v),
            other => Err(DataError::InvalidColumn {
                column: self.name.clone(),
                reason: format!("expected int, found {:?}", other.dtype()),
            }),
        }
    }
}

/// Ordered collection of equal-length named columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking lengths and names
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, DataError> {
        let mut table = Self::new();
        for column in columns {
            if table.column(&column.name).is_some() {
                return Err(DataError::DuplicateColumn(column.name));
            }
            table.insert(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in table order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column that must exist
    pub fn require(&self, name: &str) -> Result<&Column, DataError> {
        self.column(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Float columns in table order (the continuous variables)
    pub fn float_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| c.dtype() == DataType::Float)
            .collect()
    }

    /// Insert a column, replacing an existing one with the same name
    pub fn insert(&mut self, column: Column) -> Result<(), DataError> {
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            let actual = column.len();
            return Err(DataError::LengthMismatch {
                column: column.name,
                expected: self.n_rows,
                actual,
            });
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// New table with only the rows at `indices`
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
                .collect(),
            n_rows: indices.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::int("Cycle", vec![1, 2, 3]),
            Column::float("Temperature", vec![50.0, 51.5, f64::NAN]),
            Column::bool("Fail", vec![false, false, true]),
        ])
        .unwrap()
    }

    #[test]
    fn test_float_columns_selected_by_dtype() {
        let table = sample();
        let names: Vec<_> = table.float_columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["Temperature"]);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut table = sample();
        table.insert(Column::int("Fail", vec![0, 0, 1])).unwrap();
        assert_eq!(table.n_columns(), 3);
        assert_eq!(table.require("Fail").unwrap().as_int().unwrap(), &[0, 0, 1]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut table = sample();
        let err = table.insert(Column::int("Short", vec![1])).unwrap_err();
        assert!(matches!(err, DataError::LengthMismatch { expected: 3, actual: 1, .. }));
        assert!(err.to_string().contains("Short"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::from_columns(vec![
            Column::int("A", vec![1]),
            Column::int("A", vec![2]),
        ])
        .unwrap_err();
        assert!(matches!(err, DataError::DuplicateColumn(_)));
    }

    #[test]
    fn test_take_rows() {
        let table = sample().take_rows(&[2, 0]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.require("Cycle").unwrap().as_int().unwrap(), &[3, 1]);
    }

    #[test]
    fn test_missing_float_has_no_key() {
        let table = sample();
        let temp = &table.require("Temperature").unwrap().data;
        assert_eq!(temp.key_at(0), Some("50".to_string()));
        assert_eq!(temp.key_at(2), None);
    }

    #[test]
    fn test_signed_zero_shares_key() {
        let data = ColumnData::Float(vec![-0.0, 0.0, -1.5]);
        assert_eq!(data.key_at(0), data.key_at(1));
        assert_eq!(data.key_at(0), Some("0".to_string()));
        assert_eq!(data.key_at(2), Some("-1.5".to_string()));
    }
}
