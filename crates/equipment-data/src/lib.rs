//! Equipment Reading Tables
//!
//! Column-oriented tables for equipment sensor readings, CSV and XLSX
//! parsing with column type inference, and schema validation.

mod error;
mod reader;
mod table;
mod validator;

pub use error::DataError;
pub use reader::{read_csv, read_xlsx};
pub use table::{Column, ColumnData, DataType, Table};
pub use validator::{
    fail_flags, ValidationConfig, ValidationResult, Validator, FAIL_COLUMN, PRESET_1_COLUMN,
    PRESET_2_COLUMN,
};
