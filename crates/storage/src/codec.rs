//! Table and Artifact Codecs
//!
//! Tables are read from XLSX workbooks, CSV exports or parquet and written
//! as parquet. Model artifacts are postcard-encoded.

use crate::path::extension;
use crate::store::ArtifactStore;
use crate::StorageError;
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType as ArrowType, Field, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use equipment_data::{read_csv, read_xlsx, Column, ColumnData, Table};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Read a table, choosing the codec from the path extension
pub fn read_table(store: &dyn ArtifactStore, path: &str) -> Result<Table, StorageError> {
    let bytes = store.read(path)?;
    let table = match extension(path).as_deref() {
        Some("xlsx") => read_xlsx(&bytes)?,
        Some("csv") => read_csv(&bytes)?,
        Some("parquet") => decode_parquet(bytes)?,
        other => {
            return Err(StorageError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            ))
        }
    };
    info!(
        "Loaded table {} ({} rows x {} columns)",
        path,
        table.n_rows(),
        table.n_columns()
    );
    Ok(table)
}

/// Write a table as parquet
pub fn write_parquet(
    store: &dyn ArtifactStore,
    path: &str,
    table: &Table,
) -> Result<(), StorageError> {
    let bytes = encode_parquet(table)?;
    store.write(path, &bytes)?;
    info!("Wrote {} rows to {}", table.n_rows(), path);
    Ok(())
}

/// Serialize and store a binary artifact
pub fn write_artifact<T: Serialize>(
    store: &dyn ArtifactStore,
    path: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = postcard::to_allocvec(value)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    store.write(path, &bytes)?;
    debug!("Stored artifact {} ({} bytes)", path, bytes.len());
    Ok(())
}

/// Load and deserialize a binary artifact
pub fn read_artifact<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    path: &str,
) -> Result<T, StorageError> {
    let bytes = store.read(path)?;
    postcard::from_bytes(&bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn to_arrow(column: &Column) -> (Field, ArrayRef) {
    match &column.data {
        ColumnData::Float(v) => {
            // Missing floats are stored as nulls
            let array: Float64Array = v.iter().map(|x| (!x.is_nan()).then_some(*x)).collect();
            (
                Field::new(column.name.as_str(), ArrowType::Float64, true),
                Arc::new(array),
            )
        }
        ColumnData::Int(v) => (
            Field::new(column.name.as_str(), ArrowType::Int64, false),
            Arc::new(Int64Array::from(v.clone())),
        ),
        ColumnData::Bool(v) => (
            Field::new(column.name.as_str(), ArrowType::Boolean, false),
            Arc::new(BooleanArray::from(v.clone())),
        ),
        ColumnData::Text(v) => (
            Field::new(column.name.as_str(), ArrowType::Utf8, false),
            Arc::new(StringArray::from(v.clone())),
        ),
    }
}

/// Encode a table as a single-row-group parquet file
pub fn encode_parquet(table: &Table) -> Result<Vec<u8>, StorageError> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) =
        table.columns().iter().map(to_arrow).unzip();
    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| StorageError::Codec(format!("build record batch failed: {}", e)))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut bytes = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut bytes, schema, Some(props))
            .map_err(|e| StorageError::Codec(format!("create parquet writer failed: {}", e)))?;
        writer
            .write(&batch)
            .map_err(|e| StorageError::Codec(format!("write parquet batch failed: {}", e)))?;
        writer
            .close()
            .map_err(|e| StorageError::Codec(format!("close parquet writer failed: {}", e)))?;
    }
    Ok(bytes)
}

/// Decode parquet bytes into a table
pub fn decode_parquet(bytes: Vec<u8>) -> Result<Table, StorageError> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(bytes))
        .map_err(|e| StorageError::Codec(format!("create parquet reader failed: {}", e)))?
        .build()
        .map_err(|e| StorageError::Codec(format!("build parquet reader failed: {}", e)))?;

    let mut columns: Vec<Column> = Vec::new();
    for batch in reader {
        let batch =
            batch.map_err(|e| StorageError::Codec(format!("read parquet batch failed: {}", e)))?;
        let schema = batch.schema();
        for (idx, field) in schema.fields().iter().enumerate() {
            let data = from_arrow(field.name(), batch.column(idx).as_ref())?;
            match columns.iter_mut().find(|c| &c.name == field.name()) {
                Some(existing) => append(&mut existing.data, data)?,
                None => columns.push(Column::new(field.name().clone(), data)),
            }
        }
    }

    Ok(Table::from_columns(columns)?)
}

fn from_arrow(name: &str, array: &dyn Array) -> Result<ColumnData, StorageError> {
    let unsupported = || {
        StorageError::Codec(format!(
            "column {} has unsupported type {}",
            name,
            array.data_type()
        ))
    };

    match array.data_type() {
        ArrowType::Float64 => {
            let a = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(unsupported)?;
            Ok(ColumnData::Float(
                a.iter().map(|x| x.unwrap_or(f64::NAN)).collect(),
            ))
        }
        ArrowType::Int64 => {
            let a = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(unsupported)?;
            if a.null_count() > 0 {
                Ok(ColumnData::Float(
                    a.iter().map(|x| x.map_or(f64::NAN, |v| v as f64)).collect(),
                ))
            } else {
                Ok(ColumnData::Int(a.values().to_vec()))
            }
        }
        ArrowType::Boolean => {
            let a = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(unsupported)?;
            Ok(ColumnData::Bool(a.iter().map(|x| x.unwrap_or(false)).collect()))
        }
        ArrowType::Utf8 => {
            let a = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(unsupported)?;
            Ok(ColumnData::Text(
                a.iter().map(|x| x.unwrap_or_default().to_string()).collect(),
            ))
        }
        _ => Err(unsupported()),
    }
}

fn append(target: &mut ColumnData, more: ColumnData) -> Result<(), StorageError> {
    match (target, more) {
        (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
        (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
        (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend(b),
        (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
        (t, m) => {
            return Err(StorageError::Codec(format!(
                "column type changed between batches: {:?} vs {:?}",
                t.dtype(),
                m.dtype()
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OpendalStore;
    use serde::Deserialize;

    fn predictions() -> Table {
        Table::from_columns(vec![
            Column::int("Cycle", vec![1, 2, 3]),
            Column::float("Sum_of_variables_MA", vec![f64::NAN, 10.5, 11.0]),
            Column::bool("FLAG_Temperature", vec![false, true, false]),
            Column::text("Site", vec!["a".into(), "b".into(), "c".into()]),
            Column::int("PRED", vec![0, 1, 0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_parquet_keeps_types_and_missing_values() {
        let store = OpendalStore::memory().unwrap();
        write_parquet(&store, "refined/predictions.parquet", &predictions()).unwrap();

        let table = read_table(&store, "refined/predictions.parquet").unwrap();
        assert_eq!(table.column_names(), predictions().column_names());
        assert_eq!(table.require("PRED").unwrap().as_int().unwrap(), &[0, 1, 0]);
        let ma = table.require("Sum_of_variables_MA").unwrap().as_float().unwrap();
        assert!(ma[0].is_nan());
        assert_eq!(ma[1], 10.5);
    }

    #[test]
    fn test_read_csv_table() {
        let store = OpendalStore::memory().unwrap();
        store
            .write("input/readings.csv", b"Cycle,Temperature,Fail\n1,40.5,False\n")
            .unwrap();
        let table = read_table(&store, "input/readings.csv").unwrap();
        assert_eq!(table.n_rows(), 1);
    }

    #[test]
    fn test_read_xlsx_table() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Cycle").unwrap();
        sheet.write_string(0, 1, "Temperature").unwrap();
        sheet.write_string(0, 2, "Fail").unwrap();
        for (row, (temp, fail)) in [(40.5, false), (71.25, true)].iter().enumerate() {
            let row = row as u32 + 1;
            sheet.write_number(row, 0, row as f64).unwrap();
            sheet.write_number(row, 1, *temp).unwrap();
            sheet.write_boolean(row, 2, *fail).unwrap();
        }
        let store = OpendalStore::memory().unwrap();
        store
            .write("input/O_G_Equipment_Data.xlsx", &workbook.save_to_buffer().unwrap())
            .unwrap();

        let table = read_table(&store, "input/O_G_Equipment_Data.xlsx").unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.require("Cycle").unwrap().as_int().unwrap(), &[1, 2]);
        assert_eq!(
            table.require("Temperature").unwrap().as_float().unwrap(),
            &[40.5, 71.25]
        );
        assert_eq!(
            table.require("Fail").unwrap().data,
            ColumnData::Bool(vec![false, true])
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let store = OpendalStore::memory().unwrap();
        store.write("input/readings.json", b"{}").unwrap();
        assert!(matches!(
            read_table(&store, "input/readings.json"),
            Err(StorageError::UnsupportedFormat(_))
        ));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        coef: Vec<f64>,
        intercept: f64,
    }

    #[test]
    fn test_artifact_storage() {
        let store = OpendalStore::memory().unwrap();
        let weights = Weights {
            coef: vec![0.5, -1.25],
            intercept: 0.1,
        };
        write_artifact(&store, "refined/models/model.bin", &weights).unwrap();
        let loaded: Weights = read_artifact(&store, "refined/models/model.bin").unwrap();
        assert_eq!(loaded, weights);
    }
}
