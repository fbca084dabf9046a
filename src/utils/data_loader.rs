//! Table loading and writing

use crate::error::{CrashRiskError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde_json::{Map, Value};
use std::fs::File;
use std::path::{Path, PathBuf};

/// CSV loader for crash and segment tables
pub struct DataLoader {
    /// Rows scanned for schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 1000,
        }
    }

    /// Set the number of rows used for schema inference
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n.max(1);
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CrashRiskError::DataError(format!(
                "file not found: {}",
                path.display()
            )));
        }

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
            .finish()
            .map_err(|e| CrashRiskError::DataError(format!("{}: {}", path.display(), e)))
    }
}

/// Writers for output tables
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path.as_ref())?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| CrashRiskError::DataError(e.to_string()))
    }

    /// Save as a JSON object keyed by row index, one record object per row
    pub fn save_index_json(df: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let records = index_records(df)?;
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(file, &Value::Object(records))?;
        Ok(())
    }
}

/// Build `{"0": {col: value, ...}, "1": {...}}` from a frame
pub fn index_records(df: &DataFrame) -> Result<Map<String, Value>> {
    let columns: Vec<(String, Vec<Value>)> = df
        .get_columns()
        .iter()
        .map(|c| Ok((c.name().to_string(), column_json_values(c)?)))
        .collect::<Result<_>>()?;

    let mut records = Map::with_capacity(df.height());
    for row in 0..df.height() {
        let mut record = Map::with_capacity(columns.len());
        for (name, values) in &columns {
            record.insert(name.clone(), values[row].clone());
        }
        records.insert(row.to_string(), Value::Object(record));
    }
    Ok(records)
}

fn column_json_values(column: &Column) -> Result<Vec<Value>> {
    let values = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
            .collect(),
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect(),
        dt if dt.is_integer() => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |i| Value::from(i)))
            .collect(),
        dt if dt.is_float() => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect(),
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
            .collect(),
    };
    Ok(values)
}

/// Read one column as `f64`, nulls as 0.0
pub fn column_to_f64(df: &DataFrame, name: &str) -> Result<Array1<f64>> {
    let column = df
        .column(name)
        .map_err(|_| CrashRiskError::FeatureNotFound(name.to_string()))?;
    let values: Vec<f64> = column
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    Ok(Array1::from_vec(values))
}

/// Gather the named columns into a row-major matrix
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Array1<f64>> = col_names
        .iter()
        .map(|name| column_to_f64(df, name))
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_data[c][r]))
}
