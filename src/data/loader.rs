//! CSV Data Loader Module
//! Reads a delimited table from a local path or an http(s) URL into a Polars DataFrame.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs;
use std::io::Cursor;
use tracing::{debug, info};

/// Rows sampled when inferring column types.
pub const INFER_SCHEMA_ROWS: usize = 10_000;

/// Returns true when `source` should be fetched over HTTP rather than read from disk.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Read the raw bytes behind a path or URL.
pub fn read_source(source: &str) -> Result<Vec<u8>> {
    if is_remote(source) {
        let response = reqwest::blocking::get(source)
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::io(source, e))?;
        let bytes = response.bytes().map_err(|e| PipelineError::io(source, e))?;
        Ok(bytes.to_vec())
    } else {
        fs::read(source).map_err(|e| PipelineError::io(source, e))
    }
}

/// Handles CSV loading with Polars.
pub struct DataLoader {
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: INFER_SCHEMA_ROWS,
        }
    }

    /// Load a CSV file from a path or URL and log a preview of it.
    pub fn load(&self, source: &str) -> Result<DataFrame> {
        let bytes = read_source(source)?;
        let df = self.parse(source, bytes)?;
        Self::log_preview(source, &df);
        Ok(df)
    }

    /// Parse CSV bytes. `source` is only used in error messages.
    pub fn parse(&self, source: &str, bytes: Vec<u8>) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| PipelineError::parse(source, e))?;

        if df.height() == 0 {
            return Err(PipelineError::EmptyInput("load"));
        }
        Ok(df)
    }

    fn log_preview(source: &str, df: &DataFrame) {
        let schema: Vec<String> = df
            .get_columns()
            .iter()
            .map(|col| format!("{}: {}", col.name(), col.dtype()))
            .collect();
        info!(
            source,
            rows = df.height(),
            columns = df.width(),
            "loaded table; schema [{}]",
            schema.join(", ")
        );
        debug!("first five rows of {}:\n{}", source, df.head(Some(5)));
    }
}

/// Get list of column names.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Get list of numeric column names.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| {
            matches!(
                col.dtype(),
                DataType::Float32
                    | DataType::Float64
                    | DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
            )
        })
        .map(|col| col.name().to_string())
        .collect()
}
