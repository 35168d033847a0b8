//! Error taxonomy shared by every pipeline stage.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read {source_name}: {reason}")]
    Io { source_name: String, reason: String },
    #[error("Failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },
    #[error("Malformed value {value:?} in column '{column}' at row {row}: expected YYYY-MM")]
    Format {
        column: String,
        row: usize,
        value: String,
    },
    #[error("Missing column '{0}'")]
    Schema(String),
    #[error("Column '{column}' collides with an existing column")]
    Collision { column: String },
    #[error("Population in column '{column}' is zero or missing at row {row}")]
    Division { column: String, row: usize },
    #[error("Operation '{0}' requires at least one row")]
    EmptyInput(&'static str),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Io {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}
