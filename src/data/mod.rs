//! Data module - CSV loading and processing

pub mod loader;
mod processor;

pub use loader::{column_names, numeric_columns, read_source, DataLoader};
pub use processor::{parse_year_month, require_columns, DataProcessor};
