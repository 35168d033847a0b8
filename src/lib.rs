//! Firearm Checks - NICS background-check analysis
//!
//! Aggregates monthly background checks by state and year, merges them with state
//! populations, derives per-capita percentages and renders a time-series chart and
//! choropleth maps.

pub mod charts;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Analysis, Pipeline, RunOutputs};
