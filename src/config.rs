//! Pipeline configuration.
//!
//! Every field has a default so an empty JSON object (or no file at all) runs the
//! analysis against the bundled `./Data` directory.

use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "FIREARM_CHECKS_CONFIG";

pub const DEFAULT_CHECKS_SOURCE: &str = "./Data/nics-firearm-background-checks.csv";
pub const DEFAULT_POPULATION_SOURCE: &str = "./Data/us-state-populations.csv";
pub const DEFAULT_BOUNDARIES_SOURCE: &str =
    "https://raw.githubusercontent.com/python-visualization/folium/main/examples/data/us-states.json";

/// Territories reported by NICS that have no population row.
pub const TERRITORIES: [&str; 4] = ["Guam", "Mariana Islands", "Puerto Rico", "Virgin Islands"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Background-check CSV, local path or http(s) URL.
    pub checks_source: String,
    /// State population CSV, local path or http(s) URL.
    pub population_source: String,
    /// GeoJSON state boundaries keyed by two-letter code.
    pub boundaries_source: String,
    pub output_dir: PathBuf,
    pub population_column: String,
    pub code_column: String,
    pub outlier_state: String,
    pub excluded_territories: Vec<String>,
    pub precision: u32,
    /// Open the time-series chart in the system viewer once written.
    pub display_chart: bool,
    /// Log the commentary paragraph that accompanies the time-series chart.
    pub analysis: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checks_source: DEFAULT_CHECKS_SOURCE.to_string(),
            population_source: DEFAULT_POPULATION_SOURCE.to_string(),
            boundaries_source: DEFAULT_BOUNDARIES_SOURCE.to_string(),
            output_dir: PathBuf::from("."),
            population_column: "pop_2014".to_string(),
            code_column: "code".to_string(),
            outlier_state: "Kentucky".to_string(),
            excluded_territories: TERRITORIES.iter().map(|s| s.to_string()).collect(),
            precision: 3,
            display_chart: false,
            analysis: false,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Load from the file named by [`CONFIG_ENV_VAR`], or fall back to defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}
