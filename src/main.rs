//! Firearm Checks - runs the full analysis with the configured inputs.

use anyhow::{Context, Result};
use firearm_checks::{Pipeline, PipelineConfig};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let config = PipelineConfig::from_env().context("loading configuration")?;
    info!(
        checks = %config.checks_source,
        population = %config.population_source,
        "starting analysis"
    );

    let outputs = Pipeline::new(config).run().context("running analysis")?;
    info!(
        chart = %outputs.chart.display(),
        maps = outputs.maps.len(),
        "analysis finished"
    );
    Ok(())
}
