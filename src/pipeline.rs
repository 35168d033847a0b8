//! Analysis pipeline
//! Runs every stage in order: load, normalize, split dates, aggregate, rank, filter
//! territories, merge populations, derive percentages, correct the outlier, render.

use crate::charts::{ChoroplethRenderer, StateBoundaries, TimeSeriesPlotter, YearSeries};
use crate::config::PipelineConfig;
use crate::data::{DataLoader, DataProcessor};
use crate::error::{PipelineError, Result};
use crate::stats::{percentage_column_name, wrap, OutlierAdjustment, RankedRow, StatsCalculator};
use polars::prelude::DataFrame;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Columns kept from the raw background-check file.
pub const COLUMNS_OF_INTEREST: [&str; 5] = ["month", "state", "permit", "handgun", "long_gun"];

/// Count columns summed and turned into percentages.
pub const COUNT_COLUMNS: [&str; 3] = ["permit", "handgun", "long_gun"];

pub const CHART_FILE: &str = "time_evolution.png";

const CHART_COMMENTARY: &str = "The amount of permits and firearms have been increasing over \
    the recent years. While the number of permits always stay below the sum of the number \
    of firearms, there is a direct correlation between the number of firearms and the number \
    of permits. Nevertheless, the Covid pandemic, which struck in 2020, led to a decrease in \
    both the number of firearms and the number of permits. This trend is in agreement with \
    the information about mass shootings, reported in: \
    https://cnnespanol.cnn.com/2024/02/15/cultura-armas-estados-unidos-mundo-trax/";

fn preview(stage: &str, df: &DataFrame) {
    debug!("{stage} ({} rows):\n{}", df.height(), df.head(Some(5)));
}

/// Sentence reporting the state and year holding a maximum.
pub fn maximum_sentence(label: &str, row: &RankedRow) -> String {
    format!(
        "The biggest number of {label} was registered in {} during the year {} with a total of {:.0} {label}.",
        row.field("state").unwrap_or("?"),
        row.field("year").unwrap_or("?"),
        row.value,
    )
}

/// Every intermediate table of one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Checks after normalization with `year` and without `month`.
    pub normalized: DataFrame,
    pub state_year: DataFrame,
    pub yearly: DataFrame,
    pub top_handgun: RankedRow,
    pub top_long_gun: RankedRow,
    /// Totals per state over all years, territories removed.
    pub states: DataFrame,
    pub percentages: DataFrame,
    pub outlier: OutlierAdjustment,
}

impl Analysis {
    /// The table the maps are drawn from.
    pub fn final_table(&self) -> &DataFrame {
        &self.outlier.table
    }
}

/// Files written by a full run.
#[derive(Debug, Clone)]
pub struct RunOutputs {
    pub chart: PathBuf,
    pub maps: Vec<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    loader: DataLoader,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            loader: DataLoader::new(),
        }
    }

    /// Rename `longgun`, keep the columns of interest, split `month` and drop it.
    pub fn normalize(raw: &DataFrame) -> Result<DataFrame> {
        let renamed = DataProcessor::rename(raw, "longgun", "long_gun")?;
        let clean = DataProcessor::select(&renamed, &COLUMNS_OF_INTEREST)?;
        info!(
            original = ?crate::data::column_names(raw),
            cleaned = ?crate::data::column_names(&clean),
            "columns selected"
        );
        let dated = DataProcessor::split_date(&clean, "month")?;
        preview("month split into year and month", &dated);
        let no_month = DataProcessor::drop_column(&dated, "month")?;
        preview("month column removed", &no_month);
        Ok(no_month)
    }

    /// Run every data stage on already loaded tables.
    pub fn analyze(&self, checks: &DataFrame, population: &DataFrame) -> Result<Analysis> {
        let normalized = Self::normalize(checks)?;

        let state_year = DataProcessor::group_sum(&normalized, &["state", "year"], &COUNT_COLUMNS)?;
        preview("grouped by state and year", &state_year);

        let top_handgun = StatsCalculator::argmax_report(&state_year, "handgun")?;
        info!("{}", maximum_sentence("handguns", &top_handgun));
        let top_long_gun = StatsCalculator::argmax_report(&state_year, "long_gun")?;
        info!("{}", maximum_sentence("long guns", &top_long_gun));

        let yearly = DataProcessor::group_sum(&normalized, &["year"], &COUNT_COLUMNS)?;
        if self.config.analysis {
            info!("\n{}", wrap(CHART_COMMENTARY, 79));
        }

        let by_state = DataProcessor::group_sum(&normalized, &["state"], &COUNT_COLUMNS)?;
        preview("grouped by state", &by_state);
        let states = DataProcessor::exclude_keys(
            &by_state,
            "state",
            self.config.excluded_territories.as_slice(),
        )?;

        let merged = DataProcessor::inner_join(&states, population, "state")?;
        preview("merged with population", &merged);

        let percentages = StatsCalculator::derive_percentages(
            &merged,
            &COUNT_COLUMNS,
            &self.config.population_column,
            self.config.precision,
        )?;
        preview("per-capita percentages", &percentages);

        let target = percentage_column_name("permit");
        let outlier = StatsCalculator::adjust_outlier(
            &percentages,
            "state",
            &self.config.outlier_state,
            &target,
        )?;
        info!(
            median = outlier.median_before,
            "mean of {target} before: {}, after replacing {}: {}",
            outlier.mean_before,
            self.config.outlier_state,
            outlier.mean_after
        );
        if let Some(text) = outlier.narrative(&self.config.outlier_state) {
            info!("conclusions:\n{text}");
        }

        Ok(Analysis {
            normalized,
            state_year,
            yearly,
            top_handgun,
            top_long_gun,
            states,
            percentages,
            outlier,
        })
    }

    /// Load both inputs, analyze them and write the chart and the three maps.
    ///
    /// The boundary document is fetched before anything is drawn, so a bad boundary source
    /// leaves the output directory untouched.
    pub fn run(&self) -> Result<RunOutputs> {
        let checks = self.loader.load(&self.config.checks_source)?;
        let population = self.loader.load(&self.config.population_source)?;
        let analysis = self.analyze(&checks, &population)?;
        let boundaries = StateBoundaries::load(&self.config.boundaries_source)?;

        let out_dir = &self.config.output_dir;
        fs::create_dir_all(out_dir)
            .map_err(|e| PipelineError::io(out_dir.display().to_string(), e))?;

        let chart = self.config.output_path(CHART_FILE);
        TimeSeriesPlotter::render(&YearSeries::from_table(&analysis.yearly)?, &chart)?;
        info!(path = %chart.display(), "time evolution chart written");
        if self.config.display_chart {
            if let Err(e) = open::that(&chart) {
                warn!(error = %e, "could not open chart viewer");
            }
        }

        let columns: Vec<String> = COUNT_COLUMNS
            .iter()
            .map(|c| percentage_column_name(c))
            .collect();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        let maps = ChoroplethRenderer::new(&boundaries).render_all(
            analysis.final_table(),
            &self.config.code_column,
            &columns,
            out_dir,
        )?;

        Ok(RunOutputs { chart, maps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use polars::prelude::*;

    #[test]
    fn normalize_produces_month_erased_schema() -> Result<()> {
        let raw = df!(
            "month" => ["2020-01", "2020-02"],
            "state" => ["Kentucky", "Kentucky"],
            "permit" => [10i64, 5],
            "permit_recheck" => [1i64, 1],
            "handgun" => [20i64, 5],
            "longgun" => [30i64, 5],
        )?;
        let normalized = Pipeline::normalize(&raw)?;
        assert_eq!(
            crate::data::column_names(&normalized),
            vec!["year", "state", "permit", "handgun", "long_gun"]
        );
        Ok(())
    }

    #[test]
    fn kentucky_scenario_aggregates_to_one_row() -> Result<()> {
        let raw = df!(
            "month" => ["2020-01", "2020-02"],
            "state" => ["KY", "KY"],
            "permit" => [10i64, 5],
            "handgun" => [20i64, 5],
            "long_gun" => [30i64, 5],
        )?;
        let normalized = Pipeline::normalize(&raw)?;
        let grouped = DataProcessor::group_sum(&normalized, &["state", "year"], &COUNT_COLUMNS)?;

        assert_eq!(grouped.height(), 1);
        assert_eq!(grouped.column("state")?.str()?.get(0), Some("KY"));
        assert_eq!(grouped.column("year")?.str()?.get(0), Some("2020"));
        assert_eq!(grouped.column("permit")?.i64()?.get(0), Some(15));
        assert_eq!(grouped.column("handgun")?.i64()?.get(0), Some(25));
        assert_eq!(grouped.column("long_gun")?.i64()?.get(0), Some(35));
        Ok(())
    }

    #[test]
    fn maximum_sentence_names_state_and_year() {
        let row = RankedRow {
            index: 0,
            value: 40.0,
            fields: vec![
                ("state".to_string(), "Alabama".to_string()),
                ("year".to_string(), "2016".to_string()),
            ],
        };
        assert_eq!(
            maximum_sentence("handguns", &row),
            "The biggest number of handguns was registered in Alabama during the year 2016 \
             with a total of 40 handguns."
        );
    }
}
