//! Statistics Calculator Module
//! Row ranking, per-capita percentages and the single-state outlier correction.

use crate::data::require_columns;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use statrs::statistics::{Data, Median, Statistics};
use tracing::{info, warn};

/// Decimal places kept for derived percentage columns.
pub const DEFAULT_PRECISION: u32 = 3;

/// Decimal places kept for the outlier means.
pub const MEAN_PRECISION: u32 = 2;

/// Width of the wrapped conclusion paragraph.
const NARRATIVE_WIDTH: usize = 79;

/// Round to `decimals` places, ties to even, on the scaled binary value.
pub fn round_half_even(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

/// Name of the percentage column derived from a count column
/// (`long_gun` becomes `longgun_perc`).
pub fn percentage_column_name(count_column: &str) -> String {
    format!("{}_perc", count_column.replace('_', ""))
}

/// Render one cell as plain text.
pub fn cell_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

/// Values of a numeric column as f64; nulls stay `None`.
fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let cast = df.column(column)?.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// The row holding the largest value of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub index: usize,
    pub value: f64,
    /// Every column of the row, in table order, rendered as text.
    pub fields: Vec<(String, String)>,
}

impl RankedRow {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Result of replacing one entity's value with the cross-row mean.
#[derive(Debug, Clone)]
pub struct OutlierAdjustment {
    pub table: DataFrame,
    pub mean_before: f64,
    pub mean_after: f64,
    /// `|after - before| / before`, 0 when nothing changed.
    pub relative_change: f64,
    pub median_before: f64,
    pub rows_adjusted: usize,
}

impl OutlierAdjustment {
    pub fn changed(&self) -> bool {
        self.mean_after != self.mean_before
    }

    /// Conclusion paragraph, or `None` when the mean did not move.
    pub fn narrative(&self, entity: &str) -> Option<String> {
        if !self.changed() {
            return None;
        }
        let percent = round_half_even(self.relative_change, 2) * 100.0;
        let text = format!(
            "The new mean is {percent:?}% different than the mean containing the outlier, \
             corresponding to the state of {entity}. The mean is a statistical metric that \
             can be prone to significant variations when accounting for outlying values. \
             In contrast, the median is a more robust metric to measure central tendency of \
             the data. Therefore, care must be taken when using the mean to extract \
             conclusions."
        );
        Some(wrap(&text, NARRATIVE_WIDTH))
    }
}

/// Greedy word wrap.
pub fn wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

/// Handles the numeric derivations of the analysis.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Find the row with the largest `value_column`; ties go to the first row. Nulls and
    /// NaN never win.
    pub fn argmax_report(df: &DataFrame, value_column: &str) -> Result<RankedRow> {
        require_columns(df, &[value_column])?;
        if df.height() == 0 {
            return Err(PipelineError::EmptyInput("argmax_report"));
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, value) in float_values(df, value_column)?.into_iter().enumerate() {
            let Some(value) = value.filter(|v| !v.is_nan()) else {
                continue;
            };
            match best {
                Some((_, top)) if value <= top => {}
                _ => best = Some((index, value)),
            }
        }
        let (index, value) = best.ok_or(PipelineError::EmptyInput("argmax_report"))?;

        let fields = df
            .get_columns()
            .iter()
            .map(|col| {
                let cell = col.get(index)?;
                Ok((col.name().to_string(), cell_to_string(&cell)))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(column = value_column, row = index, value, "maximum located");
        Ok(RankedRow {
            index,
            value,
            fields,
        })
    }

    /// Append `{count}_perc = round(100 * count / population, precision)` for each
    /// count column.
    pub fn derive_percentages(
        df: &DataFrame,
        count_columns: &[&str],
        population_column: &str,
        precision: u32,
    ) -> Result<DataFrame> {
        require_columns(df, count_columns)?;
        require_columns(df, &[population_column])?;

        let population = float_values(df, population_column)?;
        if let Some(row) = population
            .iter()
            .position(|p| p.map_or(true, |p| p == 0.0 || p.is_nan()))
        {
            return Err(PipelineError::Division {
                column: population_column.to_string(),
                row,
            });
        }

        let mut columns: Vec<Column> = df.get_columns().to_vec();
        for count_column in count_columns {
            let percentages: Vec<Option<f64>> = float_values(df, count_column)?
                .into_iter()
                .zip(&population)
                .map(|(count, pop)| {
                    let pop = pop.unwrap_or(f64::NAN);
                    count.map(|c| round_half_even(100.0 * c / pop, precision))
                })
                .collect();
            columns.push(Column::new(
                percentage_column_name(count_column).into(),
                percentages,
            ));
        }

        let derived = DataFrame::new(columns)?;
        info!(
            counts = ?count_columns,
            population = population_column,
            precision,
            "derived per-capita percentages"
        );
        Ok(derived)
    }

    /// Overwrite `target_column` on the rows where `key_column == key_value` with the
    /// mean of `target_column` over all rows (outlier included), then recompute the mean.
    pub fn adjust_outlier(
        df: &DataFrame,
        key_column: &str,
        key_value: &str,
        target_column: &str,
    ) -> Result<OutlierAdjustment> {
        require_columns(df, &[key_column, target_column])?;
        if df.height() == 0 {
            return Err(PipelineError::EmptyInput("adjust_outlier"));
        }

        let before = float_values(df, target_column)?;
        let present: Vec<f64> = before.iter().flatten().copied().collect();
        let mean_before = round_half_even(present.iter().mean(), MEAN_PRECISION);
        let median_before = Data::new(present).median();

        let matches: Vec<bool> = df
            .column(key_column)?
            .str()?
            .into_iter()
            .map(|k| k == Some(key_value))
            .collect();
        let rows_adjusted = matches.iter().filter(|m| **m).count();
        if rows_adjusted == 0 {
            warn!(key = key_column, value = key_value, "no row to adjust");
        }

        let after: Vec<Option<f64>> = before
            .iter()
            .zip(&matches)
            .map(|(value, hit)| if *hit { Some(mean_before) } else { *value })
            .collect();
        let mean_after = round_half_even(after.iter().flatten().mean(), MEAN_PRECISION);

        let columns: Vec<Column> = df
            .get_columns()
            .iter()
            .map(|col| {
                if col.name().as_str() == target_column {
                    Column::new(target_column.into(), after.clone())
                } else {
                    col.clone()
                }
            })
            .collect();
        let table = DataFrame::new(columns)?;

        let relative_change = if mean_before != 0.0 {
            ((mean_after - mean_before) / mean_before).abs()
        } else {
            0.0
        };

        info!(
            column = target_column,
            entity = key_value,
            mean_before,
            mean_after,
            rows_adjusted,
            "outlier replaced with mean"
        );
        Ok(OutlierAdjustment {
            table,
            mean_before,
            mean_after,
            relative_change,
            median_before,
            rows_adjusted,
        })
    }
}
