//! Stats module - Ranking, percentages and outlier correction

mod calculator;

pub use calculator::{
    cell_to_string, percentage_column_name, round_half_even, wrap, OutlierAdjustment, RankedRow,
    StatsCalculator, DEFAULT_PRECISION, MEAN_PRECISION,
};
