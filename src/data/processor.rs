//! Data Processor Module
//! Column normalization, date splitting, aggregation, filtering and joining.
//!
//! Every operation borrows its input and returns a new DataFrame; nothing is modified
//! in place.

use crate::data::loader::numeric_columns;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{info, warn};

/// Fail with a schema error unless every column exists.
pub fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(PipelineError::Schema(name.to_string()));
        }
    }
    Ok(())
}

/// Split a `YYYY-MM` value into its year and month parts.
pub fn parse_year_month(value: &str) -> Option<(&str, &str)> {
    let (year, month) = value.split_once('-')?;
    let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if digits(year, 4) && digits(month, 2) {
        Some((year, month))
    } else {
        None
    }
}

/// Handles table reshaping operations.
pub struct DataProcessor;

impl DataProcessor {
    /// Project onto `columns`, in the order given.
    pub fn select(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        require_columns(df, columns)?;
        Ok(df.select(columns.iter().copied())?)
    }

    /// Rename `from` to `to`.
    ///
    /// An absent `from` column leaves the table untouched and logs a warning, which keeps
    /// `longgun → long_gun` harmless on files that already use the new name.
    pub fn rename(df: &DataFrame, from: &str, to: &str) -> Result<DataFrame> {
        if from == to {
            return Ok(df.clone());
        }
        if df.column(from).is_err() {
            warn!(from, to, "rename skipped: source column not present");
            return Ok(df.clone());
        }
        if df.column(to).is_ok() {
            return Err(PipelineError::Collision {
                column: to.to_string(),
            });
        }

        let mut renamed = df.clone();
        renamed.rename(from, to.into())?;
        Ok(renamed)
    }

    /// Apply several renames in order.
    pub fn rename_all(df: &DataFrame, mapping: &[(&str, &str)]) -> Result<DataFrame> {
        mapping
            .iter()
            .try_fold(df.clone(), |acc, (from, to)| Self::rename(&acc, from, to))
    }

    /// Split a `YYYY-MM` column: a `year` column is inserted right before it and the
    /// column itself keeps only the month digits.
    pub fn split_date(df: &DataFrame, column: &str) -> Result<DataFrame> {
        require_columns(df, &[column])?;
        if df.column("year").is_ok() {
            return Err(PipelineError::Collision {
                column: "year".to_string(),
            });
        }

        let values = df.column(column)?.str()?;
        let mut years: Vec<String> = Vec::with_capacity(df.height());
        let mut months: Vec<String> = Vec::with_capacity(df.height());

        for (row, value) in values.into_iter().enumerate() {
            let raw = value.unwrap_or_default();
            let (year, month) = parse_year_month(raw).ok_or_else(|| PipelineError::Format {
                column: column.to_string(),
                row,
                value: raw.to_string(),
            })?;
            years.push(year.to_string());
            months.push(month.to_string());
        }

        let mut columns: Vec<Column> = Vec::with_capacity(df.width() + 1);
        let mut months = Some(months);
        for existing in df.get_columns() {
            if existing.name().as_str() == column {
                columns.push(Column::new("year".into(), std::mem::take(&mut years)));
                columns.push(Column::new(column.into(), months.take().unwrap_or_default()));
            } else {
                columns.push(existing.clone());
            }
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Remove one column.
    pub fn drop_column(df: &DataFrame, column: &str) -> Result<DataFrame> {
        require_columns(df, &[column])?;
        Ok(df.drop(column)?)
    }

    /// Sum `values` within each distinct combination of `keys`.
    ///
    /// Output columns are `keys` followed by `values`; rows come out in first-occurrence
    /// order of their key. Nulls contribute zero; a value column that was not inferred as
    /// numeric is a parse error rather than a silent cast.
    pub fn group_sum(df: &DataFrame, keys: &[&str], values: &[&str]) -> Result<DataFrame> {
        require_columns(df, keys)?;
        require_columns(df, values)?;
        let numeric = numeric_columns(df);
        if let Some(text) = values.iter().find(|v| !numeric.iter().any(|n| n.as_str() == **v)) {
            let dtype = df.column(text)?.dtype().clone();
            return Err(PipelineError::parse(
                *text,
                format!("count column has non-numeric values (inferred {dtype})"),
            ));
        }

        let by: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
        let sums: Vec<Expr> = values
            .iter()
            .map(|v| {
                let column = col(*v);
                match df.column(v).map(|c| c.dtype().clone()) {
                    Ok(DataType::Float32) | Ok(DataType::Float64) => {
                        column.cast(DataType::Float64).sum()
                    }
                    _ => column.cast(DataType::Int64).sum(),
                }
            })
            .collect();

        let grouped = df.clone().lazy().group_by_stable(by).agg(sums).collect()?;
        info!(
            keys = ?keys,
            rows_in = df.height(),
            groups = grouped.height(),
            "aggregated table"
        );
        Ok(grouped)
    }

    /// Number of distinct non-null values in a string column.
    pub fn distinct_count(df: &DataFrame, key: &str) -> Result<usize> {
        require_columns(df, &[key])?;
        let values = df.column(key)?.str()?;
        let distinct: HashSet<&str> = values.into_iter().flatten().collect();
        Ok(distinct.len())
    }

    /// Drop every row whose `key` value is one of `excluded`.
    pub fn exclude_keys<S: AsRef<str>>(
        df: &DataFrame,
        key: &str,
        excluded: &[S],
    ) -> Result<DataFrame> {
        require_columns(df, &[key])?;
        let excluded: HashSet<&str> = excluded.iter().map(|s| s.as_ref()).collect();

        let mask: BooleanChunked = df
            .column(key)?
            .str()?
            .into_iter()
            .map(|value| value.map_or(true, |v| !excluded.contains(v)))
            .collect();
        let kept = df.filter(&mask)?;

        info!(
            key,
            before = Self::distinct_count(df, key)?,
            after = Self::distinct_count(&kept, key)?,
            "distinct values before/after exclusion"
        );
        Ok(kept)
    }

    /// Inner join on a single key column.
    ///
    /// Non-key columns of `right` that already exist in `left` get a `_right` suffix
    /// (`_right2`, `_right3`, ... if that name is taken too). Left row order is kept.
    pub fn inner_join(left: &DataFrame, right: &DataFrame, on: &str) -> Result<DataFrame> {
        require_columns(left, &[on])?;
        require_columns(right, &[on])?;

        let mut taken: HashSet<String> = left
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut right = right.clone();
        let right_names: Vec<String> = right
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for name in right_names.iter().filter(|n| n.as_str() != on) {
            if taken.contains(name) {
                let mut candidate = format!("{name}_right");
                let mut n = 2;
                while taken.contains(&candidate) || right_names.contains(&candidate) {
                    candidate = format!("{name}_right{n}");
                    n += 1;
                }
                right.rename(name, candidate.as_str().into())?;
                taken.insert(candidate);
            } else {
                taken.insert(name.clone());
            }
        }

        let right_rows = right.height();
        let mut args = JoinArgs::new(JoinType::Inner);
        args.maintain_order = MaintainOrderJoin::Left;
        let joined = left
            .clone()
            .lazy()
            .join(right.lazy(), [col(on)], [col(on)], args)
            .collect()?;

        info!(
            on,
            left_rows = left.height(),
            right_rows,
            joined_rows = joined.height(),
            "joined tables"
        );
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{column_names, DataLoader};
    use anyhow::Result;

    fn checks() -> Result<DataFrame> {
        Ok(df!(
            "month" => ["2020-01", "2020-02", "2021-01", "2020-01"],
            "state" => ["Kentucky", "Kentucky", "Kentucky", "Alabama"],
            "permit" => [10i64, 5, 7, 1],
            "permit_recheck" => [0i64, 0, 0, 0],
            "handgun" => [20i64, 5, 1, 2],
            "longgun" => [30i64, 5, 2, 3],
        )?)
    }

    #[test]
    fn select_keeps_requested_order() -> Result<()> {
        let df = DataProcessor::select(&checks()?, &["state", "month"])?;
        assert_eq!(column_names(&df), vec!["state", "month"]);
        Ok(())
    }

    #[test]
    fn select_missing_column_is_schema_error() -> Result<()> {
        let err = DataProcessor::select(&checks()?, &["month", "long_gun"]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref c) if c == "long_gun"));
        Ok(())
    }

    #[test]
    fn rename_renames_and_leaves_input_untouched() -> Result<()> {
        let raw = checks()?;
        let renamed = DataProcessor::rename(&raw, "longgun", "long_gun")?;
        assert!(renamed.column("long_gun").is_ok());
        assert!(renamed.column("longgun").is_err());
        assert!(raw.column("longgun").is_ok());
        Ok(())
    }

    #[test]
    fn rename_is_idempotent_when_source_absent() -> Result<()> {
        let once = DataProcessor::rename(&checks()?, "longgun", "long_gun")?;
        let twice = DataProcessor::rename(&once, "longgun", "long_gun")?;
        assert!(once.equals(&twice));
        Ok(())
    }

    #[test]
    fn rename_onto_existing_column_is_rejected() -> Result<()> {
        let err = DataProcessor::rename(&checks()?, "handgun", "permit").unwrap_err();
        assert!(matches!(err, PipelineError::Collision { .. }));
        Ok(())
    }

    #[test]
    fn select_rename_select_round_trip() -> Result<()> {
        let original = ["month", "state", "longgun"];
        let selected = DataProcessor::select(&checks()?, &original)?;
        let renamed = DataProcessor::rename_all(
            &selected,
            &[("month", "period"), ("longgun", "long_gun")],
        )?;
        let restored = DataProcessor::rename_all(
            &renamed,
            &[("period", "month"), ("long_gun", "longgun")],
        )?;
        let reselected = DataProcessor::select(&restored, &original)?;
        assert_eq!(column_names(&reselected), original);
        assert!(reselected.equals(&selected));
        Ok(())
    }

    #[test]
    fn split_date_inserts_year_before_month() -> Result<()> {
        let df = DataProcessor::select(&checks()?, &["month", "state", "permit"])?;
        let split = DataProcessor::split_date(&df, "month")?;
        assert_eq!(column_names(&split), vec!["year", "month", "state", "permit"]);

        let years: Vec<_> = split.column("year")?.str()?.into_iter().flatten().collect();
        let months: Vec<_> = split.column("month")?.str()?.into_iter().flatten().collect();
        assert_eq!(years, vec!["2020", "2020", "2021", "2020"]);
        assert_eq!(months, vec!["01", "02", "01", "01"]);
        Ok(())
    }

    #[test]
    fn split_date_rejects_malformed_values() -> Result<()> {
        for bad in ["2020/01", "2020-1", "20-01-01", "abcd-ef", ""] {
            let df = df!("month" => [bad], "state" => ["Kentucky"])?;
            let err = DataProcessor::split_date(&df, "month").unwrap_err();
            assert!(
                matches!(err, PipelineError::Format { row: 0, .. }),
                "{bad:?} should be rejected"
            );
        }
        Ok(())
    }

    #[test]
    fn drop_column_removes_month() -> Result<()> {
        let split = DataProcessor::split_date(&checks()?, "month")?;
        let dropped = DataProcessor::drop_column(&split, "month")?;
        assert!(dropped.column("month").is_err());
        assert!(matches!(
            DataProcessor::drop_column(&dropped, "month").unwrap_err(),
            PipelineError::Schema(_)
        ));
        Ok(())
    }

    #[test]
    fn group_sum_conserves_totals() -> Result<()> {
        let df = DataProcessor::split_date(&checks()?, "month")?;
        let grouped =
            DataProcessor::group_sum(&df, &["state", "year"], &["permit", "handgun", "longgun"])?;

        assert_eq!(
            column_names(&grouped),
            vec!["state", "year", "permit", "handgun", "longgun"]
        );
        assert_eq!(grouped.height(), 3);
        for value in ["permit", "handgun", "longgun"] {
            let before: i64 = df.column(value)?.i64()?.into_iter().flatten().sum();
            let after: i64 = grouped.column(value)?.i64()?.into_iter().flatten().sum();
            assert_eq!(before, after, "{value} total changed");
        }
        Ok(())
    }

    #[test]
    fn group_sum_rejects_text_in_count_column() -> Result<()> {
        let csv = b"state,permit\nKentucky,10\nKentucky,N/A\nKentucky,5\n".to_vec();
        let df = DataLoader::new().parse("checks.csv", csv)?;
        assert_eq!(df.column("permit")?.dtype(), &DataType::String);

        let err = DataProcessor::group_sum(&df, &["state"], &["permit"]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Parse { ref source_name, .. } if source_name == "permit"
        ));
        Ok(())
    }

    #[test]
    fn group_sum_missing_key_is_schema_error() -> Result<()> {
        let err = DataProcessor::group_sum(&checks()?, &["year"], &["permit"]).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref c) if c == "year"));
        Ok(())
    }

    #[test]
    fn exclude_keys_removes_only_named_values() -> Result<()> {
        let df = df!(
            "state" => ["Kentucky", "Guam", "Guam"],
            "permit" => [1i64, 2, 3],
        )?;
        let excluded = ["Guam", "Mariana Islands", "Puerto Rico", "Virgin Islands"];
        let once = DataProcessor::exclude_keys(&df, "state", &excluded)?;
        assert_eq!(DataProcessor::distinct_count(&once, "state")?, 1);
        assert_eq!(once.height(), 1);

        let twice = DataProcessor::exclude_keys(&once, "state", &excluded)?;
        assert!(twice.equals(&once));
        Ok(())
    }

    #[test]
    fn inner_join_drops_unmatched_and_suffixes_collisions() -> Result<()> {
        let left = df!(
            "state" => ["Kentucky", "Alabama", "Guam"],
            "permit" => [15i64, 4, 1],
        )?;
        let right = df!(
            "state" => ["Alabama", "Kentucky", "Ohio"],
            "code" => ["AL", "KY", "OH"],
            "permit" => [0i64, 0, 0],
        )?;

        let joined = DataProcessor::inner_join(&left, &right, "state")?;
        assert_eq!(
            column_names(&joined),
            vec!["state", "permit", "code", "permit_right"]
        );
        let states: Vec<_> = joined.column("state")?.str()?.into_iter().flatten().collect();
        assert_eq!(states, vec!["Kentucky", "Alabama"]);
        let codes: Vec<_> = joined.column("code")?.str()?.into_iter().flatten().collect();
        assert_eq!(codes, vec!["KY", "AL"]);
        Ok(())
    }

    #[test]
    fn inner_join_requires_key_on_both_sides() -> Result<()> {
        let left = df!("state" => ["Kentucky"])?;
        let right = df!("name" => ["Kentucky"])?;
        let err = DataProcessor::inner_join(&left, &right, "state").unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
        Ok(())
    }
}
