//! Chart Plotter Module
//! Renders the yearly permit/handgun/long gun totals as a static line chart.

use crate::data::require_columns;
use crate::error::{PipelineError, Result};
use plotters::prelude::*;
use polars::prelude::{DataFrame, DataType};
use std::path::Path;

/// Output size in pixels.
pub const CHART_SIZE: (u32, u32) = (1000, 600);

const PERMIT_COLOR: RGBColor = RGBColor(0x00, 0x3f, 0x5c);
const HANDGUN_COLOR: RGBColor = RGBColor(0xbc, 0x50, 0x90);
const LONG_GUN_COLOR: RGBColor = RGBColor(0xff, 0xa6, 0x00);
const GRID_COLOR: RGBColor = RGBColor(200, 200, 200);

pub(crate) fn render_error<E: std::fmt::Display>(err: E) -> PipelineError {
    PipelineError::Render(err.to_string())
}

/// Encode an RGB buffer drawn by plotters as a PNG file.
pub(crate) fn save_png(buffer: Vec<u8>, (width, height): (u32, u32), path: &Path) -> Result<()> {
    let image = image::RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| PipelineError::Render("pixel buffer size mismatch".to_string()))?;
    image.save(path).map_err(render_error)
}

/// Yearly totals, sorted by year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearSeries {
    pub years: Vec<i32>,
    pub permit: Vec<f64>,
    pub handgun: Vec<f64>,
    pub long_gun: Vec<f64>,
}

impl YearSeries {
    /// Extract the series from a table with `year`, `permit`, `handgun` and `long_gun`.
    pub fn from_table(df: &DataFrame) -> Result<Self> {
        require_columns(df, &["year", "permit", "handgun", "long_gun"])?;

        let years = df.column("year")?.cast(&DataType::Int32)?;
        let values = |name: &str| -> Result<Vec<f64>> {
            let cast = df.column(name)?.cast(&DataType::Float64)?;
            Ok(cast.f64()?.into_iter().map(|v| v.unwrap_or(0.0)).collect())
        };
        let permit = values("permit")?;
        let handgun = values("handgun")?;
        let long_gun = values("long_gun")?;

        let mut rows: Vec<(i32, f64, f64, f64)> = Vec::with_capacity(df.height());
        for (i, year) in years.i32()?.into_iter().enumerate() {
            let year = year.ok_or_else(|| PipelineError::Format {
                column: "year".to_string(),
                row: i,
                value: String::new(),
            })?;
            rows.push((year, permit[i], handgun[i], long_gun[i]));
        }
        rows.sort_by_key(|r| r.0);

        Ok(Self {
            years: rows.iter().map(|r| r.0).collect(),
            permit: rows.iter().map(|r| r.1).collect(),
            handgun: rows.iter().map(|r| r.2).collect(),
            long_gun: rows.iter().map(|r| r.3).collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn title(&self) -> String {
        match (self.years.first(), self.years.last()) {
            (Some(first), Some(last)) => format!(
                "Time Evolution of Firearms and Permits in the US ({first}-{last})"
            ),
            _ => "Time Evolution of Firearms and Permits in the US".to_string(),
        }
    }

    pub fn max_value(&self) -> f64 {
        self.permit
            .iter()
            .chain(&self.handgun)
            .chain(&self.long_gun)
            .copied()
            .fold(0.0, f64::max)
    }

    fn points(&self, values: &[f64]) -> Vec<(i32, f64)> {
        self.years.iter().copied().zip(values.iter().copied()).collect()
    }
}

/// Creates the time evolution chart.
pub struct TimeSeriesPlotter;

impl TimeSeriesPlotter {
    /// Draw the chart and write it to `path` as PNG.
    pub fn render(series: &YearSeries, path: &Path) -> Result<()> {
        if series.is_empty() {
            return Err(PipelineError::EmptyInput("time series chart"));
        }
        let (width, height) = CHART_SIZE;
        let mut buffer = vec![0u8; (width * height * 3) as usize];
        Self::draw(series, &mut buffer)?;
        save_png(buffer, CHART_SIZE, path)
    }

    fn draw(series: &YearSeries, buffer: &mut [u8]) -> Result<()> {
        let root = BitMapBackend::with_buffer(buffer, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let first = series.years[0];
        let last = series.years[series.years.len() - 1].max(first + 1);
        let y_max = (series.max_value() * 1.05).max(1.0);

        let mut chart = ChartBuilder::on(&root)
            .caption(series.title(), ("sans-serif", 22))
            .margin(20)
            .x_label_area_size(45)
            .y_label_area_size(100)
            .build_cartesian_2d(first..last, 0f64..y_max)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("# Quantity")
            .x_labels(series.years.len())
            .x_label_formatter(&|year| year.to_string())
            .y_label_formatter(&|v| format!("{v:.0}"))
            .bold_line_style(GRID_COLOR.mix(0.6))
            .light_line_style(WHITE)
            .axis_style(BLACK.stroke_width(2))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(DashedLineSeries::new(
                series.points(&series.permit),
                8,
                5,
                PERMIT_COLOR.stroke_width(2),
            ))
            .map_err(render_error)?
            .label("Permits")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], PERMIT_COLOR));

        for (label, values, color) in [
            ("Handguns", &series.handgun, HANDGUN_COLOR),
            ("Long Guns", &series.long_gun, LONG_GUN_COLOR),
        ] {
            chart
                .draw_series(LineSeries::new(series.points(values), color.stroke_width(2)))
                .map_err(render_error)?
                .label(label)
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
        Ok(())
    }
}
