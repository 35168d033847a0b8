//! Choropleth Map Renderer
//! Shades each state by one percentage column and writes the map as a PNG.
//!
//! Layout:
//! 1. States drawn with an equirectangular projection of the configured view
//! 2. Fill from a six-class YlGn scale, equal-width bins over the column's range
//! 3. Legend bar with bin edges and the legend title in the upper right corner

use crate::charts::geo::{MapView, StateBoundaries};
use crate::charts::plotter::{render_error, save_png};
use crate::data::require_columns;
use crate::error::{PipelineError, Result};
use plotters::prelude::*;
use polars::prelude::{DataFrame, DataType};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Map width in pixels; the height follows from the view.
pub const MAP_WIDTH: u32 = 1200;

/// ColorBrewer YlGn, six classes.
pub const YL_GN: [RGBColor; 6] = [
    RGBColor(0xff, 0xff, 0xcc),
    RGBColor(0xd9, 0xf0, 0xa3),
    RGBColor(0xad, 0xdd, 0x8e),
    RGBColor(0x78, 0xc6, 0x79),
    RGBColor(0x31, 0xa3, 0x54),
    RGBColor(0x00, 0x68, 0x37),
];

const FILL_OPACITY: f64 = 0.7;
const LINE_OPACITY: f64 = 0.1;
const NO_DATA: RGBColor = RGBColor(220, 220, 220);

/// Legend title: `permit_perc` reads "permit percentage (%)".
pub fn legend_title(column: &str) -> String {
    format!("{}entage (%)", column.split('_').collect::<Vec<_>>().join(" "))
}

/// Equal-width bins over `[min, max]`, one color per bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f64,
    pub max: f64,
}

impl ColorScale {
    /// Scale spanning the finite values given; `None` when there are none.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<Self> {
        let mut finite = values.into_iter().copied().filter(|v| v.is_finite()).peekable();
        finite.peek()?;
        let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        Some(Self { min, max })
    }

    /// Index of the bin holding `value`; the top edge belongs to the last bin.
    pub fn bin(&self, value: f64) -> usize {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0;
        }
        let position = ((value - self.min) / span * YL_GN.len() as f64).floor();
        (position.max(0.0) as usize).min(YL_GN.len() - 1)
    }

    pub fn color(&self, value: f64) -> RGBColor {
        YL_GN[self.bin(value)]
    }

    /// The `bins + 1` edges of the scale.
    pub fn edges(&self) -> Vec<f64> {
        let step = (self.max - self.min) / YL_GN.len() as f64;
        (0..=YL_GN.len())
            .map(|i| self.min + step * i as f64)
            .collect()
    }
}

/// Renders one choropleth image per column.
pub struct ChoroplethRenderer<'a> {
    boundaries: &'a StateBoundaries,
    view: MapView,
}

impl<'a> ChoroplethRenderer<'a> {
    pub fn new(boundaries: &'a StateBoundaries) -> Self {
        Self {
            boundaries,
            view: MapView::default(),
        }
    }

    /// State code → value for one column. Rows with a null code or value are skipped.
    pub fn values_by_code(
        df: &DataFrame,
        code_column: &str,
        value_column: &str,
    ) -> Result<HashMap<String, f64>> {
        require_columns(df, &[code_column, value_column])?;
        let codes = df.column(code_column)?.str()?;
        let values = df.column(value_column)?.cast(&DataType::Float64)?;
        Ok(codes
            .into_iter()
            .zip(values.f64()?.into_iter())
            .filter_map(|(code, value)| Some((code?.to_string(), value?)))
            .collect())
    }

    /// Write `{column}.png` into `out_dir` for every column and return the paths.
    pub fn render_all(
        &self,
        df: &DataFrame,
        code_column: &str,
        columns: &[&str],
        out_dir: &Path,
    ) -> Result<Vec<std::path::PathBuf>> {
        for column in columns {
            require_columns(df, &[code_column, *column])?;
        }
        columns
            .iter()
            .map(|column| {
                let path = out_dir.join(format!("{column}.png"));
                self.render(df, code_column, column, &path)?;
                Ok(path)
            })
            .collect()
    }

    /// Draw the map for one column.
    pub fn render(
        &self,
        df: &DataFrame,
        code_column: &str,
        value_column: &str,
        path: &Path,
    ) -> Result<()> {
        let values = Self::values_by_code(df, code_column, value_column)?;
        let scale = ColorScale::from_values(values.values())
            .ok_or(PipelineError::EmptyInput("choropleth map"))?;

        let unmatched: Vec<&String> = values
            .keys()
            .filter(|code| self.boundaries.get(code).is_none())
            .collect();
        if !unmatched.is_empty() {
            warn!(column = value_column, codes = ?unmatched, "codes without boundary");
        }

        let size = (MAP_WIDTH, self.view.height_for_width(MAP_WIDTH));
        let mut buffer = vec![0u8; (size.0 * size.1 * 3) as usize];
        self.draw(&values, &scale, value_column, size, &mut buffer)?;
        save_png(buffer, size, path)?;

        info!(
            column = value_column,
            path = %path.display(),
            min = scale.min,
            max = scale.max,
            "choropleth written"
        );
        Ok(())
    }

    fn draw(
        &self,
        values: &HashMap<String, f64>,
        scale: &ColorScale,
        value_column: &str,
        size: (u32, u32),
        buffer: &mut [u8],
    ) -> Result<()> {
        let root = BitMapBackend::with_buffer(buffer, size).into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;
        self.draw_states(&root, values, scale)?;
        Self::draw_legend(&root, scale, value_column, size)?;
        root.present().map_err(render_error)?;
        Ok(())
    }

    /// Fill every state polygon and stroke its rings, without any text.
    fn draw_states<DB: DrawingBackend>(
        &self,
        root: &DrawingArea<DB, plotters::coord::Shift>,
        values: &HashMap<String, f64>,
        scale: &ColorScale,
    ) -> Result<()> {
        let mut chart = ChartBuilder::on(root)
            .margin(0)
            .build_cartesian_2d(self.view.lon.clone(), self.view.lat.clone())
            .map_err(render_error)?;

        for state in &self.boundaries.states {
            let fill = values
                .get(&state.code)
                .map(|v| scale.color(*v))
                .unwrap_or(NO_DATA);
            for polygon in &state.polygons {
                let Some(exterior) = polygon.first() else {
                    continue;
                };
                chart
                    .draw_series(std::iter::once(Polygon::new(
                        exterior.clone(),
                        fill.mix(FILL_OPACITY).filled(),
                    )))
                    .map_err(render_error)?;
                chart
                    .draw_series(polygon.iter().map(|ring| {
                        PathElement::new(ring.clone(), BLACK.mix(LINE_OPACITY).stroke_width(1))
                    }))
                    .map_err(render_error)?;
            }
        }
        Ok(())
    }

    fn draw_legend<DB: DrawingBackend>(
        root: &DrawingArea<DB, plotters::coord::Shift>,
        scale: &ColorScale,
        value_column: &str,
        (width, _): (u32, u32),
    ) -> Result<()> {
        let cell = 50;
        let bar_width = cell * YL_GN.len() as i32;
        let left = width as i32 - bar_width - 30;
        let top = 30;

        root.draw(&Text::new(
            legend_title(value_column),
            (left, top - 22),
            ("sans-serif", 16).into_font(),
        ))
        .map_err(render_error)?;

        for (i, color) in YL_GN.iter().enumerate() {
            let x = left + cell * i as i32;
            root.draw(&Rectangle::new(
                [(x, top), (x + cell, top + 14)],
                color.mix(FILL_OPACITY).filled(),
            ))
            .map_err(render_error)?;
        }
        root.draw(&Rectangle::new(
            [(left, top), (left + bar_width, top + 14)],
            BLACK.stroke_width(1),
        ))
        .map_err(render_error)?;

        for (i, edge) in scale.edges().iter().enumerate() {
            let x = left + cell * i as i32;
            root.draw(&Text::new(
                format!("{edge:.2}"),
                (x - 12, top + 18),
                ("sans-serif", 12).into_font(),
            ))
            .map_err(render_error)?;
        }
        Ok(())
    }
}
