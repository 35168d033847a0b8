//! Charts module - Time series chart and choropleth maps

pub mod geo;
mod plotter;
mod renderer;

pub use geo::{MapView, StateBoundaries, StateShape};
pub use plotter::{TimeSeriesPlotter, YearSeries};
pub use renderer::{legend_title, ChoroplethRenderer, ColorScale, YL_GN};
