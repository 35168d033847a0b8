//! State boundary shapes decoded from a GeoJSON `FeatureCollection`.

use crate::data::read_source;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::ops::Range;
use tracing::info;

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    id: Option<String>,
    #[serde(default)]
    properties: Properties,
    geometry: Geometry,
}

#[derive(Deserialize, Default)]
struct Properties {
    name: Option<String>,
}

/// Positions may carry a third (altitude) element, which is ignored.
#[derive(Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Vec<Vec<f64>>>),
    MultiPolygon(Vec<Vec<Vec<Vec<f64>>>>),
}

/// One polygon: exterior ring first, holes after.
pub type Ring = Vec<(f64, f64)>;

#[derive(Debug, Clone, PartialEq)]
pub struct StateShape {
    /// Two-letter code from `feature.id`.
    pub code: String,
    pub name: String,
    pub polygons: Vec<Vec<Ring>>,
}

/// Boundaries of every state in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBoundaries {
    pub states: Vec<StateShape>,
}

fn to_ring(positions: Vec<Vec<f64>>) -> Result<Ring> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [lon, lat, ..] => Ok((*lon, *lat)),
            _ => Err(PipelineError::parse(
                "boundaries",
                "position with fewer than two coordinates",
            )),
        })
        .collect()
}

impl StateBoundaries {
    /// Fetch and decode the boundary document.
    pub fn load(source: &str) -> Result<Self> {
        let bytes = read_source(source)?;
        let boundaries = Self::from_json(source, &bytes)?;
        info!(source, states = boundaries.states.len(), "loaded state boundaries");
        Ok(boundaries)
    }

    pub fn from_json(source: &str, bytes: &[u8]) -> Result<Self> {
        let collection: FeatureCollection =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::parse(source, e))?;

        let mut states = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let code = feature
                .id
                .ok_or_else(|| PipelineError::parse(source, "feature without id"))?;
            let polygons = match feature.geometry {
                Geometry::Polygon(rings) => vec![rings],
                Geometry::MultiPolygon(polygons) => polygons,
            };
            let polygons = polygons
                .into_iter()
                .map(|rings| rings.into_iter().map(to_ring).collect::<Result<Vec<_>>>())
                .collect::<Result<Vec<_>>>()?;
            states.push(StateShape {
                name: feature.properties.name.unwrap_or_else(|| code.clone()),
                code,
                polygons,
            });
        }
        Ok(Self { states })
    }

    pub fn get(&self, code: &str) -> Option<&StateShape> {
        self.states.iter().find(|s| s.code == code)
    }
}

/// Longitude/latitude window drawn with an equirectangular projection.
#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub lon: Range<f64>,
    pub lat: Range<f64>,
}

impl MapView {
    /// Contiguous United States, roughly what a zoom-4 web map centred on 40N 95W shows.
    pub fn contiguous_us() -> Self {
        Self {
            lon: -128.0..-64.0,
            lat: 22.0..52.0,
        }
    }

    /// Pixel height that keeps the map undistorted at `width`, using the cosine of the
    /// central latitude as the horizontal scale.
    pub fn height_for_width(&self, width: u32) -> u32 {
        let mid_lat = ((self.lat.start + self.lat.end) / 2.0).to_radians();
        let lon_span = (self.lon.end - self.lon.start) * mid_lat.cos();
        let lat_span = self.lat.end - self.lat.start;
        (f64::from(width) * lat_span / lon_span).round() as u32
    }
}

impl Default for MapView {
    fn default() -> Self {
        Self::contiguous_us()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": "KY", "properties": {"name": "Kentucky"},
             "geometry": {"type": "Polygon",
                          "coordinates": [[[-89.5, 36.5], [-82.0, 37.0], [-84.0, 39.0], [-89.5, 36.5]]]}},
            {"type": "Feature", "id": "HI", "properties": {"name": "Hawaii"},
             "geometry": {"type": "MultiPolygon",
                          "coordinates": [[[[-155.0, 19.0, 0.0], [-154.8, 19.5, 0.0], [-155.5, 20.0, 0.0]]],
                                          [[[-156.0, 20.5], [-156.2, 20.9], [-156.5, 20.7]]]]}}
        ]
    }"#;

    #[test]
    fn decodes_polygons_and_multipolygons() -> Result<()> {
        let boundaries = StateBoundaries::from_json("sample", SAMPLE.as_bytes())?;
        assert_eq!(boundaries.states.len(), 2);

        let ky = boundaries.get("KY").expect("KY decoded");
        assert_eq!(ky.name, "Kentucky");
        assert_eq!(ky.polygons.len(), 1);
        assert_eq!(ky.polygons[0][0][1], (-82.0, 37.0));

        let hi = boundaries.get("HI").expect("HI decoded");
        assert_eq!(hi.polygons.len(), 2);
        assert_eq!(hi.polygons[0][0][0], (-155.0, 19.0));
        Ok(())
    }

    #[test]
    fn rejects_non_geojson() {
        let err = StateBoundaries::from_json("bad", b"{\"rows\": []}").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn feature_without_id_is_rejected() {
        let doc = r#"{"features": [{"properties": {}, "geometry":
            {"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]]}}]}"#;
        let err = StateBoundaries::from_json("noid", doc.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn contiguous_view_excludes_hawaii() {
        let view = MapView::contiguous_us();
        assert!(view.lon.contains(&-85.0) && view.lat.contains(&37.5));
        assert!(!view.lon.contains(&-155.0));
        let height = view.height_for_width(1200);
        assert!(height > 600 && height < 800, "{height}");
    }
}
