use std::collections::HashSet;
use std::f64::consts::TAU;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collect::global_variables::BUFFER_SEGMENTS;
use crate::commons::basic_functions::defined;
use crate::error::{Error, Result};
use crate::geo_core::BoundingBox;
use crate::geometric::raster::Raster;

/// A surveyed tree position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeLocation {
    pub id: i64,
    pub point: Point<f64>,
}

impl TreeLocation {
    pub fn new(id: i64, x: f64, y: f64) -> Self {
        TreeLocation {
            id,
            point: Point::new(x, y),
        }
    }
}

/// Tree positions with unique ids, in input order.
#[derive(Debug, Clone, Default)]
pub struct TreeLocations(Vec<TreeLocation>);

impl TreeLocations {
    pub fn new(trees: Vec<TreeLocation>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(trees.len());
        for tree in &trees {
            if !seen.insert(tree.id) {
                return Err(Error::invalid("id", tree.id, "tree ids must be unique"));
            }
        }
        Ok(TreeLocations(trees))
    }

    /// Point features of a GeoJSON document. The id is read from the
    /// `id_field` property, falling back to the feature id.
    pub fn from_geojson_str(text: &str, id_field: &str) -> Result<Self> {
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(Error::invalid(
                    "tree_points",
                    "Geometry",
                    "expected a Feature or FeatureCollection",
                ))
            }
        };

        let mut trees = Vec::with_capacity(features.len());
        for (index, feature) in features.iter().enumerate() {
            let point = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(geojson::Value::Point(position)) if position.len() >= 2 => {
                    Point::new(position[0], position[1])
                }
                _ => {
                    return Err(Error::invalid(
                        "tree_points",
                        format!("feature #{}", index),
                        "tree locations must be Point geometries",
                    ))
                }
            };

            let id = feature
                .property(id_field)
                .and_then(|v| v.as_i64())
                .or_else(|| match &feature.id {
                    Some(geojson::feature::Id::Number(n)) => n.as_i64(),
                    Some(geojson::feature::Id::String(s)) => s.parse().ok(),
                    None => None,
                })
                .ok_or_else(|| {
                    Error::invalid(
                        "tree_points",
                        format!("feature #{}", index),
                        format!("no integer '{}' property or feature id", id_field),
                    )
                })?;

            trees.push(TreeLocation { id, point });
        }

        TreeLocations::new(trees)
    }

    pub fn from_geojson_path(path: impl AsRef<Path>, id_field: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        TreeLocations::from_geojson_str(&text, id_field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeLocation> {
        self.0.iter()
    }
}

/// Buffer distance, strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferRadius(f64);

impl BufferRadius {
    pub fn new(radius: f64) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::invalid("buffer_radius", radius, "must be a positive number"));
        }
        Ok(BufferRadius(radius))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// Polygon approximating the disc of `radius` around `center`.
pub fn buffer_point(center: Point<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            let angle = TAU * i as f64 / segments as f64;
            Coord {
                x: center.x() + radius * angle.cos(),
                y: center.y() + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Zonal statistics row for one tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonalRow {
    #[serde(rename = "Id")]
    pub id: i64,
    /// Defined cells inside the buffer
    #[serde(rename = "COUNT")]
    pub count: usize,
    #[serde(rename = "AREA")]
    pub area: f64,
    /// Highest CHM value inside the buffer, `None` for NODATA
    #[serde(rename = "MAX")]
    pub max: Option<f64>,
}

/// Per-tree maximum canopy height, one row per input tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalTable {
    pub name: String,
    pub rows: Vec<ZonalRow>,
}

impl ZonalTable {
    pub fn max_for(&self, id: i64) -> Option<f64> {
        self.rows.iter().find(|r| r.id == id).and_then(|r| r.max)
    }
}

/// Maximum `chm` value inside each tree's buffer.
///
/// A cell belongs to a buffer when its centre lies inside the buffer
/// polygon. Trees whose buffer covers no defined cell keep their row with a
/// NODATA maximum, so the row count always equals the tree count.
pub fn zonal_max(chm: &Raster, trees: &TreeLocations, radius: BufferRadius) -> Vec<ZonalRow> {
    let grid = chm.grid();
    let cell_area = grid.cell_size * grid.cell_size;

    trees
        .iter()
        .map(|tree| {
            let zone = buffer_point(tree.point, radius.get(), BUFFER_SEGMENTS);
            let window = zone
                .bounding_rect()
                .and_then(|r| grid.window(&BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y)));

            let mut count = 0usize;
            let mut max = f64::NAN;
            if let Some((rows, cols)) = window {
                for row in rows {
                    for col in cols.clone() {
                        let (x, y) = grid.cell_center(row, col);
                        if !zone.contains(&Point::new(x, y)) {
                            continue;
                        }
                        let value = chm.get(row, col);
                        if !value.is_nan() {
                            count += 1;
                            max = if max.is_nan() { value } else { max.max(value) };
                        }
                    }
                }
            }

            if count == 0 {
                warn!("Tree {} has no CHM cells within {} of its location", tree.id, radius.get());
            }
            debug!("Tree {}: {} cells, max {:?}", tree.id, count, defined(max));

            ZonalRow {
                id: tree.id,
                count,
                area: count as f64 * cell_area,
                max: defined(max),
            }
        })
        .collect()
}
