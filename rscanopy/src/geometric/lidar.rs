use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo_core::{BoundingBox, GeoCore, GridSpec};
use crate::geometric::raster::Raster;

#[cfg(feature = "indicatif")]
use indicatif::{ProgressBar, ProgressStyle};

#[cfg(feature = "indicatif")]
fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {percent} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// Point structure for LiDAR data
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LidarPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub classification: u8,
}

impl LidarPoint {
    pub fn new(x: f64, y: f64, z: f64, classification: u8) -> Self {
        LidarPoint {
            x,
            y,
            z,
            classification,
        }
    }
}

/// Set of LAS classification codes, written `"1;2"` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCodes(BTreeSet<u8>);

impl ClassCodes {
    pub fn new<I: IntoIterator<Item = u8>>(codes: I) -> Self {
        ClassCodes(codes.into_iter().collect())
    }

    /// Unclassified and ground points.
    pub fn ground() -> Self {
        ClassCodes::new([1, 2])
    }

    /// High vegetation points.
    pub fn vegetation() -> Self {
        ClassCodes::new([5])
    }

    #[inline]
    pub fn contains(&self, code: u8) -> bool {
        self.0.contains(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for ClassCodes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let codes = s
            .split([';', ','])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<u8>()
                    .map_err(|_| Error::invalid("classification", t, "LAS class codes are integers in 0..=255"))
            })
            .collect::<Result<BTreeSet<u8>>>()?;
        if codes.is_empty() {
            return Err(Error::invalid("classification", s, "at least one class code is required"));
        }
        Ok(ClassCodes(codes))
    }
}

impl fmt::Display for ClassCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(u8::to_string).collect();
        write!(f, "{}", codes.join(";"))
    }
}

/// Classified point cloud, read once and never modified.
#[derive(Debug, Clone)]
pub struct LasDataset {
    pub geo_core: GeoCore,
    source: String,
    points: Vec<LidarPoint>,
    extent: Option<BoundingBox>,
}

impl LasDataset {
    /// Build a dataset from points already in memory.
    pub fn from_points(source: impl Into<String>, points: Vec<LidarPoint>) -> Self {
        let extent = BoundingBox::from_points(points.iter().map(|p| (p.x, p.y)));
        LasDataset {
            geo_core: GeoCore::default(),
            source: source.into(),
            points,
            extent,
        }
    }

    /// Read a point cloud from disk.
    ///
    /// `.las`/`.laz` files go through the `las` reader, `.csv` files need
    /// `x,y,z,classification` columns. `.xyz`/`.txt` files hold `x y z
    /// classification` per line, separated by spaces, tabs or commas, with
    /// an optional header line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::DatasetNotFound {
                path: path.to_path_buf(),
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let points = match extension.as_str() {
            #[cfg(feature = "las")]
            "las" | "laz" => read_las_points(path)?,
            "csv" => read_csv_points(path)?,
            "xyz" | "txt" => read_xyz_points(path)?,
            other => {
                return Err(Error::UnsupportedFormat(format!(
                    "{} (extension '{}')",
                    path.display(),
                    other
                )))
            }
        };

        info!("Loaded {} points from {}", points.len(), path.display());
        Ok(LasDataset::from_points(path.display().to_string(), points))
    }

    pub fn with_epsg(mut self, epsg: i32) -> Self {
        self.geo_core.set_epsg(epsg);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn points(&self) -> &[LidarPoint] {
        &self.points
    }

    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }

    /// Named view restricted to `codes`. A class with no points gives an empty layer.
    pub fn make_layer(&self, name: impl Into<String>, codes: &ClassCodes) -> LasLayer {
        #[cfg(feature = "rayon")]
        let points: Vec<LidarPoint> = self
            .points
            .par_iter()
            .filter(|p| codes.contains(p.classification))
            .copied()
            .collect();

        #[cfg(not(feature = "rayon"))]
        let points: Vec<LidarPoint> = self
            .points
            .iter()
            .filter(|p| codes.contains(p.classification))
            .copied()
            .collect();

        let name = name.into();
        debug!("Layer '{}' (classes {}): {} of {} points", name, codes, points.len(), self.points.len());

        LasLayer {
            name,
            codes: codes.clone(),
            geo_core: self.geo_core,
            extent: self.extent,
            points,
        }
    }
}

#[cfg(feature = "las")]
fn read_las_points(path: &Path) -> Result<Vec<LidarPoint>> {
    let mut reader = las::Reader::from_path(path)?;
    let point_count = reader.header().number_of_points() as usize;

    #[cfg(feature = "indicatif")]
    let pb = {
        let pb = ProgressBar::new(point_count as u64);
        pb.set_style(progress_style());
        pb.set_message("Reading points");
        pb
    };

    let mut points = Vec::with_capacity(point_count);
    for point in reader.points() {
        let point = point?;
        points.push(LidarPoint::new(point.x, point.y, point.z, u8::from(point.classification)));
        #[cfg(feature = "indicatif")]
        if points.len() % 10_000 == 0 {
            pb.set_position(points.len() as u64);
        }
    }

    #[cfg(feature = "indicatif")]
    pb.finish_and_clear();

    Ok(points)
}

fn read_csv_points(path: &Path) -> Result<Vec<LidarPoint>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let points = reader.deserialize().collect::<std::result::Result<Vec<LidarPoint>, _>>()?;
    Ok(points)
}

fn read_xyz_points(path: &Path) -> Result<Vec<LidarPoint>> {
    let delimiter = sniff_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut points = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        // Runs of blanks give empty fields; tabs may mix with spaces
        let fields: Vec<&str> = record
            .iter()
            .flat_map(|f| f.split('\t'))
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            continue;
        }
        match parse_xyz_fields(&fields) {
            Some(point) => points.push(point),
            // Header line
            None if index == 0 && fields[0].parse::<f64>().is_err() => continue,
            None => {
                return Err(Error::invalid(
                    "point",
                    format!("line {}: {}", index + 1, fields.join(" ")),
                    "expected x y z classification",
                ))
            }
        }
    }
    Ok(points)
}

/// Delimiter of the first non-blank line: comma, semicolon, else blank.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        return Ok(if line.contains(',') {
            b','
        } else if line.contains(';') {
            b';'
        } else {
            b' '
        });
    }
    Ok(b' ')
}

fn parse_xyz_fields(fields: &[&str]) -> Option<LidarPoint> {
    let [x, y, z, class, ..] = fields else {
        return None;
    };
    Some(LidarPoint::new(
        x.parse().ok()?,
        y.parse().ok()?,
        z.parse().ok()?,
        class.parse().ok()?,
    ))
}

/// Filtered view over a [`LasDataset`].
///
/// Keeps the parent dataset's extent so that every layer of one dataset
/// rasterizes onto the same grid.
#[derive(Debug, Clone)]
pub struct LasLayer {
    name: String,
    codes: ClassCodes,
    pub geo_core: GeoCore,
    extent: Option<BoundingBox>,
    points: Vec<LidarPoint>,
}

impl LasLayer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codes(&self) -> &ClassCodes {
        &self.codes
    }

    pub fn points(&self) -> &[LidarPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }
}

/// Statistic applied when several points fall in one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binning {
    /// Lowest point, for terrain
    Minimum,
    /// Highest point, for surfaces
    Maximum,
}

impl Binning {
    #[inline]
    fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            Binning::Minimum => a.min(b),
            Binning::Maximum => a.max(b),
        }
    }
}

impl FromStr for Binning {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MINIMUM" | "MIN" => Ok(Binning::Minimum),
            "MAXIMUM" | "MAX" => Ok(Binning::Maximum),
            _ => Err(Error::invalid("binning", s, "expected MINIMUM or MAXIMUM")),
        }
    }
}

impl fmt::Display for Binning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binning::Minimum => write!(f, "MINIMUM"),
            Binning::Maximum => write!(f, "MAXIMUM"),
        }
    }
}

/// Raster cell size, strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize(f64);

impl CellSize {
    pub fn new(size: f64) -> Result<Self> {
        if !size.is_finite() || size <= 0.0 {
            return Err(Error::invalid("cell_size", size, "must be a positive number"));
        }
        Ok(CellSize(size))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// How empty cells are treated after binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoidFill {
    /// Leave empty cells undefined
    #[default]
    None,
    /// One pass over the 3x3 neighbourhood using the binning statistic
    Neighborhood,
    /// Grow inward from the defined cells, one ring per pass, until every
    /// cell is defined. Each filled cell takes the mean of its defined
    /// 3x3 neighbours, which approximates linear interpolation across gaps.
    Interpolate,
}

/// Converts a [`LasLayer`] into an elevation raster.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    cell_size: CellSize,
    binning: Binning,
    void_fill: VoidFill,
}

impl Rasterizer {
    pub fn new(cell_size: CellSize, binning: Binning) -> Self {
        Rasterizer {
            cell_size,
            binning,
            void_fill: VoidFill::None,
        }
    }

    pub fn with_void_fill(mut self, void_fill: VoidFill) -> Self {
        self.void_fill = void_fill;
        self
    }

    pub fn binning(&self) -> Binning {
        self.binning
    }

    /// Bin the layer's points onto a grid covering the dataset extent.
    pub fn rasterize(&self, layer: &LasLayer) -> Result<Raster> {
        let extent = layer.extent().ok_or_else(|| {
            Error::invalid("dataset", layer.name(), "point cloud has no points, so no raster extent")
        })?;

        let grid = GridSpec::covering(&extent, self.cell_size.get(), layer.geo_core.get_epsg())?;
        debug!(
            "Grid dimensions: {}x{} (cell size: {}, binning: {})",
            grid.width,
            grid.height,
            grid.cell_size,
            self.binning
        );

        let mut raster = Raster::nodata(grid);
        for point in layer.points() {
            if let Some(cell) = grid.locate(point.x, point.y) {
                let current = raster[cell];
                raster[cell] = if current.is_nan() {
                    point.z
                } else {
                    self.binning.combine(current, point.z)
                };
            }
        }

        Ok(match self.void_fill {
            VoidFill::None => raster,
            VoidFill::Neighborhood => {
                let binning = self.binning;
                fill_voids(&raster, |values| values.iter().copied().fold(values[0], |a, b| binning.combine(a, b))).0
            }
            VoidFill::Interpolate => interpolate_voids(raster),
        })
    }
}

/// Fill each undefined cell that has defined 3x3 neighbours with `reduce`
/// applied to those neighbours.
///
/// Returns the filled raster and the number of cells that gained a value.
fn fill_voids<F: Fn(&[f64]) -> f64>(raster: &Raster, reduce: F) -> (Raster, usize) {
    let (width, height) = (raster.width(), raster.height());
    let mut filled = raster.clone();
    let mut count = 0;
    let mut neighbours = Vec::with_capacity(8);
    for row in 0..height {
        for col in 0..width {
            if !raster[(row, col)].is_nan() {
                continue;
            }
            neighbours.clear();
            for dr in -1i64..=1 {
                for dc in -1i64..=1 {
                    let (r, c) = (row as i64 + dr, col as i64 + dc);
                    if r < 0 || c < 0 || r >= height as i64 || c >= width as i64 {
                        continue;
                    }
                    let v = raster[(r as usize, c as usize)];
                    if !v.is_nan() {
                        neighbours.push(v);
                    }
                }
            }
            if !neighbours.is_empty() {
                filled[(row, col)] = reduce(neighbours.as_slice());
                count += 1;
            }
        }
    }
    (filled, count)
}

/// Repeated mean-of-neighbours passes until no void remains.
///
/// A fully undefined raster is returned unchanged.
fn interpolate_voids(mut raster: Raster) -> Raster {
    let mut passes = 0;
    loop {
        let (filled, count) = fill_voids(&raster, |values| values.iter().sum::<f64>() / values.len() as f64);
        if count == 0 {
            break;
        }
        raster = filled;
        passes += 1;
    }
    if passes > 0 {
        debug!("Terrain voids interpolated in {} passes", passes);
    }
    raster
}
