use serde::{Deserialize, Serialize};

use crate::collect::global_variables::{DEFAULT_EPSG, MAX_GRID_CELLS};
use crate::error::{Error, Result};

/// Relative tolerance used when comparing cell sizes and lattice offsets.
const GRID_TOLERANCE: f64 = 1e-6;

/// Spatial reference shared by every artifact of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCore {
    /// EPSG code
    pub epsg: i32,
}

impl GeoCore {
    pub fn new(epsg: i32) -> Self {
        GeoCore { epsg }
    }

    pub fn get_epsg(&self) -> i32 {
        self.epsg
    }

    pub fn set_epsg(&mut self, epsg: i32) {
        self.epsg = epsg;
    }
}

impl Default for GeoCore {
    /// EPSG:2154 (Lambert-93)
    fn default() -> Self {
        GeoCore::new(DEFAULT_EPSG)
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box holding every (x, y); `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => BoundingBox::new(x, y, x, y),
                Some(b) => BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// North-up grid geometry: upper-left origin, square cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub epsg: i32,
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    /// Grid covering `bbox` with `cell_size` cells, at least one cell each way.
    ///
    /// Fails when the extent is not finite or the grid would exceed
    /// [`MAX_GRID_CELLS`].
    pub fn covering(bbox: &BoundingBox, cell_size: f64, epsg: i32) -> Result<Self> {
        let cols = (bbox.width() / cell_size).ceil().max(1.0);
        let rows = (bbox.height() / cell_size).ceil().max(1.0);
        if !cols.is_finite() || !rows.is_finite() {
            return Err(Error::invalid(
                "extent",
                format!("{:?}", bbox),
                "extent and cell size must give a finite grid",
            ));
        }

        let too_large = || {
            Error::invalid(
                "extent",
                format!("{} x {} cells of {}", cols, rows, cell_size),
                format!("grid exceeds {} cells; use a larger cell size or clip the point cloud", MAX_GRID_CELLS),
            )
        };
        let max = MAX_GRID_CELLS as f64;
        if cols > max || rows > max {
            return Err(too_large());
        }
        let (width, height) = (cols as usize, rows as usize);
        match width.checked_mul(height) {
            Some(len) if len <= MAX_GRID_CELLS => {}
            _ => return Err(too_large()),
        }

        Ok(GridSpec {
            epsg,
            origin_x: bbox.min_x,
            origin_y: bbox.max_y,
            cell_size,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin_x,
            self.origin_y - self.height as f64 * self.cell_size,
            self.origin_x + self.width as f64 * self.cell_size,
            self.origin_y,
        )
    }

    /// World coordinates of the centre of cell (row, col).
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y - (row as f64 + 0.5) * self.cell_size,
        )
    }

    /// Cell holding (x, y). Points on the right or bottom edge land in the last cell.
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.cell_size).floor();
        let row = ((self.origin_y - y) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (mut row, mut col) = (row as usize, col as usize);
        if col == self.width && x <= self.origin_x + self.width as f64 * self.cell_size {
            col -= 1;
        }
        if row == self.height && y >= self.origin_y - self.height as f64 * self.cell_size {
            row -= 1;
        }
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Range of rows and columns whose cells intersect `bbox`, clipped to the grid.
    pub fn window(&self, bbox: &BoundingBox) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
        let col0 = ((bbox.min_x - self.origin_x) / self.cell_size).floor().max(0.0) as usize;
        let col1 = ((bbox.max_x - self.origin_x) / self.cell_size).ceil().max(0.0) as usize;
        let row0 = ((self.origin_y - bbox.max_y) / self.cell_size).floor().max(0.0) as usize;
        let row1 = ((self.origin_y - bbox.min_y) / self.cell_size).ceil().max(0.0) as usize;
        let (col1, row1) = (col1.min(self.width), row1.min(self.height));
        (col0 < col1 && row0 < row1).then(|| (row0..row1, col0..col1))
    }

    /// Check that two grids can be combined cell by cell.
    ///
    /// Same spatial reference, same cell size, origins on the same lattice.
    pub fn check_aligned(&self, other: &GridSpec) -> Result<()> {
        if self.epsg != other.epsg {
            return Err(Error::RasterAlignment(format!(
                "spatial reference differs (EPSG:{} vs EPSG:{})",
                self.epsg, other.epsg
            )));
        }
        if (self.cell_size - other.cell_size).abs() > GRID_TOLERANCE * self.cell_size.max(other.cell_size) {
            return Err(Error::RasterAlignment(format!(
                "cell size differs ({} vs {})",
                self.cell_size, other.cell_size
            )));
        }
        let off_x = (other.origin_x - self.origin_x) / self.cell_size;
        let off_y = (self.origin_y - other.origin_y) / self.cell_size;
        if (off_x - off_x.round()).abs() > GRID_TOLERANCE || (off_y - off_y.round()).abs() > GRID_TOLERANCE {
            return Err(Error::RasterAlignment(format!(
                "grid origins are not on a common lattice ({:.6}, {:.6} cells apart)",
                off_x, off_y
            )));
        }
        Ok(())
    }

    /// Grid covering the overlap of two aligned grids, with the cell offsets
    /// of the overlap's first cell in each input.
    pub fn intersection(&self, other: &GridSpec) -> Result<(GridSpec, (usize, usize), (usize, usize))> {
        self.check_aligned(other)?;

        let off_col = ((other.origin_x - self.origin_x) / self.cell_size).round() as i64;
        let off_row = ((self.origin_y - other.origin_y) / self.cell_size).round() as i64;

        // Overlap in the cell indices of `self`
        let col0 = off_col.max(0);
        let row0 = off_row.max(0);
        let col1 = (self.width as i64).min(off_col + other.width as i64);
        let row1 = (self.height as i64).min(off_row + other.height as i64);
        if col0 >= col1 || row0 >= row1 {
            return Err(Error::RasterAlignment("extents do not overlap".to_string()));
        }

        let grid = GridSpec {
            epsg: self.epsg,
            origin_x: self.origin_x + col0 as f64 * self.cell_size,
            origin_y: self.origin_y - row0 as f64 * self.cell_size,
            cell_size: self.cell_size,
            width: (col1 - col0) as usize,
            height: (row1 - row0) as usize,
        };
        let in_self = (row0 as usize, col0 as usize);
        let in_other = ((row0 - off_row) as usize, (col0 - off_col) as usize);
        Ok((grid, in_self, in_other))
    }
}
