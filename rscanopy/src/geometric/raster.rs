//! Row-major raster grid and the cell-by-cell algebra the workflow needs.
//!
//! Undefined (NODATA) cells are stored as NaN, so arithmetic between an
//! undefined and a defined cell stays undefined without extra bookkeeping.

use std::ops::{Index, IndexMut};

use crate::commons::basic_functions::mean_of_defined;
use crate::error::{Error, Result};
use crate::geo_core::GridSpec;

/// A georeferenced 2D raster. Origin is the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    grid: GridSpec,
    data: Vec<f64>,
}

impl Raster {
    /// Create a raster filled with a constant value.
    pub fn new(grid: GridSpec, fill: f64) -> Self {
        Raster {
            data: vec![fill; grid.len()],
            grid,
        }
    }

    /// Create a raster where every cell is undefined.
    pub fn nodata(grid: GridSpec) -> Self {
        Raster::new(grid, f64::NAN)
    }

    /// Create a raster from row-major cell values.
    pub fn from_vec(grid: GridSpec, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.len() {
            return Err(Error::invalid(
                "data",
                data.len(),
                format!("expected {} cells for a {}x{} grid", grid.len(), grid.width, grid.height),
            ));
        }
        Ok(Raster { grid, data })
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn cell_size(&self) -> f64 {
        self.grid.cell_size
    }

    pub fn epsg(&self) -> i32 {
        self.grid.epsg
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Value at (row, col); NaN when out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row < self.grid.height && col < self.grid.width {
            self.data[row * self.grid.width + col]
        } else {
            f64::NAN
        }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row < self.grid.height && col < self.grid.width {
            self.data[row * self.grid.width + col] = value;
        }
    }

    pub fn defined_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn is_fully_undefined(&self) -> bool {
        self.defined_count() == 0
    }

    /// Mean over defined cells only.
    pub fn mean(&self) -> Option<f64> {
        mean_of_defined(self.data.iter().copied())
    }

    /// Apply a function to every cell.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Raster {
        Raster {
            grid: self.grid,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two aligned rasters cell by cell over their common extent.
    pub fn zip_with<F: Fn(f64, f64) -> f64>(&self, other: &Raster, f: F) -> Result<Raster> {
        let (grid, (r_a, c_a), (r_b, c_b)) = self.grid.intersection(&other.grid)?;
        let mut data = Vec::with_capacity(grid.len());
        for row in 0..grid.height {
            for col in 0..grid.width {
                data.push(f(self.get(row + r_a, col + c_a), other.get(row + r_b, col + c_b)));
            }
        }
        Ok(Raster { grid, data })
    }

    /// `self - other` over the common extent.
    pub fn subtract(&self, other: &Raster) -> Result<Raster> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Replace every undefined cell with `value`.
    pub fn fill_undefined(&self, value: f64) -> Raster {
        self.map(|v| if v.is_nan() { value } else { v })
    }
}

impl Index<(usize, usize)> for Raster {
    type Output = f64;
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.grid.width + c]
    }
}

impl IndexMut<(usize, usize)> for Raster {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.grid.width + c]
    }
}
