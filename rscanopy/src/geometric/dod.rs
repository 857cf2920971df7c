use std::fmt;

use crate::error::Result;
use crate::geometric::raster::Raster;

/// DEM of difference, `new - old`.
///
/// A cell is undefined when either input is undefined there; the grids must
/// be aligned exactly as for the canopy height model.
pub fn detect_change(old: &Raster, new: &Raster) -> Result<Raster> {
    new.subtract(old)
}

/// Outcome of a change detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSummary {
    pub old: String,
    pub new: String,
    pub dod: String,
    /// Mean over defined cells, `None` when the inputs never overlap with data
    pub mean: Option<f64>,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mean {
            Some(mean) => write!(f, "Mean Change ({} → {}) = {:.3} meters", self.old, self.new, mean),
            None => write!(f, "Mean Change ({} → {}) = n/a", self.old, self.new),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometric::raster::tests::{grid, raster};
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_excludes_undefined_cells() {
        let old = raster(4, 1, vec![1.0, 2.0, f64::NAN, 4.0]);
        let new = raster(4, 1, vec![2.0, 4.0, 9.0, f64::NAN]);
        let dod = detect_change(&old, &new).unwrap();
        assert_eq!(dod.defined_count(), 2);
        // (1 + 2) / 2, not (1 + 2 + 0 + 0) / 4
        assert_relative_eq!(dod.mean().unwrap(), 1.5);
    }

    #[test]
    fn test_negative_change() {
        let old = raster(2, 1, vec![10.0, 8.0]);
        let new = raster(2, 1, vec![7.0, 8.0]);
        let dod = detect_change(&old, &new).unwrap();
        assert_eq!(dod.data(), &[-3.0, 0.0]);
        assert_relative_eq!(dod.mean().unwrap(), -1.5);
    }

    #[test]
    fn test_misaligned_inputs_fail() {
        let old = raster(2, 2, vec![1.0; 4]);
        let new = Raster::new(grid(0.25, 2.0, 2, 2), 1.0);
        assert!(matches!(detect_change(&old, &new), Err(Error::RasterAlignment(_))));
    }

    #[test]
    fn test_summary_display() {
        let summary = ChangeSummary {
            old: "chm_2018".into(),
            new: "chm_2019".into(),
            dod: "dod_1819".into(),
            mean: Some(0.12345),
        };
        assert_eq!(summary.to_string(), "Mean Change (chm_2018 → chm_2019) = 0.123 meters");

        let empty = ChangeSummary { mean: None, ..summary };
        assert_eq!(empty.to_string(), "Mean Change (chm_2018 → chm_2019) = n/a");
    }
}
