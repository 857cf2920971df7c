use crate::error::Result;
use crate::geometric::raster::Raster;

/// Canopy height model: `max(0, surface - terrain)` over the common extent.
///
/// Cells left undefined by the subtraction (no surface or no terrain
/// coverage) become 0, whatever the cause, so the result has no NODATA.
/// Fails with `RasterAlignment` when the two grids cannot be combined.
pub fn synthesize_chm(surface: &Raster, terrain: &Raster) -> Result<Raster> {
    let chm = surface
        .subtract(terrain)?
        .map(|h| if h.is_nan() || h < 0.0 { 0.0 } else { h });
    Ok(chm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::geometric::raster::tests::{grid, raster};

    #[test]
    fn test_chm_is_surface_minus_terrain() {
        let dsm = raster(3, 1, vec![15.0, 12.5, 10.0]);
        let dtm = raster(3, 1, vec![10.0, 10.0, 10.0]);
        let chm = synthesize_chm(&dsm, &dtm).unwrap();
        assert_eq!(chm.data(), &[5.0, 2.5, 0.0]);
    }

    #[test]
    fn test_chm_undefined_and_negative_become_zero() {
        let dsm = raster(4, 1, vec![f64::NAN, 12.0, f64::NAN, 9.0]);
        let dtm = raster(4, 1, vec![10.0, f64::NAN, f64::NAN, 10.0]);
        let chm = synthesize_chm(&dsm, &dtm).unwrap();
        assert_eq!(chm.data(), &[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(chm.defined_count(), 4);
    }

    #[test]
    fn test_chm_never_negative() {
        let values: Vec<f64> = (0..16).map(|i| (i as f64 * 1.7).sin() * 5.0).collect();
        let dsm = raster(4, 4, values.clone());
        let dtm = raster(4, 4, values.iter().rev().copied().collect());
        let chm = synthesize_chm(&dsm, &dtm).unwrap();
        for (i, h) in chm.data().iter().enumerate() {
            assert!(*h >= 0.0);
            assert_eq!(*h, (values[i] - values[15 - i]).max(0.0));
        }
    }

    #[test]
    fn test_chm_rejects_mismatched_cell_size() {
        let dsm = raster(2, 2, vec![1.0; 4]);
        let mut coarse = grid(0.0, 2.0, 1, 1);
        coarse.cell_size = 2.0;
        let dtm = Raster::new(coarse, 0.0);
        assert!(matches!(synthesize_chm(&dsm, &dtm), Err(Error::RasterAlignment(_))));
    }

    #[test]
    fn test_chm_rejects_other_spatial_reference() {
        let dsm = raster(2, 2, vec![1.0; 4]);
        let mut g = *dsm.grid();
        g.epsg = 4326;
        let dtm = Raster::new(g, 0.0);
        assert!(matches!(synthesize_chm(&dsm, &dtm), Err(Error::RasterAlignment(_))));
    }
}
