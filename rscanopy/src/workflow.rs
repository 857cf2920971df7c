//! Caller-driven entry points. Each one runs its steps sequentially against
//! an explicit workspace and returns once every artifact is persisted.

use std::io::Write;

use tracing::info;

use crate::collect::global_variables::DEFAULT_CELL_SIZE;
use crate::collect::workspace::{tree_table_name, year_from_name, ArtifactKey, ArtifactKind, Workspace};
use crate::error::{Error, Result};
use crate::geometric::chm::synthesize_chm;
use crate::geometric::dod::{detect_change, ChangeSummary};
use crate::geometric::lidar::{Binning, CellSize, ClassCodes, LasDataset, Rasterizer, VoidFill};
use crate::geometric::trees::{zonal_max, BufferRadius, TreeLocations, ZonalTable};
use crate::report::{TrackedTrees, TreeReport};

/// Parameters for [`build_height_models`].
#[derive(Debug, Clone)]
pub struct HeightModelParams {
    pub year: i32,
    pub cell_size: f64,
    /// Classes binned into the terrain model
    pub ground: ClassCodes,
    /// Classes binned into the surface model
    pub vegetation: ClassCodes,
    pub terrain_void_fill: VoidFill,
}

impl HeightModelParams {
    pub fn new(year: i32) -> Self {
        HeightModelParams {
            year,
            cell_size: DEFAULT_CELL_SIZE,
            ground: ClassCodes::ground(),
            vegetation: ClassCodes::vegetation(),
            terrain_void_fill: VoidFill::Interpolate,
        }
    }
}

/// Names of the rasters written by [`build_height_models`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightModels {
    pub dtm: String,
    pub dsm: String,
    pub chm: String,
}

/// Terrain, surface and canopy height rasters for one year.
///
/// Writes `dtm_<year>`, then `dsm_<year>`, then `chm_<year>`. An error part
/// way leaves the earlier rasters in place; rerun with overwrite enabled.
pub fn build_height_models(
    workspace: &mut Workspace,
    dataset: &LasDataset,
    params: &HeightModelParams,
) -> Result<HeightModels> {
    let cell_size = CellSize::new(params.cell_size)?;
    let dtm_key = ArtifactKey::yearly(ArtifactKind::Dtm, params.year);
    let dsm_key = ArtifactKey::yearly(ArtifactKind::Dsm, params.year);
    let chm_key = ArtifactKey::yearly(ArtifactKind::Chm, params.year);
    let models = HeightModels {
        dtm: dtm_key.default_name(),
        dsm: dsm_key.default_name(),
        chm: chm_key.default_name(),
    };

    if !workspace.overwrite() {
        for name in [&models.dtm, &models.dsm, &models.chm] {
            if workspace.contains(name) {
                return Err(Error::ArtifactExists(name.clone()));
            }
        }
    }

    let ground = dataset.make_layer("laslayer_dtm", &params.ground);
    let dtm = Rasterizer::new(cell_size, Binning::Minimum)
        .with_void_fill(params.terrain_void_fill)
        .rasterize(&ground)?;
    workspace.save_raster(&models.dtm, dtm_key, &dtm)?;

    let vegetation = dataset.make_layer("laslayer_dsm", &params.vegetation);
    let dsm = Rasterizer::new(cell_size, Binning::Maximum).rasterize(&vegetation)?;
    workspace.save_raster(&models.dsm, dsm_key, &dsm)?;

    let chm = synthesize_chm(&dsm, &dtm)?;
    workspace.save_raster(&models.chm, chm_key, &chm)?;

    info!(
        "Height models for {} from {} ({}x{} cells)",
        params.year,
        dataset.source(),
        chm.width(),
        chm.height()
    );
    Ok(models)
}

/// DEM of difference between two persisted CHMs, saved as `dod_name`.
pub fn dod_mean_change(workspace: &mut Workspace, chm_old: &str, chm_new: &str, dod_name: &str) -> Result<ChangeSummary> {
    let old = workspace.read_raster(chm_old)?;
    let new = workspace.read_raster(chm_new)?;
    let dod = detect_change(&old, &new)?;

    let year = workspace.entry(chm_new)?.key.year;
    workspace.save_raster(dod_name, ArtifactKey::new(ArtifactKind::Dod, year), &dod)?;

    Ok(ChangeSummary {
        old: chm_old.to_string(),
        new: chm_new.to_string(),
        dod: dod_name.to_string(),
        mean: dod.mean(),
    })
}

/// Maximum canopy height around each tree, saved as `<chm>_trees`.
pub fn max_tree_height(
    workspace: &mut Workspace,
    chm: &str,
    trees: &TreeLocations,
    radius: BufferRadius,
) -> Result<ZonalTable> {
    let raster = workspace.read_raster(chm)?;
    let year = workspace
        .entry(chm)?
        .key
        .year
        .or_else(|| year_from_name(chm).ok());

    let table = ZonalTable {
        name: tree_table_name(chm),
        rows: zonal_max(&raster, trees, radius),
    };
    workspace.save_table(&table.name, ArtifactKey::new(ArtifactKind::TreeTable, year), &table.rows)?;
    Ok(table)
}

/// Collect the tree tables and print the per-year report to `out`.
pub fn tree_stats<W: Write>(workspace: &Workspace, tracked: &TrackedTrees, out: &mut W) -> Result<TreeReport> {
    let report = TreeReport::collect(workspace, tracked)?;
    report.render(out)?;
    Ok(report)
}
