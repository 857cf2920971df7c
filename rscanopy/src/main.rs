use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rscanopy::collect::global_variables::{
    DEFAULT_BUFFER_RADIUS, DEFAULT_CELL_SIZE, DEFAULT_EPSG, DEFAULT_ID_FIELD, GROUND_CLASSES,
    VEGETATION_CLASSES, WORKSPACE_PATH,
};
use rscanopy::collect::workspace::{Workspace, WorkspaceOptions};
use rscanopy::geometric::lidar::{LasDataset, VoidFill};
use rscanopy::geometric::trees::{BufferRadius, TreeLocations};
use rscanopy::report::TrackedTrees;
use rscanopy::workflow::{self, HeightModelParams};

/// Lidar canopy height workflow
#[derive(Parser, Debug)]
#[command(name = "rscanopy")]
#[command(about = "Terrain, surface and canopy height models from classified lidar", long_about = None)]
struct Args {
    /// Workspace directory holding rasters, tables and the catalog
    #[arg(short, long, global = true, default_value = WORKSPACE_PATH)]
    workspace: PathBuf,

    /// Replace artifacts that already exist
    #[arg(long, global = true)]
    overwrite: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build dtm_<year>, dsm_<year> and chm_<year> from a point cloud
    Models {
        /// LAS/LAZ or CSV point cloud
        #[arg(short, long)]
        dataset: PathBuf,

        /// Year tag for the output rasters
        #[arg(short, long)]
        year: i32,

        /// Cell size in the dataset's linear unit
        #[arg(short, long, default_value_t = DEFAULT_CELL_SIZE)]
        cell_size: f64,

        /// Terrain classes, e.g. "1;2"
        #[arg(long, default_value = GROUND_CLASSES)]
        ground: String,

        /// Surface classes, e.g. "5"
        #[arg(long, default_value = VEGETATION_CLASSES)]
        vegetation: String,

        /// EPSG code of the point cloud
        #[arg(long, default_value_t = DEFAULT_EPSG)]
        epsg: i32,

        /// Leave terrain voids undefined instead of filling them from neighbours
        #[arg(long)]
        no_void_fill: bool,
    },

    /// DEM of difference between two CHMs and its mean change
    Dod {
        /// Older CHM, e.g. chm_2018
        #[arg(long)]
        old: String,

        /// Newer CHM, e.g. chm_2019
        #[arg(long)]
        new: String,

        /// Name of the difference raster, e.g. dod_1819
        #[arg(short, long)]
        output: String,
    },

    /// Maximum CHM height around each tree location
    Trees {
        /// CHM raster name, e.g. chm_2019
        #[arg(long)]
        chm: String,

        /// GeoJSON file of tree points
        #[arg(short, long)]
        points: PathBuf,

        /// Buffer radius around each tree
        #[arg(short, long, default_value_t = DEFAULT_BUFFER_RADIUS)]
        radius: f64,

        /// Feature property holding the tree id
        #[arg(long, default_value = DEFAULT_ID_FIELD)]
        id_field: String,
    },

    /// Per-year maximum tree height summary
    Report {
        /// Tree ids to report, in column order (default: every id found)
        #[arg(long, value_delimiter = ',')]
        trees: Vec<i64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut workspace = Workspace::open(
        &args.workspace,
        WorkspaceOptions {
            overwrite: args.overwrite,
        },
    )
    .with_context(|| format!("Failed to open workspace {:?}", args.workspace))?;

    match args.command {
        Command::Models {
            dataset,
            year,
            cell_size,
            ground,
            vegetation,
            epsg,
            no_void_fill,
        } => {
            let dataset = LasDataset::open(&dataset)
                .with_context(|| format!("Failed to load point cloud {:?}", dataset))?
                .with_epsg(epsg);
            println!("*** Setup Complete ***");

            let params = HeightModelParams {
                cell_size,
                ground: ground.parse()?,
                vegetation: vegetation.parse()?,
                terrain_void_fill: if no_void_fill {
                    VoidFill::None
                } else {
                    VoidFill::Interpolate
                },
                ..HeightModelParams::new(year)
            };
            let models = workflow::build_height_models(&mut workspace, &dataset, &params)
                .context("Failed to build height models")?;
            for name in [&models.dtm, &models.dsm, &models.chm] {
                println!("*** RASTER '{}' CREATED ***", name);
            }
        }
        Command::Dod { old, new, output } => {
            let summary = workflow::dod_mean_change(&mut workspace, &old, &new, &output)
                .context("Failed to compute DEM of difference")?;
            println!("*** RASTER '{}' CREATED ***", summary.dod);
            println!("{}", summary);
        }
        Command::Trees {
            chm,
            points,
            radius,
            id_field,
        } => {
            let trees = TreeLocations::from_geojson_path(&points, &id_field)
                .with_context(|| format!("Failed to read tree locations {:?}", points))?;
            let table = workflow::max_tree_height(&mut workspace, &chm, &trees, BufferRadius::new(radius)?)
                .context("Failed to extract tree heights")?;
            println!("*** TABLE '{}' CREATED ***", table.name);
        }
        Command::Report { trees } => {
            let tracked = if trees.is_empty() {
                TrackedTrees::All
            } else {
                TrackedTrees::Ids(trees)
            };
            println!();
            let stdout = std::io::stdout();
            workflow::tree_stats(&workspace, &tracked, &mut stdout.lock()).context("Failed to build tree report")?;
        }
    }

    Ok(())
}
