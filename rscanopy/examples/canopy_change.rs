use anyhow::Result;
use rscanopy::collect::workspace::{Workspace, WorkspaceOptions};
use rscanopy::geometric::lidar::{LasDataset, LidarPoint};
use rscanopy::geometric::trees::{BufferRadius, TreeLocation, TreeLocations};
use rscanopy::report::TrackedTrees;
use rscanopy::workflow::{self, HeightModelParams};

/// Synthetic survey: gently sloping ground and four trees.
fn survey(growth: f64) -> LasDataset {
    let mut points = Vec::new();
    for i in 0..=40 {
        for j in 0..=40 {
            let (x, y) = (i as f64 * 0.1, j as f64 * 0.1);
            points.push(LidarPoint::new(x, y, 100.0 + 0.05 * x, 2));
        }
    }
    for (k, (x, y)) in [(1.0, 1.0), (1.0, 3.0), (3.0, 1.0), (3.0, 3.0)].iter().enumerate() {
        points.push(LidarPoint::new(*x, *y, 104.0 + k as f64 + growth, 5));
    }
    LasDataset::from_points(format!("synthetic survey (+{} m)", growth), points)
}

/// Example: two survey years, canopy change and tree height report
fn main() -> Result<()> {
    println!("=== Example: canopy change between two lidar surveys ===\n");

    let mut workspace = Workspace::open("./output/canopy", WorkspaceOptions { overwrite: true })?;

    for (year, growth) in [(2018, 0.0), (2019, 0.4)] {
        let models = workflow::build_height_models(&mut workspace, &survey(growth), &HeightModelParams::new(year))?;
        println!("*** RASTER '{}' CREATED ***", models.dtm);
        println!("*** RASTER '{}' CREATED ***", models.dsm);
        println!("*** RASTER '{}' CREATED ***", models.chm);
    }

    let summary = workflow::dod_mean_change(&mut workspace, "chm_2018", "chm_2019", "dod_1819")?;
    println!("*** RASTER '{}' CREATED ***", summary.dod);
    println!("{}", summary);

    let trees = TreeLocations::new(vec![
        TreeLocation::new(1, 1.0, 1.0),
        TreeLocation::new(2, 1.0, 3.0),
        TreeLocation::new(3, 3.0, 1.0),
        TreeLocation::new(4, 3.0, 3.0),
    ])?;
    for chm in ["chm_2018", "chm_2019"] {
        let table = workflow::max_tree_height(&mut workspace, chm, &trees, BufferRadius::new(0.5)?)?;
        println!("*** TABLE '{}' CREATED ***", table.name);
    }

    println!();
    workflow::tree_stats(&workspace, &TrackedTrees::All, &mut std::io::stdout())?;

    Ok(())
}
