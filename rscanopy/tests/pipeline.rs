use approx::assert_relative_eq;

use rscanopy::collect::workspace::{ArtifactKind, Workspace, WorkspaceOptions};
use rscanopy::geometric::lidar::{LasDataset, LidarPoint};
use rscanopy::geometric::trees::{BufferRadius, TreeLocation, TreeLocations};
use rscanopy::report::TrackedTrees;
use rscanopy::workflow::{self, HeightModelParams};
use rscanopy::Error;

const TREES: [(i64, f64, f64); 4] = [(1, 1.1, 1.1), (2, 1.1, 2.9), (3, 2.9, 1.1), (4, 2.9, 2.9)];

/// Flat ground at 100 m over (0, 0)-(4, 4) with one vegetation return per tree.
fn survey(growth: f64) -> LasDataset {
    let mut points = Vec::new();
    for i in 0..=8 {
        for j in 0..=8 {
            points.push(LidarPoint::new(i as f64 * 0.5, j as f64 * 0.5, 100.0, 2));
        }
    }
    for (k, (_, x, y)) in TREES.iter().enumerate() {
        points.push(LidarPoint::new(*x, *y, 105.0 + k as f64 + growth, 5));
    }
    LasDataset::from_points("survey", points)
}

fn params(year: i32) -> HeightModelParams {
    HeightModelParams {
        cell_size: 0.5,
        ..HeightModelParams::new(year)
    }
}

fn tree_locations() -> TreeLocations {
    TreeLocations::new(TREES.iter().map(|(id, x, y)| TreeLocation::new(*id, *x, *y)).collect()).unwrap()
}

#[test]
fn test_full_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::open(dir.path(), WorkspaceOptions { overwrite: true }).unwrap();

    let models_2018 = workflow::build_height_models(&mut ws, &survey(0.0), &params(2018)).unwrap();
    let models_2019 = workflow::build_height_models(&mut ws, &survey(0.5), &params(2019)).unwrap();
    assert_eq!(models_2019.chm, "chm_2019");
    assert_eq!(ws.entry("dtm_2019").unwrap().key.kind, ArtifactKind::Dtm);

    let chm = ws.read_raster("chm_2018").unwrap();
    assert_eq!((chm.width(), chm.height()), (8, 8));
    assert!(chm.data().iter().all(|h| *h >= 0.0));
    assert_eq!(chm.defined_count(), 64);

    let summary = workflow::dod_mean_change(&mut ws, &models_2018.chm, &models_2019.chm, "dod_1819").unwrap();
    // Four cells grew by 0.5 m, 60 did not change
    assert_relative_eq!(summary.mean.unwrap(), 2.0 / 64.0, epsilon = 1e-9);
    assert_eq!(summary.to_string(), "Mean Change (chm_2018 → chm_2019) = 0.031 meters");
    assert!(ws.contains("dod_1819"));

    let radius = BufferRadius::new(0.3).unwrap();
    let table = workflow::max_tree_height(&mut ws, "chm_2018", &tree_locations(), radius).unwrap();
    assert_eq!(table.name, "chm_2018_trees");
    assert_eq!(table.rows.len(), 4);
    workflow::max_tree_height(&mut ws, "chm_2019", &tree_locations(), radius).unwrap();

    let mut out = Vec::new();
    let report = workflow::tree_stats(&ws, &TrackedTrees::All, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(report.years.len(), 2);
    assert!(text.contains("YEAR  TREE 1  TREE 2  TREE 3  TREE 4\n"));
    assert!(text.contains("2018  5.00   6.00   7.00   8.00\n"));
    assert!(text.contains("2019  5.50   6.50   7.50   8.50\n"));
}

#[test]
fn test_zonal_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::open(dir.path(), WorkspaceOptions { overwrite: true }).unwrap();
    workflow::build_height_models(&mut ws, &survey(0.0), &params(2018)).unwrap();

    let mut trees: Vec<TreeLocation> = TREES.iter().map(|(id, x, y)| TreeLocation::new(*id, *x, *y)).collect();
    trees.push(TreeLocation::new(5, 40.0, 40.0));
    let trees = TreeLocations::new(trees).unwrap();
    let radius = BufferRadius::new(0.3).unwrap();

    let first = workflow::max_tree_height(&mut ws, "chm_2018", &trees, radius).unwrap();
    let second = workflow::max_tree_height(&mut ws, "chm_2018", &trees, radius).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.rows.len(), trees.len());
    assert!(second.rows[4].max.is_none());

    let persisted: Vec<rscanopy::geometric::trees::ZonalRow> = ws.read_table("chm_2018_trees").unwrap();
    assert_eq!(persisted, second.rows);
}

#[test]
fn test_rerun_without_overwrite_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::open(dir.path(), WorkspaceOptions::default()).unwrap();
    workflow::build_height_models(&mut ws, &survey(0.0), &params(2018)).unwrap();
    let created = ws.entry("chm_2018").unwrap().created;

    let err = workflow::build_height_models(&mut ws, &survey(1.0), &params(2018)).unwrap_err();
    assert!(matches!(err, Error::ArtifactExists(ref name) if name == "dtm_2018"));
    assert_eq!(ws.entry("chm_2018").unwrap().created, created);
}

#[test]
fn test_dod_on_different_grids_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::open(dir.path(), WorkspaceOptions { overwrite: true }).unwrap();
    workflow::build_height_models(&mut ws, &survey(0.0), &params(2018)).unwrap();
    let coarse = HeightModelParams {
        cell_size: 1.0,
        ..HeightModelParams::new(2019)
    };
    workflow::build_height_models(&mut ws, &survey(0.0), &coarse).unwrap();

    let err = workflow::dod_mean_change(&mut ws, "chm_2018", "chm_2019", "dod_1819").unwrap_err();
    assert!(matches!(err, Error::RasterAlignment(_)));
    assert!(!ws.contains("dod_1819"));
}

#[test]
fn test_tree_over_ground_gap_keeps_its_height() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = Workspace::open(dir.path(), WorkspaceOptions { overwrite: true }).unwrap();

    // Ground every metre except under the crown, 3 m across
    let mut points = Vec::new();
    for i in 0..=10 {
        for j in 0..=10 {
            let (x, y) = (i as f64, j as f64);
            if (3.5..=6.5).contains(&x) && (3.5..=6.5).contains(&y) {
                continue;
            }
            points.push(LidarPoint::new(x, y, 0.0, 2));
        }
    }
    points.push(LidarPoint::new(5.0, 5.0, 20.0, 5));
    let survey = LasDataset::from_points("crown over gap", points);

    workflow::build_height_models(&mut ws, &survey, &params(2020)).unwrap();
    let dtm = ws.read_raster("dtm_2020").unwrap();
    assert_eq!(dtm.defined_count(), dtm.data().len());

    let trees = TreeLocations::new(vec![TreeLocation::new(1, 5.0, 5.0)]).unwrap();
    let table = workflow::max_tree_height(&mut ws, "chm_2020", &trees, BufferRadius::new(0.5).unwrap()).unwrap();
    assert_relative_eq!(table.rows[0].max.unwrap(), 20.0, epsilon = 1e-9);
}
