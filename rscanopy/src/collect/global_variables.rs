pub const WORKSPACE_PATH: &str = "./workspace";

/// EPSG:2154 (Lambert-93)
pub const DEFAULT_EPSG: i32 = 2154;

/// Raster cell size in the dataset's linear unit
pub const DEFAULT_CELL_SIZE: f64 = 0.1;

/// Tree buffer radius in the CHM's linear unit
pub const DEFAULT_BUFFER_RADIUS: f64 = 0.5;

/// LAS classes rasterized into the terrain model (unclassified + ground)
pub const GROUND_CLASSES: &str = "1;2";

/// LAS classes rasterized into the surface model (high vegetation)
pub const VEGETATION_CLASSES: &str = "5";

/// Marker identifying zonal tree tables in the workspace
pub const TREES_MARKER: &str = "trees";

/// Feature property holding the tree id in GeoJSON inputs
pub const DEFAULT_ID_FIELD: &str = "Id";

/// Segments used to approximate a circular buffer
pub const BUFFER_SEGMENTS: usize = 64;

/// Largest raster a single grid may hold (2 GiB of f64 cells)
pub const MAX_GRID_CELLS: usize = 1 << 28;
