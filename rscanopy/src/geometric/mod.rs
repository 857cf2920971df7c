pub mod chm;
pub mod dod;
pub mod lidar;
pub mod raster;
pub mod trees;
