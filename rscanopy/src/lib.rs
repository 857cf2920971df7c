//! # rscanopy
//!
//! Lidar canopy workflow: terrain, surface and canopy height models built
//! from a classified point cloud, DEM-of-difference change detection,
//! per-tree maximum heights from buffered tree locations, and a multi-year
//! tree height report.
//!
//! Every operation takes an explicit [`Workspace`](collect::workspace::Workspace)
//! handle; nothing relies on process-wide state.

pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod report;
pub mod workflow;

pub use error::{Error, Result};
