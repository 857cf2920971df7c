//! Named-artifact store backing every workflow step.
//!
//! A workspace is a directory holding `catalog.json`, GeoTIFF rasters under
//! `rasters/` and CSV tables under `tables/`. The catalog records a
//! structured [`ArtifactKey`] for each artifact, so years never have to be
//! recovered from names when the artifact was produced here.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geo_core::GridSpec;
use crate::geometric::raster::Raster;

const CATALOG_FILE: &str = "catalog.json";
const RASTER_DIR: &str = "rasters";
const TABLE_DIR: &str = "tables";

/// GDAL_NODATA private tag
const GDAL_NODATA_TAG: u16 = 42113;
/// GeoTIFF key value for a user-defined coordinate system
const USER_DEFINED_GEO_KEY: u16 = 32767;

/// What an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dtm,
    Dsm,
    Chm,
    Dod,
    TreeTable,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Dtm => "dtm",
            ArtifactKind::Dsm => "dsm",
            ArtifactKind::Chm => "chm",
            ArtifactKind::Dod => "dod",
            ArtifactKind::TreeTable => "trees",
        }
    }

    pub fn is_table(self) -> bool {
        matches!(self, ArtifactKind::TreeTable)
    }
}

/// Structured identity of an artifact: kind plus optional year tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub kind: ArtifactKind,
    pub year: Option<i32>,
}

impl ArtifactKey {
    pub fn new(kind: ArtifactKind, year: Option<i32>) -> Self {
        ArtifactKey { kind, year }
    }

    pub fn yearly(kind: ArtifactKind, year: i32) -> Self {
        ArtifactKey::new(kind, Some(year))
    }

    /// Conventional name, e.g. `chm_2019`. Tree tables are named after
    /// their CHM instead, see [`tree_table_name`].
    pub fn default_name(&self) -> String {
        match self.year {
            Some(year) => format!("{}_{}", self.kind.prefix(), year),
            None => self.kind.prefix().to_string(),
        }
    }
}

/// `"<chm>_trees"`
pub fn tree_table_name(chm: &str) -> String {
    format!("{}_{}", chm, ArtifactKind::TreeTable.prefix())
}

/// Year encoded as the second `_`-separated token of a name (`chm_2019_trees`).
pub fn year_from_name(name: &str) -> Result<i32> {
    name.split('_')
        .nth(1)
        .and_then(|token| token.parse::<i32>().ok())
        .ok_or_else(|| Error::NameFormat {
            name: name.to_string(),
        })
}

/// Catalog entry for one persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub key: ArtifactKey,
    /// Path relative to the workspace root
    pub file: PathBuf,
    pub created: DateTime<Utc>,
    /// Grid metadata, rasters only
    pub grid: Option<GridSpec>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

/// Workspace options
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceOptions {
    /// Replace artifacts that already exist instead of failing
    pub overwrite: bool,
}

/// Explicit handle on a workspace directory.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    options: WorkspaceOptions,
    catalog: Catalog,
}

impl Workspace {
    /// Open (creating if needed) the workspace at `root`.
    pub fn open(root: impl AsRef<Path>, options: WorkspaceOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(RASTER_DIR))?;
        std::fs::create_dir_all(root.join(TABLE_DIR))?;

        let catalog_path = root.join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            serde_json::from_reader(BufReader::new(File::open(&catalog_path)?))?
        } else {
            Catalog::default()
        };

        debug!("Workspace {:?} opened ({} artifacts)", root, catalog.entries.len());
        Ok(Workspace {
            root,
            options,
            catalog,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overwrite(&self) -> bool {
        self.options.overwrite
    }

    pub fn set_overwrite(&mut self, overwrite: bool) {
        self.options.overwrite = overwrite;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.catalog.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Result<&CatalogEntry> {
        self.catalog
            .entries
            .get(name)
            .ok_or_else(|| Error::ArtifactNotFound(name.to_string()))
    }

    /// Entries whose name contains `pattern`, in name order.
    pub fn list(&self, pattern: &str) -> Vec<&CatalogEntry> {
        self.catalog
            .entries
            .values()
            .filter(|e| e.name.contains(pattern))
            .collect()
    }

    /// Absolute path of an artifact's file.
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(&self.entry(name)?.file))
    }

    /// Persist a raster as GeoTIFF under `name`.
    pub fn save_raster(&mut self, name: &str, key: ArtifactKey, raster: &Raster) -> Result<PathBuf> {
        let file = Path::new(RASTER_DIR).join(format!("{}.tif", name));
        self.check_writable(name, &file)?;

        let path = self.root.join(&file);
        write_geotiff(&path, raster)?;
        self.register(name, key, file, Some(*raster.grid()))?;
        info!("Raster '{}' written to {:?}", name, path);
        Ok(path)
    }

    pub fn read_raster(&self, name: &str) -> Result<Raster> {
        let entry = self.entry(name)?;
        let grid = entry
            .grid
            .ok_or_else(|| Error::invalid("raster", name, "artifact is a table, not a raster"))?;
        let data = read_geotiff(&self.root.join(&entry.file), &grid)?;
        Raster::from_vec(grid, data)
    }

    /// Persist table rows as CSV under `name`.
    pub fn save_table<T: Serialize>(&mut self, name: &str, key: ArtifactKey, rows: &[T]) -> Result<PathBuf> {
        let file = Path::new(TABLE_DIR).join(format!("{}.csv", name));
        self.check_writable(name, &file)?;

        let path = self.root.join(&file);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        self.register(name, key, file, None)?;
        info!("Table '{}' written to {:?} ({} rows)", name, path, rows.len());
        Ok(path)
    }

    pub fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let entry = self.entry(name)?;
        if entry.grid.is_some() {
            return Err(Error::invalid("table", name, "artifact is a raster, not a table"));
        }
        let mut reader = csv::Reader::from_path(self.root.join(&entry.file))?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
        Ok(rows)
    }

    fn check_writable(&self, name: &str, file: &Path) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::invalid("name", name, "artifact names must be plain file stems"));
        }
        let exists = self.contains(name) || self.root.join(file).exists();
        if exists && !self.options.overwrite {
            return Err(Error::ArtifactExists(name.to_string()));
        }
        Ok(())
    }

    fn register(&mut self, name: &str, key: ArtifactKey, file: PathBuf, grid: Option<GridSpec>) -> Result<()> {
        self.catalog.entries.insert(
            name.to_string(),
            CatalogEntry {
                name: name.to_string(),
                key,
                file,
                created: Utc::now(),
                grid,
            },
        );
        self.save_catalog()
    }

    fn save_catalog(&self) -> Result<()> {
        let path = self.root.join(CATALOG_FILE);
        let tmp = path.with_extension("json.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, &self.catalog)?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn write_geotiff(path: &Path, raster: &Raster) -> Result<()> {
    let grid = raster.grid();
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<colortype::Gray64Float>(grid.width as u32, grid.height as u32)?;

    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[grid.cell_size, grid.cell_size, 0.0][..])?;
    image.encoder().write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, grid.origin_x, grid.origin_y, 0.0][..],
    )?;
    // Projected model, pixel-is-area, projected CRS from the EPSG code
    image.encoder().write_tag(
        Tag::GeoKeyDirectoryTag,
        &[1u16, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, projected_crs_key(grid.epsg)][..],
    )?;
    image.encoder().write_tag(Tag::Unknown(GDAL_NODATA_TAG), "nan")?;

    image.write_data(raster.data())?;
    Ok(())
}

/// GeoTIFF `ProjectedCSTypeGeoKey` value for an EPSG code.
///
/// Codes outside the 16-bit key range are written as user-defined (32767);
/// the catalog keeps the full code.
fn projected_crs_key(epsg: i32) -> u16 {
    u16::try_from(epsg).unwrap_or_else(|_| {
        warn!("EPSG:{} does not fit a GeoTIFF key, writing it as user-defined", epsg);
        USER_DEFINED_GEO_KEY
    })
}

fn read_geotiff(path: &Path, grid: &GridSpec) -> Result<Vec<f64>> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    if width as usize != grid.width || height as usize != grid.height {
        return Err(Error::invalid(
            "raster",
            path.display(),
            format!(
                "file is {}x{} but the catalog records {}x{}",
                width, height, grid.width, grid.height
            ),
        ));
    }

    match decoder.read_image()? {
        DecodingResult::F64(data) => Ok(data),
        DecodingResult::F32(data) => Ok(data.into_iter().map(f64::from).collect()),
        _ => Err(Error::invalid("raster", path.display(), "expected floating point samples")),
    }
}
