//! Export capability for classified rasters.
//!
//! Exporters receive the raster, the class palette and a name, and return
//! where the artifact ended up. [`write_atomic`] lets implementations avoid
//! leaving a half-written file under the final name.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::raster::ClassRaster;
use crate::taxonomy::{ClassCode, Taxonomy};

/// Class code → RGB colour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    entries: Vec<(ClassCode, [u8; 3])>,
}

impl Palette {
    pub fn from_taxonomy(taxonomy: &Taxonomy) -> Self {
        Self {
            entries: taxonomy.classes().iter().map(|c| (c.code, c.color)).collect(),
        }
    }

    /// Colour of a raster value; None for nodata or undeclared codes.
    pub fn color(&self, value: i32) -> Option<[u8; 3]> {
        let code = ClassCode::try_from(value).ok()?;
        self.entries.iter().find(|(c, _)| *c == code).map(|(_, rgb)| *rgb)
    }
}

/// Persists classified rasters for external consumption.
pub trait Exporter: Send + Sync {
    fn export(&self, raster: &ClassRaster, palette: &Palette, name: &str) -> anyhow::Result<PathBuf>;
}

/// Writes the raster itself as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    dir: PathBuf,
}

impl JsonExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Exporter for JsonExporter {
    fn export(&self, raster: &ClassRaster, _palette: &Palette, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.dir.join(format!("{name}.json"));
        write_atomic(&path, serde_json::to_string(raster)?.as_bytes())?;
        Ok(path)
    }
}

/// Write `bytes` to a sibling temporary file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Bbox;
    use crate::raster::{GridSpec, NODATA_CLASS};

    #[test]
    fn palette_follows_taxonomy() {
        let p = Palette::from_taxonomy(&Taxonomy::worldcover_four_class());
        assert_eq!(p.color(0), Some([255, 0, 255]));
        assert_eq!(p.color(2), Some([0, 0, 255]));
        assert_eq!(p.color(NODATA_CLASS), None);
        assert_eq!(p.color(9), None);
    }

    #[test]
    fn json_export_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(1, 1, Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 });
        let raster = ClassRaster::empty_target(grid);
        let palette = Palette::from_taxonomy(&Taxonomy::default());
        let path = JsonExporter::new(dir.path().join("out"))
            .export(&raster, &palette, "embedding_classified")
            .unwrap();
        assert!(path.ends_with("embedding_classified.json"));
        let back: ClassRaster = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, raster);
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
