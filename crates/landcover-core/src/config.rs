//! Run configuration file.
//!
//! ```json
//! {
//!   "region": { "name": "delta", "coordinates": [[31.0, 30.0], [31.5, 30.0], [31.5, 30.5]] },
//!   "inputs": {
//!     "reference": { "format": "tiff", "path": "worldcover.tif", "bbox": { ... }, "nodata": 0 },
//!     "imagery":   { "format": "tiff", "bands": [{ "name": "B4", "path": "b4.tif" }], "bbox": { ... } },
//!     "terrain":   { "format": "json", "path": "terrain.json" },
//!     "embedding": { "format": "json", "path": "embedding.json" }
//!   }
//! }
//! ```
//!
//! Everything else (taxonomy, sampling, split, spectral indices, classifier,
//! export) has defaults. Relative paths resolve against the config file's directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::composite::{sentinel2_indices, NormalizedDifference};
use crate::coords::Bbox;
use crate::engine::Engine;
use crate::error::{ConfigError, Result};
use crate::io;
use crate::pipeline::ExportNames;
use crate::raster::{BandStack, ClassRaster};
use crate::region::Region;
use crate::sampling::SamplingParams;
use crate::split::SplitParams;
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub region: Region,
    #[serde(default)]
    pub taxonomy: Taxonomy,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub split: SplitParams,
    #[serde(default = "sentinel2_indices")]
    pub spectral_indices: Vec<NormalizedDifference>,
    pub inputs: Inputs,
    #[serde(default)]
    pub classifier: Engine,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inputs {
    /// Reference land-cover codes in the source taxonomy.
    pub reference: ClassSource,
    /// Multi-band imagery composite.
    pub imagery: StackSource,
    /// Must provide `elevation` and `slope`.
    pub terrain: StackSource,
    pub embedding: StackSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ClassSource {
    Json {
        path: PathBuf,
    },
    Tiff {
        path: PathBuf,
        bbox: Bbox,
        #[serde(default)]
        nodata: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandFile {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum StackSource {
    Json {
        path: PathBuf,
    },
    Tiff {
        bands: Vec<BandFile>,
        bbox: Bbox,
        #[serde(default)]
        nodata: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: PathBuf,
    #[serde(flatten)]
    pub names: ExportNames,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output"), names: ExportNames::default() }
    }
}

impl ClassSource {
    pub fn load(&self) -> Result<ClassRaster> {
        match self {
            ClassSource::Json { path } => io::load_class_raster(path),
            ClassSource::Tiff { path, bbox, nodata } => io::load_class_tiff(path, *bbox, *nodata),
        }
    }

    fn rebase(&mut self, base: &Path) {
        match self {
            ClassSource::Json { path } | ClassSource::Tiff { path, .. } => rebase(path, base),
        }
    }
}

impl StackSource {
    pub fn load(&self) -> Result<BandStack> {
        match self {
            StackSource::Json { path } => io::load_band_stack(path),
            StackSource::Tiff { bands, bbox, nodata } => {
                let files: Vec<(String, &Path)> = bands.iter().map(|b| (b.name.clone(), b.path.as_path())).collect();
                io::load_tiff_stack(&files, *bbox, *nodata)
            }
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let StackSource::Tiff { bands, .. } = self else {
            return Ok(());
        };
        if bands.is_empty() {
            return Err(ConfigError::EmptyBandSet);
        }
        let mut seen = BTreeSet::new();
        for b in bands {
            if !seen.insert(b.name.as_str()) {
                return Err(ConfigError::DuplicateBand(b.name.clone()));
            }
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        match self {
            StackSource::Json { path } => rebase(path, base),
            StackSource::Tiff { bands, .. } => bands.iter_mut().for_each(|b| rebase(&mut b.path, base)),
        }
    }
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

impl RunConfig {
    /// Parse and validate a config; relative paths stay as written.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, validate and resolve relative paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json_str(&text)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        info!(
            path = %path.display(),
            region = config.region.name(),
            points = config.sampling.points,
            seed = config.sampling.seed,
            classifier = %config.classifier,
            "run config loaded"
        );
        Ok(config)
    }

    /// Every configuration check that does not need raster contents.
    /// Taxonomy coverage of the reference codes is checked on reclassification.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.sampling.validate()?;
        self.split.validate()?;
        if let Engine::RandomForest(rf) = self.classifier {
            if rf.n_trees == 0 {
                return Err(ConfigError::InvalidParameter {
                    name: "classifier.n_trees",
                    value: "0".into(),
                    reason: "a random forest needs at least one tree".into(),
                });
            }
        }
        for nd in &self.spectral_indices {
            if nd.name.is_empty() || nd.a.is_empty() || nd.b.is_empty() {
                return Err(ConfigError::InvalidParameter {
                    name: "spectral_indices",
                    value: format!("{nd:?}"),
                    reason: "index and input band names must be non-empty".into(),
                });
            }
        }
        for source in [&self.inputs.imagery, &self.inputs.terrain, &self.inputs.embedding] {
            source.validate()?;
        }
        if self.export.names.spectral_composite == self.export.names.embedding {
            return Err(ConfigError::InvalidParameter {
                name: "export",
                value: self.export.names.embedding.clone(),
                reason: "representations need distinct export names".into(),
            });
        }
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        self.inputs.reference.rebase(base);
        self.inputs.imagery.rebase(base);
        self.inputs.terrain.rebase(base);
        self.inputs.embedding.rebase(base);
        rebase(&mut self.export.dir, base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Allocation;

    const MINIMAL: &str = r#"{
        "region": { "name": "delta", "coordinates": [[0, 0], [1, 0], [1, 1], [0, 1]] },
        "inputs": {
            "reference": { "format": "json", "path": "ref.json" },
            "imagery": {
                "format": "tiff",
                "bands": [{ "name": "B4", "path": "b4.tif" }, { "name": "B8", "path": "/abs/b8.tif" }],
                "bbox": { "min_lat": 0, "max_lat": 1, "min_lon": 0, "max_lon": 1 },
                "nodata": -9999
            },
            "terrain": { "format": "json", "path": "terrain.json" },
            "embedding": { "format": "json", "path": "embedding.json" }
        }
    }"#;

    #[test]
    fn defaults_fill_optional_sections() {
        let c = RunConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(c.sampling.points, 200);
        assert_eq!(c.sampling.seed, 42);
        assert_eq!(c.sampling.allocation, Allocation::Equal);
        assert_eq!(c.split, SplitParams::default());
        assert_eq!(c.taxonomy, Taxonomy::worldcover_four_class());
        assert_eq!(c.spectral_indices.len(), 3);
        assert_eq!(c.export.dir, PathBuf::from("output"));
        assert_eq!(c.export.names, ExportNames::default());
        assert_eq!(c.classifier, Engine::RandomForest(crate::forest::RandomForest { n_trees: 50, seed: 42 }));
    }

    #[test]
    fn classifier_can_be_selected() {
        let text = MINIMAL.replacen("\"inputs\"", "\"classifier\": { \"kind\": \"nearest_centroid\" }, \"inputs\"", 1);
        assert_eq!(RunConfig::from_json_str(&text).unwrap().classifier, Engine::NearestCentroid);

        let text = MINIMAL.replacen(
            "\"inputs\"",
            "\"classifier\": { \"kind\": \"random_forest\", \"n_trees\": 0 }, \"inputs\"",
            1,
        );
        assert!(matches!(
            RunConfig::from_json_str(&text),
            Err(crate::error::Error::Config(ConfigError::InvalidParameter { name: "classifier.n_trees", .. }))
        ));
    }

    #[test]
    fn invalid_split_is_a_config_error() {
        let text = MINIMAL.replacen("\"inputs\"", "\"split\": { \"ratio\": 0.0 }, \"inputs\"", 1);
        assert!(matches!(
            RunConfig::from_json_str(&text),
            Err(crate::error::Error::Config(ConfigError::InvalidSplitRatio(_)))
        ));
    }

    #[test]
    fn duplicate_tiff_bands_are_rejected() {
        let text = MINIMAL.replace("\"name\": \"B8\"", "\"name\": \"B4\"");
        assert!(matches!(
            RunConfig::from_json_str(&text),
            Err(crate::error::Error::Config(ConfigError::DuplicateBand(_)))
        ));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let c = RunConfig::load(&path).unwrap();
        assert_eq!(c.inputs.reference, ClassSource::Json { path: dir.path().join("ref.json") });
        let StackSource::Tiff { bands, .. } = &c.inputs.imagery else {
            panic!("imagery should be tiff");
        };
        assert_eq!(bands[0].path, dir.path().join("b4.tif"));
        assert_eq!(bands[1].path, PathBuf::from("/abs/b8.tif"));
        assert_eq!(c.export.dir, dir.path().join("output"));
    }

    #[test]
    fn export_names_can_be_overridden() {
        let text = MINIMAL.replacen(
            "\"inputs\"",
            "\"export\": { \"dir\": \"out\", \"embedding\": \"emb\" }, \"inputs\"",
            1,
        );
        let c = RunConfig::from_json_str(&text).unwrap();
        assert_eq!(c.export.names.embedding, "emb");
        assert_eq!(c.export.names.spectral_composite, "S2_Classified_Image");
    }
}
