//! Label taxonomy and reference-raster reclassification.
//!
//! A taxonomy declares the small target class set (code, name, palette
//! colour) and a total lookup from source codes to target codes. The lookup
//! is applied once per pixel; there is no cascading rewrite.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::raster::{ClassRaster, NODATA_CLASS};

/// Target class code.
pub type ClassCode = u8;

/// One class of the target taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetClass {
    pub code: ClassCode,
    pub name: String,
    /// RGB colour used when visualising classified rasters.
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingEntry {
    source: Vec<i32>,
    target: ClassCode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaxonomyDef {
    classes: Vec<TargetClass>,
    mapping: Vec<MappingEntry>,
}

/// Target class set plus the source → target lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaxonomyDef", into = "TaxonomyDef")]
pub struct Taxonomy {
    /// Sorted by code.
    classes: Vec<TargetClass>,
    lookup: BTreeMap<i32, ClassCode>,
}

impl TryFrom<TaxonomyDef> for Taxonomy {
    type Error = ConfigError;

    fn try_from(def: TaxonomyDef) -> Result<Self, Self::Error> {
        let pairs = def
            .mapping
            .iter()
            .flat_map(|e| e.source.iter().map(move |&s| (s, e.target)));
        Taxonomy::new(def.classes, pairs)
    }
}

impl From<Taxonomy> for TaxonomyDef {
    fn from(t: Taxonomy) -> Self {
        let mut grouped: BTreeMap<ClassCode, Vec<i32>> = BTreeMap::new();
        for (&s, &tgt) in &t.lookup {
            grouped.entry(tgt).or_default().push(s);
        }
        TaxonomyDef {
            classes: t.classes,
            mapping: grouped
                .into_iter()
                .map(|(target, source)| MappingEntry { source, target })
                .collect(),
        }
    }
}

impl Taxonomy {
    /// Build a taxonomy. Every target must be a declared class, and a source
    /// code listed twice must agree with itself.
    pub fn new(
        mut classes: Vec<TargetClass>,
        pairs: impl IntoIterator<Item = (i32, ClassCode)>,
    ) -> Result<Self, ConfigError> {
        if classes.is_empty() {
            return Err(ConfigError::EmptyTaxonomy);
        }
        classes.sort_by_key(|c| c.code);
        for w in classes.windows(2) {
            if w[0].code == w[1].code {
                return Err(ConfigError::InvalidParameter {
                    name: "taxonomy.classes",
                    value: w[0].code.to_string(),
                    reason: "class code declared twice".into(),
                });
            }
        }

        let mut lookup = BTreeMap::new();
        for (code, target) in pairs {
            if classes.binary_search_by_key(&target, |c| c.code).is_err() {
                return Err(ConfigError::UnknownTargetClass { code, target });
            }
            if let Some(prev) = lookup.insert(code, target) {
                if prev != target {
                    return Err(ConfigError::InvalidParameter {
                        name: "taxonomy.mapping",
                        value: code.to_string(),
                        reason: format!("mapped to both {prev} and {target}"),
                    });
                }
            }
        }

        Ok(Self { classes, lookup })
    }

    /// ESA WorldCover 2021 collapsed to Urban / Bare / Water / Vegetation.
    pub fn worldcover_four_class() -> Self {
        let classes = vec![
            TargetClass { code: 0, name: "Urban".into(), color: [255, 0, 255] },
            TargetClass { code: 1, name: "Bare".into(), color: [255, 255, 0] },
            TargetClass { code: 2, name: "Water".into(), color: [0, 0, 255] },
            TargetClass { code: 3, name: "Vegetation".into(), color: [0, 128, 0] },
        ];
        let pairs = [
            (10, 3), // tree cover
            (20, 3), // shrubland
            (30, 3), // grassland
            (40, 3), // cropland
            (50, 0), // built-up
            (60, 1), // bare / sparse vegetation
            (70, 1), // snow and ice
            (80, 2), // permanent water
            (90, 2), // herbaceous wetland
            (95, 3), // mangroves
            (100, 1), // moss and lichen
        ];
        Self {
            lookup: pairs.into_iter().collect(),
            classes,
        }
    }

    pub fn classes(&self) -> &[TargetClass] {
        &self.classes
    }

    pub fn class_codes(&self) -> Vec<ClassCode> {
        self.classes.iter().map(|c| c.code).collect()
    }

    pub fn target_for(&self, source: i32) -> Option<ClassCode> {
        self.lookup.get(&source).copied()
    }

    /// Fail with every source code the lookup does not cover.
    pub fn check_covers(&self, codes: &[i32]) -> Result<(), ConfigError> {
        let missing: Vec<i32> = codes
            .iter()
            .copied()
            .filter(|c| !self.lookup.contains_key(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::UnmappedCodes(missing))
        }
    }

    /// Map a reference raster onto target codes.
    ///
    /// The output shares the input grid; reference nodata becomes
    /// [`NODATA_CLASS`]. Coverage is checked over the whole raster before
    /// any pixel is written.
    pub fn reclassify(&self, reference: &ClassRaster) -> Result<ClassRaster, ConfigError> {
        reference.validate()?;
        let codes = reference.distinct_codes();
        self.check_covers(&codes)?;
        debug!(source_codes = ?codes, "reference codes covered by taxonomy");

        let data = reference
            .data
            .iter()
            .map(|&v| {
                if Some(v) == reference.nodata {
                    NODATA_CLASS
                } else {
                    // Coverage was checked above.
                    self.lookup.get(&v).map_or(NODATA_CLASS, |&t| t as i32)
                }
            })
            .collect();

        let out = ClassRaster {
            grid: reference.grid,
            data,
            nodata: Some(NODATA_CLASS),
        };
        info!(
            pixels = out.data.len(),
            target_classes = self.classes.len(),
            "reclassified reference raster"
        );
        Ok(out)
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::worldcover_four_class()
    }
}
