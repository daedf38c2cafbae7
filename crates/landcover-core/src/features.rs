//! Point-wise feature extraction from a named-band raster.
//!
//! Gap policy: a point outside the source grid, or whose value for any band
//! is masked at the requested scale, produces no row. Its index is recorded
//! in [`FeatureTable::omitted`] so reports can state the reduced size. The
//! same policy applies to every representation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::raster::BandStack;
use crate::sampling::SamplePoint;
use crate::taxonomy::ClassCode;

/// One extracted sample: the point it came from, its label, and its band
/// values in table band order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Index into the shared point set.
    pub point: usize,
    pub label: ClassCode,
    pub values: Vec<f32>,
}

/// Tabular feature matrix with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    band_names: Vec<String>,
    rows: Vec<FeatureRow>,
    omitted: Vec<usize>,
}

impl FeatureTable {
    pub fn new(band_names: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self { band_names, rows, omitted: Vec::new() }
    }

    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Indices of requested points that produced no row.
    pub fn omitted(&self) -> &[usize] {
        &self.omitted
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<ClassCode> {
        self.rows.iter().map(|r| r.label).collect()
    }

    /// Distinct labels, ascending.
    pub fn classes(&self) -> Vec<ClassCode> {
        let mut c = self.labels();
        c.sort_unstable();
        c.dedup();
        c
    }
}

/// Sample `source` at `points[i]` for each `i` in `indices`.
pub fn extract_features(
    source: &BandStack,
    points: &[SamplePoint],
    indices: &[usize],
    scale: f64,
) -> Result<FeatureTable> {
    source.validate()?;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ConfigError::InvalidScale(scale).into());
    }

    let mut rows = Vec::with_capacity(indices.len());
    let mut omitted = Vec::new();
    for &i in indices {
        let p = &points[i];
        match source.sample(p.location, scale) {
            Some(values) => rows.push(FeatureRow { point: i, label: p.label, values }),
            None => omitted.push(i),
        }
    }

    if omitted.is_empty() {
        debug!(rows = rows.len(), bands = source.bands.len(), "features extracted");
    } else {
        warn!(
            rows = rows.len(),
            omitted = omitted.len(),
            "points outside the feature source's valid extent were dropped"
        );
    }

    Ok(FeatureTable {
        band_names: source.band_names(),
        rows,
        omitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Bbox, LatLon};
    use crate::raster::GridSpec;

    fn source() -> BandStack {
        let grid = GridSpec::new(2, 2, Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 });
        BandStack::new(grid)
            .with_band("a", vec![1.0, 2.0, 3.0, f32::NAN])
            .unwrap()
            .with_band("b", vec![10.0, 20.0, 30.0, 40.0])
            .unwrap()
    }

    fn pt(lat: f64, lon: f64, label: ClassCode) -> SamplePoint {
        SamplePoint { location: LatLon::new(lat, lon), label }
    }

    #[test]
    fn rows_follow_requested_indices() {
        let points = vec![pt(0.25, 0.25, 0), pt(0.25, 0.75, 1), pt(0.75, 0.25, 2)];
        let t = extract_features(&source(), &points, &[2, 0], 0.01).unwrap();
        assert_eq!(t.band_names(), ["a", "b"]);
        assert_eq!(t.rows()[0], FeatureRow { point: 2, label: 2, values: vec![3.0, 30.0] });
        assert_eq!(t.rows()[1].point, 0);
        assert!(t.omitted().is_empty());
    }

    #[test]
    fn gaps_are_dropped_and_counted() {
        let points = vec![
            pt(0.25, 0.25, 0),
            pt(0.75, 0.75, 1), // band a masked
            pt(5.0, 5.0, 2),   // outside grid
        ];
        let t = extract_features(&source(), &points, &[0, 1, 2], 0.01).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.omitted(), [1, 2]);
        assert_eq!(t.len() + t.omitted().len(), 3);
    }

    #[test]
    fn classes_are_sorted_and_unique() {
        let points = vec![pt(0.25, 0.25, 3), pt(0.25, 0.75, 1), pt(0.75, 0.25, 3)];
        let t = extract_features(&source(), &points, &[0, 1, 2], 0.01).unwrap();
        assert_eq!(t.classes(), vec![1, 3]);
    }
}
