//! Multi-band minimum-distance classifier.
//!
//! Each band is standardised with the training mean and standard deviation,
//! then a pixel is assigned to the class whose standardised centroid is
//! nearest in Euclidean distance. Ties go to the lower class code, so
//! predictions are fully deterministic.

use std::collections::BTreeMap;

use anyhow::{bail, ensure};

use crate::classifier::{Classifier, TrainedModel};
use crate::features::FeatureTable;
use crate::taxonomy::ClassCode;

/// Zero-configuration reference classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroid;

/// Fitted [`NearestCentroid`] model.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidModel {
    band_names: Vec<String>,
    mean: Vec<f64>,
    /// Guarded against zero.
    std_dev: Vec<f64>,
    /// Sorted by class code.
    centroids: Vec<(ClassCode, Vec<f64>)>,
}

impl CentroidModel {
    pub fn classes(&self) -> Vec<ClassCode> {
        self.centroids.iter().map(|(c, _)| *c).collect()
    }

    fn standardise(&self, row: &[f32]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std_dev))
            .map(|(&v, (m, s))| (v as f64 - m) / s)
            .collect()
    }
}

impl Classifier for NearestCentroid {
    type Model = CentroidModel;

    fn train(&self, table: &FeatureTable) -> anyhow::Result<CentroidModel> {
        let n_bands = table.band_names().len();
        ensure!(n_bands > 0, "feature table has no bands");
        if table.is_empty() {
            bail!("no training rows");
        }
        for row in table.rows() {
            ensure!(
                row.values.len() == n_bands,
                "row for point {} has {} values, expected {}",
                row.point,
                row.values.len(),
                n_bands
            );
            ensure!(
                row.values.iter().all(|v| v.is_finite()),
                "row for point {} has non-finite values",
                row.point
            );
        }

        let n = table.len() as f64;
        let mut mean = vec![0.0f64; n_bands];
        for row in table.rows() {
            for (m, &v) in mean.iter_mut().zip(&row.values) {
                *m += v as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std_dev = vec![0.0f64; n_bands];
        for row in table.rows() {
            for ((s, &v), m) in std_dev.iter_mut().zip(&row.values).zip(&mean) {
                *s += (v as f64 - m).powi(2);
            }
        }
        std_dev
            .iter_mut()
            .for_each(|s| *s = (*s / n).sqrt().max(1e-10)); // Guard against zero variance

        let mut sums: BTreeMap<ClassCode, (Vec<f64>, usize)> = BTreeMap::new();
        for row in table.rows() {
            let entry = sums.entry(row.label).or_insert_with(|| (vec![0.0; n_bands], 0));
            for ((acc, &v), (m, s)) in entry.0.iter_mut().zip(&row.values).zip(mean.iter().zip(&std_dev)) {
                *acc += (v as f64 - m) / s;
            }
            entry.1 += 1;
        }
        let centroids = sums
            .into_iter()
            .map(|(class, (acc, count))| (class, acc.into_iter().map(|a| a / count as f64).collect()))
            .collect();

        Ok(CentroidModel {
            band_names: table.band_names().to_vec(),
            mean,
            std_dev,
            centroids,
        })
    }
}

impl TrainedModel for CentroidModel {
    fn band_names(&self) -> &[String] {
        &self.band_names
    }

    fn predict(&self, rows: &[&[f32]]) -> anyhow::Result<Vec<ClassCode>> {
        rows.iter()
            .map(|row| {
                ensure!(
                    row.len() == self.band_names.len(),
                    "row has {} values, model expects {}",
                    row.len(),
                    self.band_names.len()
                );
                let z = self.standardise(row);
                let mut best = (f64::INFINITY, self.centroids[0].0);
                for (class, centroid) in &self.centroids {
                    let d: f64 = z.iter().zip(centroid).map(|(a, b)| (a - b).powi(2)).sum();
                    if d < best.0 {
                        best = (d, *class);
                    }
                }
                Ok(best.1)
            })
            .collect()
    }
}
