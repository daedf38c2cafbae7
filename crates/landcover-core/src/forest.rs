//! Random-forest engine backed by `aprender`.
//!
//! Class codes are used directly as aprender's class indices. Each pixel is
//! voted on by every tree and the largest vote share wins; equal shares go
//! to the lower class code.

use std::collections::BTreeSet;

use anyhow::{anyhow, ensure, Context};
use aprender::primitives::Matrix;
use aprender::tree::RandomForestClassifier;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{Classifier, TrainedModel};
use crate::features::FeatureTable;
use crate::taxonomy::ClassCode;

/// Bootstrap-aggregated decision trees. Tree `i` is grown from seed
/// `seed + i`, so training is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForest {
    pub n_trees: usize,
    pub seed: u64,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self { n_trees: 50, seed: 42 }
    }
}

/// Fitted [`RandomForest`].
#[derive(Debug, Clone)]
pub struct ForestModel {
    band_names: Vec<String>,
    /// Sorted; every code seen in training.
    classes: Vec<ClassCode>,
    forest: RandomForestClassifier,
}

impl ForestModel {
    pub fn classes(&self) -> &[ClassCode] {
        &self.classes
    }
}

impl Classifier for RandomForest {
    type Model = ForestModel;

    fn train(&self, table: &FeatureTable) -> anyhow::Result<ForestModel> {
        ensure!(self.n_trees > 0, "random forest needs at least one tree");
        let n_bands = table.band_names().len();
        ensure!(n_bands > 0, "feature table has no bands");
        ensure!(!table.is_empty(), "no training rows");

        let mut data = Vec::with_capacity(table.len() * n_bands);
        let mut labels = Vec::with_capacity(table.len());
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
            data.extend_from_slice(&row.values);
            labels.push(usize::from(row.label));
        }
        let x = Matrix::from_vec(table.len(), n_bands, data).map_err(|e| anyhow!(e))?;

        let mut forest = RandomForestClassifier::new(self.n_trees).with_random_state(self.seed);
        forest
            .fit(&x, &labels)
            .map_err(|e| anyhow!("random forest fit failed: {e}"))?;

        let classes: BTreeSet<ClassCode> = table.rows().iter().map(|r| r.label).collect();
        debug!(trees = self.n_trees, rows = table.len(), classes = classes.len(), "random forest trained");
        Ok(ForestModel {
            band_names: table.band_names().to_vec(),
            classes: classes.into_iter().collect(),
            forest,
        })
    }
}

impl TrainedModel for ForestModel {
    fn band_names(&self) -> &[String] {
        &self.band_names
    }

    fn predict(&self, rows: &[&[f32]]) -> anyhow::Result<Vec<ClassCode>> {
        let n_bands = self.band_names.len();
        rows.iter()
            .map(|row| {
                ensure!(
                    row.len() == n_bands,
                    "row has {} values, model expects {}",
                    row.len(),
                    n_bands
                );
                // One pixel per matrix; aprender's voting is quadratic in rows.
                let x = Matrix::from_vec(1, n_bands, row.to_vec()).map_err(|e| anyhow!(e))?;
                let shares = self.forest.predict_proba(&x);
                let mut best: Option<(f32, ClassCode)> = None;
                for &class in &self.classes {
                    let share = shares.get(0, usize::from(class));
                    if best.map_or(true, |(b, _)| share > b) {
                        best = Some((share, class));
                    }
                }
                best.map(|(_, class)| class).context("model has no classes")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;

    fn table() -> FeatureTable {
        let mut rows = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            let (label, values) = match i % 3 {
                0 => (0, vec![0.1 + jitter, 120.0]),
                1 => (2, vec![0.5 + jitter, 60.0]),
                _ => (3, vec![0.9 + jitter, 10.0]),
            };
            rows.push(FeatureRow { point: i, label, values });
        }
        FeatureTable::new(vec!["ndvi".into(), "elevation".into()], rows)
    }

    #[test]
    fn separable_classes_are_recovered() {
        let model = RandomForest::default().train(&table()).unwrap();
        assert_eq!(model.classes(), [0, 2, 3]);
        let rows: [&[f32]; 3] = [&[0.12, 118.0], &[0.52, 61.0], &[0.93, 9.0]];
        assert_eq!(model.predict(&rows).unwrap(), vec![0, 2, 3]);
    }

    #[test]
    fn same_seed_same_predictions() {
        let forest = RandomForest { n_trees: 10, seed: 7 };
        let a = forest.train(&table()).unwrap();
        let b = forest.train(&table()).unwrap();
        let rows: Vec<Vec<f32>> = (0..30).map(|i| vec![i as f32 / 30.0, 130.0 - 4.0 * i as f32]).collect();
        let rows: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        assert_eq!(a.predict(&rows).unwrap(), b.predict(&rows).unwrap());
    }

    #[test]
    fn zero_trees_is_rejected() {
        let err = RandomForest { n_trees: 0, seed: 1 }.train(&table()).unwrap_err();
        assert!(err.to_string().contains("at least one tree"));
    }

    #[test]
    fn wrong_width_rows_are_errors() {
        let model = RandomForest { n_trees: 5, seed: 1 }.train(&table()).unwrap();
        assert!(model.predict(&[&[0.5]]).is_err());
    }

    #[test]
    fn non_finite_training_values_are_rejected() {
        let rows = vec![FeatureRow { point: 0, label: 1, values: vec![f32::NAN, 1.0] }];
        let t = FeatureTable::new(vec!["a".into(), "b".into()], rows);
        assert!(RandomForest::default().train(&t).is_err());
    }

    #[test]
    fn json_fields_default() {
        let f: RandomForest = serde_json::from_str(r#"{ "n_trees": 10 }"#).unwrap();
        assert_eq!(f, RandomForest { n_trees: 10, seed: 42 });
    }
}
