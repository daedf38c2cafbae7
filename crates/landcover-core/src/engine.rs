//! Classifier selection from the run config.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::centroid::{CentroidModel, NearestCentroid};
use crate::classifier::{Classifier, TrainedModel};
use crate::features::FeatureTable;
use crate::forest::{ForestModel, RandomForest};
use crate::taxonomy::ClassCode;

/// `{ "kind": "random_forest", "n_trees": 50, "seed": 42 }` or
/// `{ "kind": "nearest_centroid" }`. Defaults to a 50-tree forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Engine {
    RandomForest(RandomForest),
    NearestCentroid,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::RandomForest(RandomForest::default())
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::RandomForest(rf) => write!(f, "random forest ({} trees, seed {})", rf.n_trees, rf.seed),
            Engine::NearestCentroid => f.write_str("nearest centroid"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EngineModel {
    Forest(ForestModel),
    Centroid(CentroidModel),
}

impl Classifier for Engine {
    type Model = EngineModel;

    fn train(&self, table: &FeatureTable) -> anyhow::Result<EngineModel> {
        Ok(match self {
            Engine::RandomForest(rf) => EngineModel::Forest(rf.train(table)?),
            Engine::NearestCentroid => EngineModel::Centroid(NearestCentroid.train(table)?),
        })
    }
}

impl TrainedModel for EngineModel {
    fn band_names(&self) -> &[String] {
        match self {
            EngineModel::Forest(m) => m.band_names(),
            EngineModel::Centroid(m) => m.band_names(),
        }
    }

    fn predict(&self, rows: &[&[f32]]) -> anyhow::Result<Vec<ClassCode>> {
        match self {
            EngineModel::Forest(m) => m.predict(rows),
            EngineModel::Centroid(m) => m.predict(rows),
        }
    }
}
