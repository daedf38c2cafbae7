//! Land-cover classification comparison: spectral composite vs. embedding.
//!
//! One stratified, seeded point sample and train/validation split are shared
//! by both feature representations, so their accuracy reports are directly
//! comparable. Imagery, embeddings and the classifier are external
//! capabilities; sampling, splitting and assessment live here.

pub mod accuracy;
pub mod cancel;
pub mod centroid;
pub mod classifier;
pub mod composite;
pub mod config;
pub mod coords;
pub mod engine;
pub mod error;
pub mod export;
pub mod features;
pub mod forest;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod sampling;
pub mod split;
pub mod taxonomy;

pub use accuracy::{AccuracyReport, ConfusionMatrix};
pub use cancel::CancelToken;
pub use centroid::NearestCentroid;
pub use classifier::{Classifier, TrainedModel};
pub use config::RunConfig;
pub use engine::Engine;
pub use error::{ConfigError, Error, Result};
pub use export::{Exporter, Palette};
pub use forest::RandomForest;
pub use pipeline::{Comparison, PipelineRunner, Representation, SharedSamples, Verdict};
pub use raster::{BandStack, ClassRaster, GridSpec};
pub use region::Region;
pub use taxonomy::Taxonomy;
