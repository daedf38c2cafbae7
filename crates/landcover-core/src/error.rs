//! Error types for the comparison pipeline.
//!
//! Configuration problems are fatal to the whole run and are reported before
//! any raster is sampled. Everything else carries the representation it
//! belongs to (when there is one) so the other pipeline can still report.

use thiserror::Error;

use crate::pipeline::Representation;

/// Problems with the run configuration, detected before sampling starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("source class codes {0:?} have no entry in the taxonomy map")]
    UnmappedCodes(Vec<i32>),

    #[error("taxonomy entry {code} -> {target} targets an undeclared class")]
    UnknownTargetClass { code: i32, target: u8 },

    #[error("taxonomy declares no target classes")]
    EmptyTaxonomy,

    #[error("split ratio must lie strictly between 0 and 1, got {0}")]
    InvalidSplitRatio(f64),

    #[error("sample count must be greater than zero")]
    ZeroSampleCount,

    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f64),

    #[error("region polygon needs at least 3 distinct vertices with non-zero area")]
    DegenerateRegion,

    #[error("raster grid {width}x{height} does not match its data length {len}")]
    GridMismatch { width: usize, height: usize, len: usize },

    #[error("feature source declares no bands")]
    EmptyBandSet,

    #[error("band name {0:?} appears more than once")]
    DuplicateBand(String),

    #[error("invalid parameter {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Main error type for landcover-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{} data unavailable: {reason}", label(.representation))]
    DataUnavailable {
        representation: Option<Representation>,
        reason: String,
    },

    #[error("{representation} band mismatch: model expects {expected:?}, source has {found:?}")]
    BandMismatch {
        representation: Representation,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("{representation} classifier failed: {message}")]
    Classifier {
        representation: Representation,
        message: String,
    },

    #[error("{representation} export of {name:?} failed: {message}")]
    Export {
        representation: Representation,
        name: String,
        message: String,
    },

    #[error("{} run cancelled", label(.representation))]
    Cancelled { representation: Option<Representation> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

impl Error {
    /// The representation pipeline this error belongs to, if any.
    pub fn representation(&self) -> Option<Representation> {
        match self {
            Error::DataUnavailable { representation, .. } => *representation,
            Error::Cancelled { representation } => *representation,
            Error::BandMismatch { representation, .. }
            | Error::Classifier { representation, .. }
            | Error::Export { representation, .. } => Some(*representation),
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Tiff(_) => None,
        }
    }

    pub(crate) fn unavailable(representation: Option<Representation>, reason: impl Into<String>) -> Self {
        Error::DataUnavailable {
            representation,
            reason: reason.into(),
        }
    }
}

fn label(representation: &Option<Representation>) -> String {
    match representation {
        Some(r) => r.to_string(),
        None => "shared".to_string(),
    }
}

/// Result type alias for landcover-core operations.
pub type Result<T> = std::result::Result<T, Error>;
