//! Dual-representation orchestration.
//!
//! Sampling and the train/validation split happen once ([`SharedSamples`]).
//! Each representation then runs its own chain over the shared, read-only
//! points: extract → train → validate → assess → classify. A failure in one
//! chain is recorded in its [`RepresentationOutcome`] and never stops the
//! other. Exports happen only after both chains finished and the run was not
//! cancelled.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::accuracy::{AccuracyReport, ConfusionMatrix};
use crate::cancel::CancelToken;
use crate::classifier::{self, Classifier};
use crate::error::{ConfigError, Error, Result};
use crate::export::{Exporter, Palette};
use crate::features::extract_features;
use crate::raster::{BandStack, ClassRaster};
use crate::region::Region;
use crate::sampling::{stratified_sample, SamplePoint, SampleSet, SamplingParams};
use crate::split::{SplitAssignment, SplitParams, Subset};
use crate::taxonomy::{ClassCode, Taxonomy};

// ── Representations ───────────────────────────────────────────────────────────

/// A feature source the classifier can be trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Imagery composite plus spectral indices and terrain bands.
    SpectralComposite,
    /// Pretrained per-pixel embedding bands.
    Embedding,
}

impl Representation {
    pub const ALL: [Representation; 2] = [Representation::SpectralComposite, Representation::Embedding];

    pub fn default_export_name(self) -> &'static str {
        match self {
            Representation::SpectralComposite => "S2_Classified_Image",
            Representation::Embedding => "Embeddings_Classified_Image",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Representation::SpectralComposite => "spectral composite",
            Representation::Embedding => "embedding",
        })
    }
}

/// Output name per representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    pub spectral_composite: String,
    pub embedding: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            spectral_composite: Representation::SpectralComposite.default_export_name().into(),
            embedding: Representation::Embedding.default_export_name().into(),
        }
    }
}

impl ExportNames {
    pub fn name_for(&self, representation: Representation) -> &str {
        match representation {
            Representation::SpectralComposite => &self.spectral_composite,
            Representation::Embedding => &self.embedding,
        }
    }
}

// ── Shared samples ────────────────────────────────────────────────────────────

/// Points and split shared read-only by every representation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedSamples {
    samples: SampleSet,
    split: SplitAssignment,
}

impl SharedSamples {
    /// Reclassify `reference`, draw the stratified sample and split it.
    ///
    /// Every configuration check runs before the raster is sampled.
    pub fn prepare(
        reference: &ClassRaster,
        taxonomy: &Taxonomy,
        region: &Region,
        sampling: &SamplingParams,
        split: &SplitParams,
    ) -> Result<Self> {
        sampling.validate()?;
        split.validate()?;
        let labels = taxonomy.reclassify(reference)?;
        let samples = stratified_sample(&labels, region, sampling)?;
        let split = SplitAssignment::assign(samples.len(), split)?;
        Ok(Self { samples, split })
    }

    /// Pair an existing sample with its split, e.g. one read back from disk.
    pub fn from_parts(samples: SampleSet, split: SplitAssignment) -> Result<Self> {
        if samples.len() != split.len() {
            return Err(ConfigError::InvalidParameter {
                name: "split",
                value: split.len().to_string(),
                reason: format!("expected one split value per sample point ({})", samples.len()),
            }
            .into());
        }
        Ok(Self { samples, split })
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.samples.points
    }

    pub fn split(&self) -> &SplitAssignment {
        &self.split
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ── Single representation ─────────────────────────────────────────────────────

/// Everything one representation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RepresentationRun {
    pub representation: Representation,
    pub report: AccuracyReport,
    pub classified: ClassRaster,
}

/// Run extract → train → validate → assess → classify for one source.
///
/// `classes` seeds the confusion-matrix axis so classes absent from the
/// validation set still appear (with NaN accuracies).
#[allow(clippy::too_many_arguments)]
pub fn run_representation<C: Classifier>(
    classifier: &C,
    representation: Representation,
    source: &BandStack,
    region: &Region,
    shared: &SharedSamples,
    scale: f64,
    classes: &[ClassCode],
    cancel: &CancelToken,
) -> Result<RepresentationRun> {
    let rep = Some(representation);
    cancel.check(rep)?;
    source
        .validate()
        .map_err(|e| Error::unavailable(rep, e.to_string()))?;
    if !region.bbox().intersects(&source.grid.bbox()) {
        return Err(Error::unavailable(
            rep,
            format!("feature source does not intersect region {:?}", region.name()),
        ));
    }

    // ── 1. Training features ────────────────────────────────────────────────
    let points = shared.points();
    let training_idx = shared.split().indices(Subset::Training);
    let training = extract_features(source, points, &training_idx, scale)?;

    // ── 2. Train ────────────────────────────────────────────────────────────
    cancel.check(rep)?;
    let model = classifier::train(classifier, &training, representation)?;

    // ── 3. Validate ─────────────────────────────────────────────────────────
    cancel.check(rep)?;
    let validation_idx = shared.split().indices(Subset::Validation);
    let validation = extract_features(source, points, &validation_idx, scale)?;
    let predicted = if validation.is_empty() {
        Vec::new()
    } else {
        classifier::predict_table(&model, &validation, representation)?
    };

    // ── 4. Assess ───────────────────────────────────────────────────────────
    let matrix = ConfusionMatrix::from_pairs(&validation.labels(), &predicted, classes)?;
    let mut report = AccuracyReport::from_matrix(representation, matrix);
    report.training_points = training.len();
    report.omitted_training = training.omitted().len();
    report.omitted_validation = validation.omitted().len();
    info!(
        %representation,
        overall_accuracy = report.overall_accuracy,
        validation = report.validation_points,
        omitted = report.omitted_validation,
        "accuracy assessed"
    );

    // ── 5. Classify ─────────────────────────────────────────────────────────
    let classified = classifier::classify_raster(&model, source, region, representation, cancel)?;

    Ok(RepresentationRun { representation, report, classified })
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Result of one representation within a comparison.
#[derive(Debug)]
pub struct RepresentationOutcome {
    pub representation: Representation,
    pub result: Result<RepresentationRun>,
    /// Set only for successful runs.
    pub export: Option<Result<PathBuf>>,
}

/// Which representation scored the higher overall accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Preferred {
        representation: Representation,
        margin: f64,
    },
    Tie,
    /// At least one representation has no finite overall accuracy.
    Incomplete,
}

/// Both representations' outcomes over one shared sample.
#[derive(Debug)]
pub struct Comparison {
    pub points: usize,
    pub training_points: usize,
    pub validation_points: usize,
    pub outcomes: Vec<RepresentationOutcome>,
}

impl Comparison {
    pub fn outcome(&self, representation: Representation) -> Option<&RepresentationOutcome> {
        self.outcomes.iter().find(|o| o.representation == representation)
    }

    pub fn report(&self, representation: Representation) -> Option<&AccuracyReport> {
        self.outcome(representation)?.result.as_ref().ok().map(|run| &run.report)
    }

    pub fn verdict(&self) -> Verdict {
        let (Some(a), Some(b)) = (
            self.report(Representation::SpectralComposite),
            self.report(Representation::Embedding),
        ) else {
            return Verdict::Incomplete;
        };
        let (x, y) = (a.overall_accuracy, b.overall_accuracy);
        if !(x.is_finite() && y.is_finite()) {
            return Verdict::Incomplete;
        }
        if x == y {
            Verdict::Tie
        } else if x > y {
            Verdict::Preferred { representation: a.representation, margin: x - y }
        } else {
            Verdict::Preferred { representation: b.representation, margin: y - x }
        }
    }

    /// Serializable digest for reporting.
    pub fn summary(&self) -> ComparisonSummary {
        let mut failures = Vec::new();
        let mut exports = Vec::new();
        for o in &self.outcomes {
            if let Err(e) = &o.result {
                failures.push(FailureSummary { representation: o.representation, error: e.to_string() });
            }
            match &o.export {
                Some(Ok(path)) => exports.push(ExportSummary {
                    representation: o.representation,
                    path: path.clone(),
                }),
                Some(Err(e)) => failures.push(FailureSummary {
                    representation: o.representation,
                    error: e.to_string(),
                }),
                None => {}
            }
        }
        ComparisonSummary {
            points: self.points,
            training_points: self.training_points,
            validation_points: self.validation_points,
            verdict: self.verdict(),
            failures,
            exports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub points: usize,
    pub training_points: usize,
    pub validation_points: usize,
    pub verdict: Verdict,
    pub failures: Vec<FailureSummary>,
    pub exports: Vec<ExportSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub representation: Representation,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub representation: Representation,
    pub path: PathBuf,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs both representations over one shared sample and exports the results.
pub struct PipelineRunner<'a, C, E> {
    classifier: &'a C,
    exporter: &'a E,
    palette: Palette,
    classes: Vec<ClassCode>,
    scale: f64,
    names: ExportNames,
    cancel: CancelToken,
}

impl<'a, C: Classifier, E: Exporter> PipelineRunner<'a, C, E> {
    pub fn new(classifier: &'a C, exporter: &'a E, taxonomy: &Taxonomy, scale: f64) -> Self {
        Self {
            classifier,
            exporter,
            palette: Palette::from_taxonomy(taxonomy),
            classes: taxonomy.class_codes(),
            scale,
            names: ExportNames::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_export_names(mut self, names: ExportNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run both representations, then export each successful one.
    ///
    /// A source that failed to load is passed in as `Err` and fails only its
    /// own representation. The returned error is reserved for run-level
    /// failures: invalid scale or cancellation.
    pub fn run(
        &self,
        region: &Region,
        shared: &SharedSamples,
        spectral: Result<BandStack>,
        embedding: Result<BandStack>,
    ) -> Result<Comparison> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::InvalidScale(self.scale).into());
        }
        self.cancel.check(None)?;

        // ── 1. Both chains ──────────────────────────────────────────────────
        let run_spectral = || self.run_one(Representation::SpectralComposite, spectral, region, shared);
        let run_embedding = || self.run_one(Representation::Embedding, embedding, region, shared);
        #[cfg(feature = "threading")]
        let (spectral, embedding) = rayon::join(run_spectral, run_embedding);
        #[cfg(not(feature = "threading"))]
        let (spectral, embedding) = (run_spectral(), run_embedding());

        if self.cancel.is_cancelled() {
            warn!("run cancelled; nothing exported");
            return Err(Error::Cancelled { representation: None });
        }

        // ── 2. Exports ──────────────────────────────────────────────────────
        let outcomes = [(Representation::SpectralComposite, spectral), (Representation::Embedding, embedding)]
            .into_iter()
            .map(|(representation, result)| {
                let export = result.as_ref().ok().map(|run| self.export(run));
                RepresentationOutcome { representation, result, export }
            })
            .collect();

        Ok(Comparison {
            points: shared.len(),
            training_points: shared.split().training_len(),
            validation_points: shared.split().validation_len(),
            outcomes,
        })
    }

    fn run_one(
        &self,
        representation: Representation,
        source: Result<BandStack>,
        region: &Region,
        shared: &SharedSamples,
    ) -> Result<RepresentationRun> {
        let _span = info_span!("representation", %representation).entered();
        let result = source.map_err(|e| attribute(e, representation)).and_then(|source| {
            run_representation(
                self.classifier,
                representation,
                &source,
                region,
                shared,
                self.scale,
                &self.classes,
                &self.cancel,
            )
        });
        if let Err(e) = &result {
            warn!(%representation, error = %e, "representation pipeline failed");
        }
        result
    }

    fn export(&self, run: &RepresentationRun) -> Result<PathBuf> {
        let representation = run.representation;
        let name = self.names.name_for(representation);
        let path = self
            .exporter
            .export(&run.classified, &self.palette, name)
            .map_err(|e| Error::Export {
                representation,
                name: name.to_string(),
                message: format!("{e:#}"),
            })?;
        info!(%representation, path = %path.display(), "classified raster exported");
        Ok(path)
    }
}

/// Source loading errors without an owner belong to the representation that
/// needed the source.
fn attribute(e: Error, representation: Representation) -> Error {
    if e.representation().is_some() {
        e
    } else {
        Error::unavailable(Some(representation), e.to_string())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
