//! Stratified sampling of ground-control points from reclassified labels.
//!
//! Candidate locations are the centres of a `scale`-spaced lattice anchored
//! at the south-west corner of the region's bounding box. A candidate is
//! eligible when it lies inside the region and the label raster has a class
//! there. A first pass over the lattice counts eligible candidates per class,
//! each class receives a quota, and each stratum picks scan ordinals without
//! replacement from its own seeded generator. A second pass keeps only the
//! picked candidates, so memory grows with the sample rather than the region.
//! The result depends only on (labels, region, params).

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coords::LatLon;
use crate::error::{ConfigError, Error, Result};
use crate::raster::ClassRaster;
use crate::region::Region;
use crate::taxonomy::ClassCode;

/// How the requested total is divided between classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Allocation {
    /// Same quota for every class present in the region; the remainder goes
    /// one point at a time to the lowest class codes.
    #[default]
    Equal,
    /// Quota proportional to each class's eligible candidate count
    /// (largest-remainder rounding), raised to at least `min_per_class`.
    Proportional { min_per_class: usize },
    /// `points` is the quota of every class, so the total is up to
    /// `points × classes`.
    PerClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParams {
    /// Requested total, or the per-class quota under [`Allocation::PerClass`].
    pub points: usize,
    /// Lattice spacing in degrees.
    pub scale: f64,
    pub seed: u64,
    pub allocation: Allocation,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            points: 200,
            scale: 0.0001,
            seed: 42,
            allocation: Allocation::Equal,
        }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.points == 0 {
            return Err(ConfigError::ZeroSampleCount);
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::InvalidScale(self.scale));
        }
        Ok(())
    }
}

/// A ground-control point: location plus reclassified target label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub location: LatLon,
    pub label: ClassCode,
}

/// Per-class bookkeeping of one sampling run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stratum {
    pub class: ClassCode,
    pub eligible: usize,
    pub quota: usize,
    pub drawn: usize,
}

impl Stratum {
    pub fn is_underfilled(&self) -> bool {
        self.drawn < self.quota
    }
}

/// Output of [`stratified_sample`]: points ordered by class, then by lattice
/// scan order (south to north, west to east).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub points: Vec<SamplePoint>,
    pub strata: Vec<Stratum>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn count_for(&self, class: ClassCode) -> usize {
        self.points.iter().filter(|p| p.label == class).count()
    }
}

/// Draw a class-stratified point set from a raster of target codes.
pub fn stratified_sample(
    labels: &ClassRaster,
    region: &Region,
    params: &SamplingParams,
) -> Result<SampleSet> {
    params.validate()?;
    labels.validate()?;

    let bbox = region.bbox();
    if !bbox.intersects(&labels.grid.bbox()) {
        return Err(Error::unavailable(
            None,
            format!("label raster does not intersect region {:?}", region.name()),
        ));
    }

    let mut counts: BTreeMap<ClassCode, usize> = BTreeMap::new();
    scan_lattice(labels, region, params.scale, |class, _| {
        *counts.entry(class).or_default() += 1;
    })?;
    if counts.is_empty() {
        return Err(Error::unavailable(
            None,
            format!("no labelled pixels inside region {:?}", region.name()),
        ));
    }

    let eligible: Vec<(ClassCode, usize)> = counts.into_iter().collect();
    let quotas = allocate(params.points, &eligible, params.allocation);
    let mut picks: BTreeMap<ClassCode, Picks> = eligible
        .iter()
        .zip(&quotas)
        .map(|(&(class, n), &quota)| (class, Picks::new(n, quota, stratum_seed(params.seed, class))))
        .collect();

    scan_lattice(labels, region, params.scale, |class, p| {
        if let Some(picks) = picks.get_mut(&class) {
            picks.offer(p);
        }
    })?;

    let mut points = Vec::with_capacity(quotas.iter().sum());
    let mut report = Vec::with_capacity(eligible.len());
    for ((class, n), quota) in eligible.into_iter().zip(quotas) {
        let drawn = picks.remove(&class).map(|p| p.points).unwrap_or_default();
        let stratum = Stratum { class, eligible: n, quota, drawn: drawn.len() };
        if stratum.is_underfilled() {
            warn!(class, eligible = n, quota, "stratum under-filled");
        } else {
            debug!(class, eligible = n, quota, "stratum filled");
        }
        points.extend(drawn.into_iter().map(|location| SamplePoint { location, label: class }));
        report.push(stratum);
    }

    info!(
        region = region.name(),
        requested = params.points,
        drawn = points.len(),
        classes = report.len(),
        "stratified sample complete"
    );
    Ok(SampleSet { points, strata: report })
}

/// Visit every eligible lattice centre in scan order (south to north, west
/// to east).
fn scan_lattice(
    labels: &ClassRaster,
    region: &Region,
    scale: f64,
    mut visit: impl FnMut(ClassCode, LatLon),
) -> Result<()> {
    let bbox = region.bbox();
    let n_cols = (bbox.width() / scale).ceil() as usize;
    let n_rows = (bbox.height() / scale).ceil() as usize;

    for r in 0..n_rows {
        let lat = bbox.min_lat + (r as f64 + 0.5) * scale;
        for c in 0..n_cols {
            let p = LatLon::new(lat, bbox.min_lon + (c as f64 + 0.5) * scale);
            if !region.contains(p) {
                continue;
            }
            let Some(code) = labels.value_at(p) else {
                continue;
            };
            let class = ClassCode::try_from(code).map_err(|_| ConfigError::InvalidParameter {
                name: "labels",
                value: code.to_string(),
                reason: "not a target class code; reclassify before sampling".into(),
            })?;
            visit(class, p);
        }
    }
    Ok(())
}

/// Scan ordinals chosen for one stratum and the candidates kept so far.
struct Picks {
    /// Ascending ordinals within the stratum's scan order.
    chosen: Vec<usize>,
    next: usize,
    seen: usize,
    points: Vec<LatLon>,
}

impl Picks {
    /// Choose up to `quota` of `eligible` ordinals without replacement.
    fn new(eligible: usize, quota: usize, seed: u64) -> Self {
        let chosen = if eligible <= quota {
            (0..eligible).collect()
        } else {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut picked = rand::seq::index::sample(&mut rng, eligible, quota).into_vec();
            picked.sort_unstable();
            picked
        };
        Self { points: Vec::with_capacity(chosen.len()), chosen, next: 0, seen: 0 }
    }

    fn offer(&mut self, p: LatLon) {
        if self.chosen.get(self.next) == Some(&self.seen) {
            self.points.push(p);
            self.next += 1;
        }
        self.seen += 1;
    }
}

/// Split `total` between classes. `eligible` is sorted by class code.
fn allocate(total: usize, eligible: &[(ClassCode, usize)], allocation: Allocation) -> Vec<usize> {
    let k = eligible.len();
    match allocation {
        Allocation::PerClass => vec![total; k],
        Allocation::Equal => {
            let base = total / k;
            let rem = total % k;
            (0..k).map(|i| base + usize::from(i < rem)).collect()
        }
        Allocation::Proportional { min_per_class } => {
            let sum: usize = eligible.iter().map(|&(_, n)| n).sum();
            let exact: Vec<f64> = eligible
                .iter()
                .map(|&(_, n)| total as f64 * n as f64 / sum as f64)
                .collect();
            let mut quotas: Vec<usize> = exact.iter().map(|q| q.floor() as usize).collect();
            let assigned: usize = quotas.iter().sum();

            // Largest remainder first; ties go to the lower class code.
            let mut order: Vec<usize> = (0..k).collect();
            order.sort_by(|&a, &b| {
                let ra = exact[a] - exact[a].floor();
                let rb = exact[b] - exact[b].floor();
                rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
            });
            for &i in order.iter().take(total.saturating_sub(assigned)) {
                quotas[i] += 1;
            }

            quotas.iter().map(|&q| q.max(min_per_class)).collect()
        }
    }
}

fn stratum_seed(seed: u64, class: ClassCode) -> u64 {
    seed ^ (u64::from(class) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
