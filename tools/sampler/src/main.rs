/// Ground-control point tool: reclassifies the reference land cover of each
/// configured region, draws the stratified sample and assigns the
/// train/validation split.
///
/// Per region it writes `points.json` (one record per point with its split),
/// `shared.json` (reusable by `compare --samples`) and `manifest.json`.
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use landcover_core::coords::Bbox;
use landcover_core::export::write_atomic;
use landcover_core::sampling::{SamplingParams, Stratum};
use landcover_core::split::{SplitParams, Subset};
use landcover_core::{RunConfig, SharedSamples};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sampler",
    about = "Draw stratified ground-control points with a train/validation split"
)]
struct Args {
    /// Run configs, one per region
    #[arg(long = "config", required = true, num_args = 1..)]
    configs: Vec<PathBuf>,

    /// Output root directory (created if absent)
    #[arg(short, long, default_value = "data/samples")]
    output: PathBuf,

    /// Process only the region with this name
    #[arg(long)]
    region: Option<String>,

    /// Sampling seed for every region (overrides sampling.seed)
    #[arg(long)]
    seed: Option<u64>,
}

// ── Output schema ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, PartialEq)]
struct PointRecord {
    lat: f64,
    lon: f64,
    label: u8,
    /// Seeded draw in [0, 1) compared against the split ratio.
    random: f64,
    subset: Subset,
}

#[derive(Debug, Serialize)]
struct Manifest {
    region: String,
    bbox: Bbox,
    sampling: SamplingParams,
    split: SplitParams,
    requested: usize,
    drawn: usize,
    training: usize,
    validation: usize,
    strata: Vec<Stratum>,
}

fn point_records(shared: &SharedSamples) -> Vec<PointRecord> {
    shared
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| PointRecord {
            lat: p.location.lat,
            lon: p.location.lon,
            label: p.label,
            random: shared.split().value(i),
            subset: shared.split().subset(i),
        })
        .collect()
}

fn manifest(config: &RunConfig, shared: &SharedSamples) -> Manifest {
    Manifest {
        region: config.region.name().to_string(),
        bbox: config.region.bbox(),
        sampling: config.sampling,
        split: config.split,
        requested: config.sampling.points,
        drawn: shared.len(),
        training: shared.split().training_len(),
        validation: shared.split().validation_len(),
        strata: shared.samples().strata.clone(),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes()).with_context(|| format!("Write failed: {}", path.display()))
}

/// `<output>/<name>`, provided the region name is a single plain path
/// component.
fn region_dir(output: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(c)), None) if c == name => Ok(output.join(c)),
        _ => bail!("region name {name:?} cannot be used as a directory name"),
    }
}

/// Sample one region into `<output>/<region name>/`.
fn process(config: &RunConfig, output: &Path) -> Result<PathBuf> {
    let reference = config
        .inputs
        .reference
        .load()
        .context("Reference land cover unavailable")?;
    let dir = region_dir(output, config.region.name())?;
    let shared = SharedSamples::prepare(
        &reference,
        &config.taxonomy,
        &config.region,
        &config.sampling,
        &config.split,
    )?;

    fs::create_dir_all(&dir)?;
    write_json(&dir.join("points.json"), &point_records(&shared))?;
    write_json(&dir.join("shared.json"), &shared)?;
    let manifest = manifest(config, &shared);
    for s in manifest.strata.iter().filter(|s| s.is_underfilled()) {
        warn!(region = %manifest.region, class = s.class, eligible = s.eligible, quota = s.quota, "under-filled class");
    }
    write_json(&dir.join("manifest.json"), &manifest)?;
    info!(
        region = %manifest.region,
        drawn = manifest.drawn,
        training = manifest.training,
        validation = manifest.validation,
        "region sampled"
    );
    Ok(dir)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sampler=info,landcover_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    for path in &args.configs {
        let mut config = RunConfig::load(path).with_context(|| format!("Cannot load {}", path.display()))?;
        if let Some(ref filter) = args.region {
            if config.region.name() != filter {
                continue;
            }
        }
        if let Some(seed) = args.seed {
            config.sampling.seed = seed;
        }
        process(&config, &args.output).with_context(|| format!("Region {} failed", config.region.name()))?;
    }

    info!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use landcover_core::raster::GridSpec;
    use landcover_core::ClassRaster;

    /// 10×10 raster over the unit square: west half built-up, east half water.
    fn write_fixture(dir: &Path) -> RunConfig {
        let grid = GridSpec::new(10, 10, Bbox { min_lat: 0.0, max_lat: 1.0, min_lon: 0.0, max_lon: 1.0 });
        let data = (0..100).map(|i| if i % 10 < 5 { 50 } else { 80 }).collect();
        let reference = ClassRaster::new(grid, data, None).unwrap();
        fs::write(dir.join("ref.json"), serde_json::to_string(&reference).unwrap()).unwrap();
        let config = r#"{
            "region": { "name": "unit", "coordinates": [[0, 0], [1, 0], [1, 1], [0, 1]] },
            "sampling": { "points": 20, "scale": 0.1 },
            "inputs": {
                "reference": { "format": "json", "path": "ref.json" },
                "imagery": { "format": "json", "path": "img.json" },
                "terrain": { "format": "json", "path": "dem.json" },
                "embedding": { "format": "json", "path": "emb.json" }
            }
        }"#;
        let path = dir.join("run.json");
        fs::write(&path, config).unwrap();
        RunConfig::load(&path).unwrap()
    }

    #[test]
    fn region_outputs_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_fixture(tmp.path());
        let dir = process(&config, &tmp.path().join("samples")).unwrap();
        assert_eq!(dir, tmp.path().join("samples").join("unit"));
        for name in ["points.json", "shared.json", "manifest.json"] {
            assert!(dir.join(name).exists(), "{name}");
        }

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["drawn"], 20);
        assert_eq!(manifest["strata"].as_array().unwrap().len(), 2);

        let shared: SharedSamples =
            serde_json::from_str(&fs::read_to_string(dir.join("shared.json")).unwrap()).unwrap();
        assert_eq!(shared.len(), 20);
    }

    #[test]
    fn region_names_stay_inside_output() {
        let out = Path::new("samples");
        assert_eq!(region_dir(out, "fenland").unwrap(), out.join("fenland"));
        for name in ["", "..", ".", "a/b", "/etc", "../escape", "fen/"] {
            assert!(region_dir(out, name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn unsafe_region_name_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = write_fixture(tmp.path());
        config.region = landcover_core::Region::rectangle("../outside", config.region.bbox()).unwrap();
        let output = tmp.path().join("samples");
        assert!(process(&config, &output).is_err());
        assert!(!output.exists());
        assert!(!tmp.path().join("outside").exists());
    }

    #[test]
    fn records_carry_the_split() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_fixture(tmp.path());
        let reference = config.inputs.reference.load().unwrap();
        let shared =
            SharedSamples::prepare(&reference, &config.taxonomy, &config.region, &config.sampling, &config.split)
                .unwrap();
        let records = point_records(&shared);
        assert_eq!(records.len(), shared.len());
        let training = records.iter().filter(|r| r.subset == Subset::Training).count();
        assert_eq!(training, shared.split().training_len());
        assert!(records.iter().all(|r| (r.random < 0.7) == (r.subset == Subset::Training)));
        assert!(records.iter().all(|r| r.label == 0 || r.label == 2));
    }
}
