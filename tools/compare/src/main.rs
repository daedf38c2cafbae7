//! Dual-representation land-cover comparison.
//!
//! Loads a run config, draws (or reuses) the shared sample, classifies with
//! the spectral composite and the embedding, and writes one palette PNG and
//! one accuracy report per representation plus `comparison.json`.

mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use landcover_core::composite::build_spectral_stack;
use landcover_core::io::read_json;
use landcover_core::{
    AccuracyReport, CancelToken, PipelineRunner, RunConfig, SharedSamples, Verdict,
};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::render::PngExporter;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "compare",
    about = "Compare spectral-composite and embedding land-cover classification on one shared sample"
)]
struct Args {
    /// Path to the run config
    #[arg(long, default_value = "data/run.json")]
    config: PathBuf,

    /// Reuse a shared sample written by the sampler tool instead of drawing one
    #[arg(long, conflicts_with_all = ["seed", "points", "split_seed"])]
    samples: Option<PathBuf>,

    /// Output directory (overrides export.dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Sampling seed (overrides sampling.seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Requested point count (overrides sampling.points)
    #[arg(long)]
    points: Option<usize>,

    /// Split seed (overrides split.seed)
    #[arg(long)]
    split_seed: Option<u64>,

    /// Abort both representations after this many seconds; nothing is exported
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn apply_overrides(config: &mut RunConfig, args: &Args) {
    if let Some(dir) = &args.output {
        config.export.dir = dir.clone();
    }
    if let Some(seed) = args.seed {
        config.sampling.seed = seed;
    }
    if let Some(points) = args.points {
        config.sampling.points = points;
    }
    if let Some(seed) = args.split_seed {
        config.split.seed = seed;
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

fn print_report(report: &AccuracyReport) {
    println!("== {} ==", report.representation);
    print!("{}", report.matrix);
    println!("overall accuracy: {:.4}", report.overall_accuracy);
    for (pa, ca) in report.producers_accuracy.iter().zip(&report.consumers_accuracy) {
        println!("  class {}: producer's {:.4}  consumer's {:.4}", pa.class, pa.value, ca.value);
    }
    if report.omitted_training + report.omitted_validation > 0 {
        println!(
            "  omitted points: {} training, {} validation",
            report.omitted_training, report.omitted_validation
        );
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    landcover_core::export::write_atomic(path, json.as_bytes())
        .with_context(|| format!("Write failed: {}", path.display()))
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compare=info,landcover_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = RunConfig::load(&args.config)
        .with_context(|| format!("Cannot load {}", args.config.display()))?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration after overrides")?;

    // ── 1. Shared sample ────────────────────────────────────────────────────
    let shared: SharedSamples = match &args.samples {
        Some(path) => {
            let shared: SharedSamples =
                read_json(path).with_context(|| format!("Cannot read {}", path.display()))?;
            SharedSamples::from_parts(shared.samples().clone(), shared.split().clone())?
        }
        None => {
            let reference = config.inputs.reference.load().context("Reference land cover unavailable")?;
            SharedSamples::prepare(&reference, &config.taxonomy, &config.region, &config.sampling, &config.split)?
        }
    };
    info!(
        points = shared.len(),
        training = shared.split().training_len(),
        validation = shared.split().validation_len(),
        "shared sample ready"
    );

    // ── 2. Feature sources ──────────────────────────────────────────────────
    // Load failures stay attached to their representation.
    let spectral = config.inputs.imagery.load().and_then(|imagery| {
        let terrain = config.inputs.terrain.load()?;
        build_spectral_stack(&imagery, &terrain, &config.spectral_indices)
    });
    let embedding = config.inputs.embedding.load();

    // ── 3. Both representations ─────────────────────────────────────────────
    let cancel = match args.timeout_secs {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    let exporter = PngExporter::new(&config.export.dir);
    info!(classifier = %config.classifier, "classifier selected");
    let runner = PipelineRunner::new(&config.classifier, &exporter, &config.taxonomy, config.sampling.scale)
        .with_export_names(config.export.names.clone())
        .with_cancel(cancel);
    let comparison = runner.run(&config.region, &shared, spectral, embedding)?;

    // ── 4. Reports ──────────────────────────────────────────────────────────
    fs::create_dir_all(&config.export.dir)?;
    for outcome in &comparison.outcomes {
        let rep = outcome.representation;
        match &outcome.result {
            Ok(run) => {
                print_report(&run.report);
                let name = config.export.names.name_for(rep);
                write_json(&config.export.dir.join(format!("{name}_accuracy.json")), &run.report)?;
            }
            Err(e) => error!(representation = %rep, error = %e, "no result"),
        }
        if let Some(Err(e)) = &outcome.export {
            warn!(representation = %rep, error = %e, "export failed");
        }
    }

    let summary = comparison.summary();
    write_json(&config.export.dir.join("comparison.json"), &summary)?;
    match summary.verdict {
        Verdict::Preferred { representation, margin } => {
            println!("{representation} is more accurate by {margin:.4}")
        }
        Verdict::Tie => println!("both representations are equally accurate"),
        Verdict::Incomplete => println!("comparison incomplete"),
    }

    if comparison.outcomes.iter().all(|o| o.result.is_err()) {
        bail!("both representations failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "region": { "name": "r", "coordinates": [[0, 0], [1, 0], [1, 1]] },
        "inputs": {
            "reference": { "format": "json", "path": "ref.json" },
            "imagery": { "format": "json", "path": "img.json" },
            "terrain": { "format": "json", "path": "dem.json" },
            "embedding": { "format": "json", "path": "emb.json" }
        }
    }"#;

    #[test]
    fn flags_override_config() {
        let mut config = RunConfig::from_json_str(CONFIG).unwrap();
        let args = Args::try_parse_from([
            "compare", "--seed", "7", "--points", "50", "--split-seed", "3", "-o", "out",
        ])
        .unwrap();
        apply_overrides(&mut config, &args);
        assert_eq!(config.sampling.seed, 7);
        assert_eq!(config.sampling.points, 50);
        assert_eq!(config.split.seed, 3);
        assert_eq!(config.export.dir, PathBuf::from("out"));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let mut config = RunConfig::from_json_str(CONFIG).unwrap();
        let before = config.clone();
        apply_overrides(&mut config, &Args::try_parse_from(["compare"]).unwrap());
        assert_eq!(config, before);
    }

    #[test]
    fn sample_overrides_conflict_with_reused_samples() {
        for flag in ["--seed", "--points", "--split-seed"] {
            let parsed = Args::try_parse_from(["compare", "--samples", "shared.json", flag, "5"]);
            assert!(parsed.is_err(), "{flag}");
        }
        let args = Args::try_parse_from(["compare", "--samples", "shared.json", "--timeout-secs", "5"]).unwrap();
        assert_eq!(args.samples, Some(PathBuf::from("shared.json")));
    }

    #[test]
    fn zero_points_fails_validation_after_override() {
        let mut config = RunConfig::from_json_str(CONFIG).unwrap();
        apply_overrides(&mut config, &Args::try_parse_from(["compare", "--points", "0"]).unwrap());
        assert!(config.validate().is_err());
    }
}
