/// Synthetic input generator: writes a grid partition, seeded occurrence
/// points, a range table and a parameter table as JSON for the evaluate tool.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rangeval_core::geometry::rect;
use rangeval_core::params::{OverlapThreshold, ParameterRow};
use rangeval_core::{FeatureUnit, OccurrencePoint, ParameterTable, PartitionKind, RangeRecord};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "synthesize", about = "Write synthetic range-evaluation inputs")]
struct Args {
    /// Output directory (created if absent).
    #[arg(short, long, default_value = "data/synthetic")]
    output: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Grid columns.
    #[arg(long, default_value = "8")]
    cols: usize,

    /// Grid rows.
    #[arg(long, default_value = "5")]
    rows: usize,

    /// Cell size, degrees.
    #[arg(long, default_value = "0.1")]
    cell_deg: f64,

    /// South-west corner longitude.
    #[arg(long, default_value = "-80.5", allow_hyphen_values = true)]
    min_lon: f64,

    /// South-west corner latitude.
    #[arg(long, default_value = "35.0")]
    min_lat: f64,

    #[arg(long, default_value = "200")]
    occurrences: usize,

    /// Upper bound for location uncertainty, metres.
    #[arg(long, default_value = "2000")]
    max_radius_m: f64,

    /// Share of cells flagged present in the range table.
    #[arg(long, default_value = "0.3")]
    presence_share: f64,

    #[arg(long, default_value = "2000")]
    first_year: i32,

    #[arg(long, default_value = "2020")]
    last_year: i32,
}

fn write<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let text = serde_json::to_string_pretty(value)?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    fs::create_dir_all(&args.output).with_context(|| format!("creating {}", args.output.display()))?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    // ── Grid partition + range table ─────────────────────────────────────────
    let mut units = Vec::with_capacity(args.rows * args.cols);
    let mut range = Vec::with_capacity(args.rows * args.cols);
    for r in 0..args.rows {
        for c in 0..args.cols {
            let x0 = args.min_lon + c as f64 * args.cell_deg;
            let y0 = args.min_lat + r as f64 * args.cell_deg;
            let id = format!("{:06}{:06}", r, c);
            units.push(FeatureUnit::new(id.clone(), rect(x0, y0, x0 + args.cell_deg, y0 + args.cell_deg)));
            let present = rng.gen_bool(args.presence_share.clamp(0.0, 1.0));
            range.push(RangeRecord {
                unit_id: id,
                presence_code: if present { 1 } else { 4 },
                origin_code: Some(1),
                reproduction_code: None,
                season_code: None,
            });
        }
    }

    // ── Occurrence points ────────────────────────────────────────────────────
    let width = args.cols as f64 * args.cell_deg;
    let height = args.rows as f64 * args.cell_deg;
    let start = NaiveDate::from_ymd_opt(args.first_year, 1, 1).context("invalid --first-year")?;
    let end = NaiveDate::from_ymd_opt(args.last_year, 12, 31).context("invalid --last-year")?;
    let span_days = (end - start).num_days().max(1);

    let points: Vec<OccurrencePoint> = (0..args.occurrences)
        .map(|i| OccurrencePoint {
            id: format!("occ{i:05}"),
            timestamp: start + Duration::days(rng.gen_range(0..=span_days)),
            lon: args.min_lon + rng.gen::<f64>() * width,
            lat: args.min_lat + rng.gen::<f64>() * height,
            radius_m: rng.gen_range(10.0..=args.max_radius_m.max(10.0)),
        })
        .collect();

    // ── Parameter table ──────────────────────────────────────────────────────
    let params = ParameterTable::new(
        [PartitionKind::Hucs, PartitionKind::Blocks, PartitionKind::Counties]
            .into_iter()
            .map(|partition| ParameterRow {
                evaluation_id: "synthetic".into(),
                species_id: "bsynth".into(),
                partition,
                threshold: OverlapThreshold::ErrorTolerance { error_tolerance: 20.0 },
                min_count: 2,
            })
            .collect(),
    );

    write(&args.output, "units.json", &units)?;
    write(&args.output, "range.json", &range)?;
    write(&args.output, "points.json", &points)?;
    write(&args.output, "evaluations.json", &params)?;

    eprintln!(
        "Wrote {} units and {} occurrences to {}.",
        units.len(),
        points.len(),
        args.output.display()
    );
    Ok(())
}
