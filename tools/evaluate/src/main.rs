/// Range evaluation runner: loads a partition, occurrences and parameter
/// table from JSON, runs one evaluation and writes the attribute table.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rangeval_core::export::write_json;
use rangeval_core::occurrence::parse_list;
use rangeval_core::{
    apply_range_records, EvaluationConfig, Evaluator, FeatureUnit, Occurrence, OccurrenceFilter,
    OccurrencePoint, ParameterTable, PartitionKind, RangeRecord, UnitTable,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "evaluate", about = "Evaluate a range map against occurrence evidence")]
struct Args {
    /// Feature units JSON (array of units with `geometry_geo`).
    #[arg(long)]
    units: PathBuf,

    /// Partition the units belong to: hucs, blocks or counties.
    #[arg(short, long, default_value = "hucs")]
    partition: String,

    /// Species range table JSON; presence code 1 marks prior presence.
    #[arg(long)]
    range: Option<PathBuf>,

    /// Occurrences JSON with precomputed circles.
    #[arg(long, conflicts_with = "points")]
    occurrences: Option<PathBuf>,

    /// Occurrences JSON as point + radius; circles are built here.
    #[arg(long)]
    points: Option<PathBuf>,

    /// Parameter table JSON.
    #[arg(long, default_value = "data/evaluations.json")]
    parameters: PathBuf,

    #[arg(long)]
    evaluation_id: String,

    #[arg(long)]
    species_id: String,

    /// Years to include, e.g. "2002,2004,2019" (omit for all).
    #[arg(long, default_value = "")]
    years: String,

    /// Months to include, e.g. "11,12,1,2" (omit for all).
    #[arg(long, default_value = "")]
    months: String,

    /// Evaluation config JSON (absent fields take defaults).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the reference date ages are measured from (YYYY-MM-DD).
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Attribute table output.
    #[arg(short, long, default_value = "data/outputs/attributes.json")]
    output: PathBuf,

    /// Write only units with evidence or inferred presence.
    #[arg(long)]
    evaluated_only: bool,

    /// Optional feature output (attributes + geometry).
    #[arg(long)]
    features: Option<PathBuf>,

    /// Optional run summary output.
    #[arg(long)]
    summary: Option<PathBuf>,
}

// ── IO helpers ───────────────────────────────────────────────────────────────

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn load_occurrences(args: &Args, evaluator: &Evaluator) -> Result<Vec<Occurrence>> {
    match (&args.occurrences, &args.points) {
        (Some(path), None) => read_json(path),
        (None, Some(path)) => {
            let points: Vec<OccurrencePoint> = read_json(path)?;
            Ok(evaluator.buffer_points(&points)?)
        }
        _ => bail!("pass exactly one of --occurrences or --points"),
    }
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EvaluationConfig::from_json_file(path)?,
        None => EvaluationConfig::default(),
    };
    if let Some(date) = args.reference_date {
        config.reference_date = date;
    }

    let partition: PartitionKind = args.partition.parse()?;
    let filter = OccurrenceFilter::new(
        parse_list::<i32>(&args.years).context("parsing --years")?,
        parse_list::<u32>(&args.months).context("parsing --months")?,
    );
    let parameters: ParameterTable = read_json(&args.parameters)?;

    // Parameters are resolved first so a missing row fails before any I/O-heavy load.
    let params = parameters.get(&args.evaluation_id, &args.species_id, partition)?;

    let mut units: Vec<FeatureUnit> = read_json(&args.units)?;
    if let Some(path) = &args.range {
        let records: Vec<RangeRecord> = read_json(path)?;
        let mut table = UnitTable::new(units)?;
        let join = apply_range_records(&mut table, &records);
        info!(flagged = join.flagged, unmatched = join.unmatched.len(), "range records joined");
        units = table.units().to_vec();
    }
    let evaluator = Evaluator::new(config)?;
    let occurrences = load_occurrences(&args, &evaluator)?;

    let evaluation = match evaluator.evaluate(partition, units, &occurrences, &filter, params) {
        Ok(e) => e,
        Err(err) => {
            let stage = err.stage();
            return Err(anyhow::Error::new(err).context(format!("evaluation failed during {stage}")));
        }
    };

    let rows = if args.evaluated_only {
        evaluation.evaluated_records()?
    } else {
        evaluation.records()?
    };
    write_json(create(&args.output)?, &rows).with_context(|| format!("writing {}", args.output.display()))?;
    info!(rows = rows.len(), path = %args.output.display(), "wrote attribute table");

    if let Some(path) = &args.features {
        let features = evaluation.features()?;
        write_json(create(path)?, &features).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.summary {
        write_json(create(path)?, &evaluation.summary).with_context(|| format!("writing {}", path.display()))?;
    }

    let s = &evaluation.summary;
    if !s.degraded_units.is_empty() {
        eprintln!(
            "Completed with {} skipped geometry pair(s); affected units: {}",
            s.skipped_pairs,
            s.degraded_units.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    if s.no_evidence {
        eprintln!("Warning: no {} unit received any evidence.", evaluation.partition);
    }
    eprintln!(
        "{} units: {} confirmed, {} inferred present, {} unknown; {} targeted.",
        s.units, s.confirmed, s.inferred_present, s.unknown, s.targeted
    );

    Ok(())
}
