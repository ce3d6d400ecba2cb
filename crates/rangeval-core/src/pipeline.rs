//! Evaluation orchestrator: runs all stages in order over one partition.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::aggregate::aggregate;
use crate::attribution::{attribute, SkippedPair};
use crate::classify::{classify, presence_mask};
use crate::config::EvaluationConfig;
use crate::error::{EvalError, Result, Stage};
use crate::geometry::{GeoAdapter, GeometryAdapter};
use crate::occurrence::{Occurrence, OccurrenceFilter, OccurrencePoint};
use crate::params::{EvaluationParameters, ParameterTable, PartitionKind};
use crate::target::select_targets;
use crate::units::{FeatureUnit, Knowledge, UnitTable};

// ── Public structs ────────────────────────────────────────────────────────────

/// Counts describing one finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub units: usize,
    pub occurrences_in: usize,
    pub occurrences_used: usize,
    pub attributions: usize,
    pub units_with_evidence: usize,
    pub unknown: usize,
    pub inferred_present: usize,
    pub confirmed: usize,
    pub targeted: usize,
    pub skipped_pairs: usize,
    /// Units whose results may be affected by a geometry failure.
    pub degraded_units: BTreeSet<String>,
    /// No unit in the partition received any evidence.
    pub no_evidence: bool,
}

/// Full output of one evaluation run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub partition: PartitionKind,
    pub parameters: EvaluationParameters,
    pub table: UnitTable,
    pub skipped: Vec<SkippedPair>,
    pub summary: RunSummary,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Runs evaluations with a fixed configuration and geometry backend.
pub struct Evaluator<A: GeometryAdapter = GeoAdapter> {
    config: EvaluationConfig,
    adapter: A,
}

impl Evaluator<GeoAdapter> {
    /// Evaluator backed by `geo`, measuring areas in the configured plane.
    pub fn new(config: EvaluationConfig) -> Result<Self> {
        config.validate()?;
        let adapter = GeoAdapter::new(config.equal_area);
        Ok(Self { config, adapter })
    }
}

impl<A: GeometryAdapter> Evaluator<A> {
    pub fn with_adapter(config: EvaluationConfig, adapter: A) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, adapter })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Buffer point + radius inputs into occurrence circles in the configured
    /// plane. A point that cannot be projected aborts setup.
    pub fn buffer_points(&self, points: &[OccurrencePoint]) -> Result<Vec<Occurrence>> {
        let projector = self.config.equal_area.projector();
        points
            .iter()
            .map(|p| {
                p.buffer(&projector, self.config.circle_segments)
                    .map_err(|source| EvalError::Geometry { stage: Stage::Setup, id: p.id.clone(), source })
            })
            .collect()
    }

    /// Look up parameters for (evaluation, species, partition), then run.
    /// A missing parameter row fails before any stage executes.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_species(
        &self,
        parameters: &ParameterTable,
        evaluation_id: &str,
        species_id: &str,
        partition: PartitionKind,
        units: Vec<FeatureUnit>,
        occurrences: &[Occurrence],
        filter: &OccurrenceFilter,
    ) -> Result<Evaluation> {
        let params = parameters.get(evaluation_id, species_id, partition)?;
        self.evaluate(partition, units, occurrences, filter, params)
    }

    /// Run the full pipeline.
    ///
    /// Stage order:
    ///   1. Evidence attribution
    ///   2. Unit aggregation
    ///   3. Knowledge classification
    ///   4. Target selection
    ///
    /// Each stage appends its own columns; none revisits an earlier stage.
    pub fn evaluate(
        &self,
        partition: PartitionKind,
        units: Vec<FeatureUnit>,
        occurrences: &[Occurrence],
        filter: &OccurrenceFilter,
        params: EvaluationParameters,
    ) -> Result<Evaluation> {
        let span = info_span!("evaluate", partition = %partition);
        let _guard = span.enter();

        params.validate()?;
        let mut table = UnitTable::new(units)?;
        let mut degraded = BTreeSet::new();
        degraded.extend(self.project_units(&mut table));

        let working = filter.apply(occurrences);
        info!(
            units = table.len(),
            occurrences = occurrences.len(),
            used = working.len(),
            min_overlap_fraction = params.min_overlap_fraction,
            min_evidence_count = params.min_evidence_count,
            "starting evaluation"
        );

        // ── 1. Evidence attribution ─────────────────────────────────────────
        let attributed = attribute(
            &self.adapter,
            &table,
            &working,
            params.min_overlap_fraction,
            self.config.attribution_policy,
            self.config.bbox_prefilter,
        );
        degraded.extend(attributed.degraded_units());

        // ── 2. Unit aggregation ─────────────────────────────────────────────
        let units_with_evidence = aggregate(
            &mut table,
            &attributed.attributions,
            self.config.reference_date,
            self.config.age_unit,
        )?;

        // ── 3. Knowledge classification ─────────────────────────────────────
        let (presence, mask_failures) = presence_mask(&self.adapter, &table);
        degraded.extend(mask_failures);
        degraded.extend(classify(&self.adapter, &mut table, &presence, params.min_evidence_count)?);

        // ── 4. Target selection ─────────────────────────────────────────────
        degraded.extend(select_targets(&self.adapter, &mut table, &presence, params.min_evidence_count)?);

        let summary = summarize(
            &table,
            occurrences.len(),
            working.len(),
            attributed.attributions.len(),
            units_with_evidence,
            attributed.skipped.len(),
            degraded,
        );
        if summary.no_evidence {
            warn!(partition = %partition, "no unit received any evidence");
        }
        info!(
            confirmed = summary.confirmed,
            inferred_present = summary.inferred_present,
            targeted = summary.targeted,
            degraded = summary.degraded_units.len(),
            "evaluation complete"
        );

        Ok(Evaluation {
            partition,
            parameters: params,
            table,
            skipped: attributed.skipped,
            summary,
        })
    }

    /// Fill `geometry_proj` where absent. Returns units that failed to project.
    fn project_units(&self, table: &mut UnitTable) -> Vec<String> {
        let mut failed = Vec::new();
        for unit in table.units_mut() {
            if unit.geometry_proj.is_some() {
                continue;
            }
            match self.adapter.to_equal_area(&unit.geometry_geo) {
                Ok(g) => unit.geometry_proj = Some(g),
                Err(e) => {
                    warn!(unit = %unit.id, error = %e, "could not project unit");
                    failed.push(unit.id.clone());
                }
            }
        }
        failed
    }
}

/// Run one evaluation with the `geo` backend.
pub fn evaluate(
    partition: PartitionKind,
    units: Vec<FeatureUnit>,
    occurrences: &[Occurrence],
    filter: &OccurrenceFilter,
    params: EvaluationParameters,
    config: &EvaluationConfig,
) -> Result<Evaluation> {
    Evaluator::new(config.clone())?.evaluate(partition, units, occurrences, filter, params)
}

#[allow(clippy::too_many_arguments)]
fn summarize(
    table: &UnitTable,
    occurrences_in: usize,
    occurrences_used: usize,
    attributions: usize,
    units_with_evidence: usize,
    skipped_pairs: usize,
    degraded_units: BTreeSet<String>,
) -> RunSummary {
    let knowledge = table.knowledge().unwrap_or_default();
    let count = |level: Knowledge| knowledge.iter().filter(|k| **k == level).count();
    let targeted = table
        .target()
        .map_or(0, |t| t.iter().filter(|t| **t == Some(true)).count());

    RunSummary {
        units: table.len(),
        occurrences_in,
        occurrences_used,
        attributions,
        units_with_evidence,
        unknown: count(Knowledge::Unknown),
        inferred_present: count(Knowledge::InferredPresent),
        confirmed: count(Knowledge::Confirmed),
        targeted,
        skipped_pairs,
        degraded_units,
        no_evidence: units_with_evidence == 0,
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
