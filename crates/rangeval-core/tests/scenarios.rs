//! End-to-end evaluation scenarios on planar geometry, where area ratios are
//! exact.

use chrono::NaiveDate;
use geo::MultiPolygon;
use rangeval_core::geometry::{disc, rect};
use rangeval_core::{
    evaluate, AttributionPolicy, EqualArea, Evaluation, EvaluationConfig, EvaluationParameters, FeatureUnit,
    GeoAdapter, GeometryAdapter, Knowledge, Occurrence, OccurrenceFilter, OccurrencePoint, PartitionKind,
};

fn config() -> EvaluationConfig {
    EvaluationConfig {
        equal_area: EqualArea::Planar,
        ..EvaluationConfig::default()
    }
    .with_reference_date(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap())
}

fn occurrence(id: &str, year: i32, circle: MultiPolygon<f64>) -> Occurrence {
    Occurrence {
        id: id.into(),
        timestamp: NaiveDate::from_ymd_opt(year, 5, 15).unwrap(),
        circle_proj: circle.clone(),
        circle_geo: circle,
    }
}

fn run(units: Vec<FeatureUnit>, occs: &[Occurrence], tau: f64, kappa: u32) -> Evaluation {
    let params = EvaluationParameters::new(tau, kappa).unwrap();
    evaluate(PartitionKind::Hucs, units, occs, &OccurrenceFilter::default(), params, &config()).unwrap()
}

#[test]
fn scenario_a_circle_containing_unit_confirms_it() {
    let units = vec![FeatureUnit::new("u", rect(0.0, 0.0, 10.0, 10.0))];
    // Disc of radius 7.5 around the centre covers the whole square and puts
    // about 57% of its own area inside it.
    let occs = [occurrence("o1", 2015, disc(5.0, 5.0, 7.5, 64))];
    let eval = run(units, &occs, 50.0, 1);

    assert_eq!(eval.table.evidence_count().unwrap(), &[1]);
    assert_eq!(eval.table.years_since_record().unwrap(), &[Some(5)]);
    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::Confirmed]);
    assert_eq!(eval.table.target().unwrap(), &[None]);
    assert!(!eval.summary.no_evidence);
}

#[test]
fn scenario_b_small_overlap_is_not_attributed() {
    let units = vec![FeatureUnit::new("u", rect(0.0, 0.0, 10.0, 10.0))];
    // 10×10 square "circle" with a 1×10 strip (10%) inside the unit.
    let occs = [occurrence("o1", 2015, rect(9.0, 0.0, 19.0, 10.0))];
    let eval = run(units, &occs, 50.0, 1);

    assert_eq!(eval.table.evidence_count().unwrap(), &[0]);
    assert_eq!(eval.table.years_since_record().unwrap(), &[None]);
    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::Unknown]);
    assert_eq!(eval.table.target().unwrap(), &[Some(true)]);
    assert!(eval.summary.no_evidence);
}

#[test]
fn scenario_c_edge_neighbour_of_confirmed_unit_is_targeted_but_unknown() {
    let units = vec![
        FeatureUnit::new("A", rect(0.0, 0.0, 10.0, 10.0)),
        FeatureUnit::new("B", rect(10.0, 0.0, 20.0, 10.0)),
    ];
    let occs = [occurrence("o1", 2019, rect(2.0, 2.0, 8.0, 8.0))];
    // κ = 1 so A is confirmed; B has no evidence.
    let eval = run(units, &occs, 50.0, 1);

    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::Confirmed, Knowledge::Unknown]);
    assert_eq!(eval.table.target().unwrap(), &[None, Some(true)]);
}

#[test]
fn touches_and_overlaps_are_distinguished() {
    let geo = GeoAdapter::new(EqualArea::Planar);
    let a = rect(0.0, 0.0, 10.0, 10.0);
    let b = rect(10.0, 0.0, 20.0, 10.0);

    // Shared edge only: adjacent (targeting rule), not overlapping (classification rule).
    assert!(geo.boundary_adjacent(&b, &a).unwrap());
    assert!(!geo.strictly_overlaps(&b, &a).unwrap());

    // The same edge neighbour with prior presence on A: B stays unknown.
    let units = vec![
        FeatureUnit::new("A", a).with_prior_presence(true),
        FeatureUnit::new("B", b),
    ];
    let eval = run(units, &[], 50.0, 1);
    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::InferredPresent, Knowledge::Unknown]);
}

#[test]
fn overlap_threshold_boundary_is_inclusive() {
    let units = || vec![FeatureUnit::new("u", rect(0.0, 0.0, 10.0, 10.0))];
    let occs = [occurrence("o1", 2015, rect(5.0, 0.0, 15.0, 10.0))];

    let at = run(units(), &occs, 50.0, 1);
    assert_eq!(at.table.evidence_count().unwrap(), &[1]);

    let below = run(units(), &occs, 50.0 + 1e-6, 1);
    assert_eq!(below.table.evidence_count().unwrap(), &[0]);
}

#[test]
fn evaluation_is_idempotent() {
    let units = || {
        (0..4)
            .map(|i| {
                let x = f64::from(i) * 10.0;
                FeatureUnit::new(format!("u{i}"), rect(x, 0.0, x + 10.0, 10.0)).with_prior_presence(i == 3)
            })
            .collect::<Vec<_>>()
    };
    let occs = [
        occurrence("o1", 2012, disc(5.0, 5.0, 3.0, 48)),
        occurrence("o2", 2018, disc(15.0, 5.0, 6.0, 48)),
        occurrence("o3", 2016, disc(20.0, 5.0, 4.0, 48)),
    ];
    let first = run(units(), &occs, 40.0, 1).records().unwrap();
    let second = run(units(), &occs, 40.0, 1).records().unwrap();

    let a = serde_json::to_string(&first).unwrap();
    let b = serde_json::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn confirmed_units_are_never_targets_and_unevidenced_never_confirmed() {
    let units: Vec<FeatureUnit> = (0..3)
        .flat_map(|r| {
            (0..3).map(move |c| {
                let (x, y) = (f64::from(c) * 10.0, f64::from(r) * 10.0);
                FeatureUnit::new(format!("r{r}c{c}"), rect(x, y, x + 10.0, y + 10.0)).with_prior_presence(r == 0)
            })
        })
        .collect();
    let occs = [
        occurrence("o1", 2010, rect(11.0, 11.0, 19.0, 19.0)),
        occurrence("o2", 2011, rect(21.0, 21.0, 29.0, 29.0)),
        occurrence("o3", 2012, rect(22.0, 22.0, 28.0, 28.0)),
    ];
    let eval = run(units, &occs, 90.0, 2);

    let counts = eval.table.evidence_count().unwrap();
    let knowledge = eval.table.knowledge().unwrap();
    let target = eval.table.target().unwrap();
    for row in 0..eval.table.len() {
        if counts[row] == 0 {
            assert_ne!(knowledge[row], Knowledge::Confirmed);
        }
        if knowledge[row] == Knowledge::Confirmed {
            assert_eq!(target[row], None);
        }
    }
    // Only the top-right cell has two occurrences.
    assert_eq!(eval.summary.confirmed, 1);
}

#[test]
fn best_overlap_policy_counts_straddling_occurrence_once() {
    let units = || {
        vec![
            FeatureUnit::new("a", rect(0.0, 0.0, 10.0, 10.0)),
            FeatureUnit::new("b", rect(10.0, 0.0, 20.0, 10.0)),
        ]
    };
    let occs = [occurrence("o1", 2015, rect(4.0, 0.0, 14.0, 10.0))];
    let params = EvaluationParameters::new(30.0, 1).unwrap();

    let every = evaluate(PartitionKind::Blocks, units(), &occs, &OccurrenceFilter::default(), params, &config()).unwrap();
    assert_eq!(every.table.evidence_count().unwrap(), &[1, 1]);

    let cfg = EvaluationConfig { attribution_policy: AttributionPolicy::BestOverlap, ..config() };
    let best = evaluate(PartitionKind::Blocks, units(), &occs, &OccurrenceFilter::default(), params, &cfg).unwrap();
    assert_eq!(best.table.evidence_count().unwrap(), &[1, 0]);
}

#[test]
fn date_filter_runs_before_attribution() {
    let units = vec![FeatureUnit::new("u", rect(0.0, 0.0, 10.0, 10.0))];
    let occs = [
        occurrence("old", 2001, rect(1.0, 1.0, 2.0, 2.0)),
        occurrence("new", 2019, rect(3.0, 3.0, 4.0, 4.0)),
    ];
    let params = EvaluationParameters::new(50.0, 2).unwrap();
    let filter = OccurrenceFilter::new([2019], [5]);
    let eval = evaluate(PartitionKind::Counties, units, &occs, &filter, params, &config()).unwrap();

    assert_eq!(eval.summary.occurrences_used, 1);
    assert_eq!(eval.table.evidence_count().unwrap(), &[1]);
    assert_eq!(eval.table.years_since_record().unwrap(), &[Some(1)]);
    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::Unknown]);
}

#[test]
fn contained_discs_clear_a_full_overlap_threshold_in_the_plane() {
    let units = vec![FeatureUnit::new("u", rect(0.0, 0.0, 10.0, 10.0))];
    let occs: Vec<Occurrence> = (0..50)
        .map(|i| {
            let cx = 1.0 + f64::from(i % 10) * 0.9;
            let cy = 1.3 + f64::from(i / 10) * 1.7;
            let r = 0.2 + f64::from(i % 7) * 0.1;
            occurrence(&format!("o{i}"), 2015, disc(cx, cy, r, 48 + (i as usize % 5) * 7))
        })
        .collect();
    let eval = run(units, &occs, 100.0, 1);

    assert_eq!(eval.summary.attributions, 50);
    assert_eq!(eval.table.evidence_count().unwrap(), &[50]);
}

#[test]
fn contained_discs_clear_a_full_overlap_threshold_under_albers() {
    let cfg = EvaluationConfig::default().with_reference_date(NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    let projector = cfg.equal_area.projector();
    let units = vec![FeatureUnit::new("u", rect(-81.0, 35.0, -79.0, 36.0))];
    let occs: Vec<Occurrence> = (0..50)
        .map(|i| OccurrencePoint {
            id: format!("o{i}"),
            timestamp: NaiveDate::from_ymd_opt(2016, 3, 1).unwrap(),
            lon: -80.9 + f64::from(i % 10) * 0.18,
            lat: 35.1 + f64::from(i / 10) * 0.17,
            radius_m: 300.0 + f64::from(i * 7 % 350),
        })
        .map(|p| p.buffer(&projector, cfg.circle_segments).unwrap())
        .collect();
    let params = EvaluationParameters::from_error_tolerance(0.0, 1).unwrap();
    let eval = evaluate(PartitionKind::Hucs, units, &occs, &OccurrenceFilter::default(), params, &cfg).unwrap();

    assert_eq!(eval.summary.attributions, 50);
    assert_eq!(eval.table.evidence_count().unwrap(), &[50]);
    assert_eq!(eval.table.knowledge().unwrap(), &[Knowledge::Confirmed]);
}

fn strip() -> Vec<FeatureUnit> {
    vec![
        FeatureUnit::new("a", rect(0.0, 0.0, 10.0, 10.0)).with_prior_presence(true),
        FeatureUnit::new("b", rect(10.0, 0.0, 20.0, 10.0)),
        FeatureUnit::new("c", rect(20.0, 0.0, 30.0, 10.0)),
    ]
}

#[test]
fn malformed_occurrence_degrades_the_run_without_changing_results() {
    let good = [
        occurrence("o1", 2015, rect(12.0, 2.0, 16.0, 6.0)),
        occurrence("o2", 2018, rect(22.0, 2.0, 26.0, 6.0)),
    ];
    let mut with_bad = good.to_vec();
    with_bad.push(occurrence("bad", 2019, rect(3.0, 3.0, f64::NAN, 5.0)));

    let clean = run(strip(), &good, 50.0, 1);
    let degraded = run(strip(), &with_bad, 50.0, 1);

    assert!(clean.summary.degraded_units.is_empty());
    assert_eq!(clean.summary.skipped_pairs, 0);

    // The bad circle cannot be tested against any unit.
    assert_eq!(degraded.summary.skipped_pairs, 3);
    assert!(degraded.skipped.iter().all(|s| s.occurrence_id == "bad"));
    assert_eq!(degraded.summary.degraded_units.len(), 3);
    assert!(degraded.summary.degraded_units.contains("a"));

    assert_eq!(
        serde_json::to_string(&clean.records().unwrap()).unwrap(),
        serde_json::to_string(&degraded.records().unwrap()).unwrap()
    );
}

#[test]
fn malformed_unit_is_tagged_while_neighbours_keep_their_results() {
    let occs = [
        occurrence("o1", 2015, rect(12.0, 2.0, 16.0, 6.0)),
        occurrence("o2", 2018, rect(22.0, 2.0, 26.0, 6.0)),
    ];
    let mut units = strip();
    units[2] = FeatureUnit::new("c", rect(20.0, 0.0, f64::NAN, 10.0)).with_prior_presence(true);

    let clean = run(strip(), &occs, 50.0, 1);
    let eval = run(units, &occs, 50.0, 1);

    assert_eq!(eval.summary.degraded_units.iter().collect::<Vec<_>>(), vec!["c"]);
    let (good, all) = (clean.records().unwrap(), eval.records().unwrap());
    assert_eq!(good[0], all[0]);
    assert_eq!(good[1], all[1]);
    // Left out of the presence mask and never confirmed.
    assert_eq!(all[2].evidence_count, 0);
    assert_eq!(all[2].knowledge, 0);
}
