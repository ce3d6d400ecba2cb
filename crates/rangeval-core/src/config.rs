//! Run configuration passed explicitly into [`crate::pipeline::evaluate`].

use std::path::Path;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::projection::EqualArea;

/// Unit in which `years_since_record` is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeUnit {
    /// Whole calendar years (anniversary-based).
    #[default]
    Years,
    /// Whole days.
    Days,
}

impl AgeUnit {
    /// Age of `date` at `reference`, truncated toward zero. Dates after the
    /// reference yield 0.
    pub fn age(self, reference: NaiveDate, date: NaiveDate) -> i64 {
        if date >= reference {
            return 0;
        }
        match self {
            AgeUnit::Days => (reference - date).num_days(),
            AgeUnit::Years => {
                let mut years = i64::from(reference.year() - date.year());
                if (reference.month(), reference.day()) < (date.month(), date.day()) {
                    years -= 1;
                }
                years
            }
        }
    }
}

/// How an occurrence that clears the threshold in several units is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionPolicy {
    /// Count it in every qualifying unit.
    #[default]
    EveryQualifying,
    /// Count it only in the unit holding the largest share of its circle;
    /// ties go to the lowest unit id.
    BestOverlap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Date ages are measured from.
    pub reference_date: NaiveDate,
    pub age_unit: AgeUnit,
    pub attribution_policy: AttributionPolicy,
    /// Plane in which overlap ratios are measured.
    pub equal_area: EqualArea,
    /// Vertex count for discs built from point + radius inputs.
    pub circle_segments: usize,
    /// Skip exact predicates when bounding rectangles are disjoint.
    pub bbox_prefilter: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            reference_date: Utc::now().date_naive(),
            age_unit: AgeUnit::default(),
            attribution_policy: AttributionPolicy::default(),
            equal_area: EqualArea::default(),
            circle_segments: 64,
            bbox_prefilter: true,
        }
    }
}

impl EvaluationConfig {
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.circle_segments < 8 {
            return Err(EvalError::Configuration(format!(
                "circle_segments must be at least 8, got {}",
                self.circle_segments
            )));
        }
        if let EqualArea::Albers(p) = self.equal_area {
            let in_range = |v: f64| (-90.0..=90.0).contains(&v);
            if !(in_range(p.lat_0) && in_range(p.lat_1) && in_range(p.lat_2)) {
                return Err(EvalError::Configuration("Albers latitudes must lie in [-90, 90]".into()));
            }
            if (p.lat_1 + p.lat_2).abs() < 1e-9 {
                return Err(EvalError::Configuration(
                    "Albers standard parallels must not be symmetric about the equator".into(),
                ));
            }
        }
        Ok(())
    }

    /// Read a JSON config; absent fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EvalError::Configuration(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| EvalError::Configuration(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn whole_years_are_anniversary_based() {
        let r = date(2020, 6, 1);
        assert_eq!(AgeUnit::Years.age(r, date(2019, 6, 1)), 1);
        assert_eq!(AgeUnit::Years.age(r, date(2019, 6, 2)), 0);
        assert_eq!(AgeUnit::Years.age(r, date(2010, 1, 1)), 10);
    }

    #[test]
    fn days_and_future_dates() {
        let r = date(2020, 3, 1);
        assert_eq!(AgeUnit::Days.age(r, date(2020, 2, 1)), 29);
        assert_eq!(AgeUnit::Days.age(r, date(2021, 1, 1)), 0);
        assert_eq!(AgeUnit::Years.age(r, date(2021, 1, 1)), 0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EvaluationConfig =
            serde_json::from_str(r#"{ "reference_date": "2019-12-31", "age_unit": "days" }"#).unwrap();
        assert_eq!(cfg.reference_date, date(2019, 12, 31));
        assert_eq!(cfg.age_unit, AgeUnit::Days);
        assert_eq!(cfg.attribution_policy, AttributionPolicy::EveryQualifying);
        assert!(cfg.bbox_prefilter);
        cfg.validate().unwrap();
    }

    #[test]
    fn planar_plane_parses() {
        let cfg: EvaluationConfig = serde_json::from_str(r#"{ "equal_area": { "kind": "planar" } }"#).unwrap();
        assert_eq!(cfg.equal_area, EqualArea::Planar);
    }

    #[test]
    fn too_few_segments_is_rejected() {
        let cfg = EvaluationConfig { circle_segments: 3, ..EvaluationConfig::default() };
        assert!(matches!(cfg.validate(), Err(EvalError::Configuration(_))));
    }
}
