//! Range-map evaluation against occurrence evidence.
//!
//! Given a partition of a study area into feature units and a set of
//! occurrence circles, the pipeline attributes occurrences to units,
//! aggregates evidence per unit, classifies each unit's knowledge status and
//! flags units that should be prioritized for sampling.

pub mod aggregate;
pub mod attribution;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod occurrence;
pub mod params;
pub mod pipeline;
pub mod projection;
pub mod range;
pub mod target;
pub mod units;

pub use config::{AgeUnit, AttributionPolicy, EvaluationConfig};
pub use error::{EvalError, GeometryError, Stage};
pub use export::{AttributeRecord, EvaluatedFeature};
pub use geometry::{GeoAdapter, GeometryAdapter};
pub use occurrence::{Occurrence, OccurrenceFilter, OccurrencePoint};
pub use params::{EvaluationParameters, ParameterTable, PartitionKind};
pub use pipeline::{evaluate, Evaluation, Evaluator, RunSummary};
pub use projection::{AlbersParams, EqualArea};
pub use range::{apply_range_records, RangeRecord};
pub use units::{FeatureUnit, Knowledge, UnitTable};
