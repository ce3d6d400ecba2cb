//! Error taxonomy for an evaluation run.
//!
//! Configuration and integrity failures abort the run. Geometry failures
//! inside the stages are scoped to a single unit × occurrence pair and are
//! recovered; the one fatal geometry path is building occurrence circles
//! during setup, where a point that cannot be buffered aborts the run.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::units::Column;

/// Pipeline stage names, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Attribution,
    Aggregation,
    Classification,
    Targeting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Attribution => "attribution",
            Stage::Aggregation => "aggregation",
            Stage::Classification => "classification",
            Stage::Targeting => "targeting",
        };
        f.write_str(name)
    }
}

/// Failure of a single geometry-backend call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry is empty")]
    Empty,
    #[error("geometry has a non-finite coordinate ({x}, {y})")]
    NonFinite { x: f64, y: f64 },
    #[error("ring has {coords} coordinates; a closed ring needs at least 4")]
    DegenerateRing { coords: usize },
    #[error("latitude {lat} is outside the projection domain")]
    OutOfDomain { lat: f64 },
    #[error("geometry backend panicked during {op}")]
    BackendPanic { op: &'static str },
}

/// Fatal errors that stop an evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data integrity error in {stage}: unit `{unit_id}` {detail}")]
    DataIntegrity {
        stage: Stage,
        unit_id: String,
        detail: &'static str,
    },

    #[error("{stage} tried to overwrite column `{column}` written by an earlier stage")]
    ColumnAlreadyWritten { stage: Stage, column: Column },

    #[error("{stage} needs column `{column}`, which has not been written")]
    MissingColumn { stage: Stage, column: Column },

    #[error("geometry error in {stage} for `{id}`: {source}")]
    Geometry {
        stage: Stage,
        id: String,
        #[source]
        source: GeometryError,
    },
}

impl EvalError {
    /// Stage that raised the error, if it is tied to one.
    pub fn stage(&self) -> Stage {
        match self {
            EvalError::Configuration(_) => Stage::Setup,
            EvalError::DataIntegrity { stage, .. }
            | EvalError::ColumnAlreadyWritten { stage, .. }
            | EvalError::MissingColumn { stage, .. }
            | EvalError::Geometry { stage, .. } => *stage,
        }
    }

    pub(crate) fn unknown_unit(stage: Stage, unit_id: impl Into<String>) -> Self {
        EvalError::DataIntegrity {
            stage,
            unit_id: unit_id.into(),
            detail: "is not in the feature-unit table",
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
