//! Error taxonomy for data-shape, statistical-degeneracy and configuration failures
//!
//! I/O failures are not listed here; they travel as `anyhow` errors with the
//! offending path attached as context.

use thiserror::Error;

/// Errors raised by the analysis itself, as opposed to the filesystem
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("missing expected columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("column `{column}` contains {count} null values")]
    NullValues { column: String, count: usize },

    #[error("user id is not unique: {unique} distinct ids across {rows} rows")]
    DuplicateUserIds { unique: usize, rows: usize },

    #[error("expected exactly the groups [{expected}], found [{found}]")]
    UnexpectedGroups { expected: String, found: String },

    #[error("group `{0}` is not present in the data")]
    MissingGroup(String),

    #[error("unrecognised day-of-week label `{0}`")]
    UnknownDay(String),

    #[error("hour of day out of range 0..=23: {0}")]
    InvalidHour(String),

    #[error("unsupported segment field: {0}")]
    UnsupportedSegmentField(String),

    #[error("insufficient variation in `{field}`: need at least 2 distinct values, found {found}")]
    InsufficientVariation { field: String, found: usize },

    #[error("undefined risk ratio: control group `{0}` has a conversion rate of zero")]
    UndefinedRiskRatio(String),

    #[error("insufficient sample for `{label}`: need at least 2 observations, found {size}")]
    InsufficientSample { label: String, size: usize },

    #[error("pooled standard error is zero; both samples have zero variance")]
    ZeroVariance,

    #[error("no exposure bucket has more than {0} observations")]
    NoReliableBuckets(usize),

    #[error("confidence level must lie strictly between 0 and 1, got {0}")]
    InvalidConfidence(f64),

    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
