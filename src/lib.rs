//! LiftForge: A/B test analysis for ad campaigns
//!
//! Loads a per-user experiment export, tests whether the treatment arm
//! converts better than the control arm, breaks conversion down by exposure
//! time and ad volume, then writes charts and a plain-text report.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod viz;

pub use analysis::{ad_fatigue_analysis, segmentation_analysis, FatigueAnalysis, SegmentField, SegmentTable};
pub use cli::Args;
pub use config::{AnalysisConfig, ArmLabels, PeakHours};
pub use data::{prepare_data, PreparedData};
pub use error::AnalysisError;
pub use pipeline::{run, AnalysisOutcome};
pub use report::AnalysisReport;
pub use stats::{calculate_effect_size, chi_square_test, confidence_interval, effect_size, proportion_difference_ci};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
