//! Validated run configuration

use crate::error::AnalysisError;
use polars::prelude::{lit, Expr};
use std::path::{Path, PathBuf};

/// The two arms of the experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmLabels {
    pub treatment: String,
    pub control: String,
}

impl ArmLabels {
    pub fn new(treatment: impl Into<String>, control: impl Into<String>) -> Result<Self, AnalysisError> {
        let treatment = treatment.into();
        let control = control.into();
        if treatment.trim().is_empty() || control.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "group labels must not be empty".to_string(),
            ));
        }
        if treatment == control {
            return Err(AnalysisError::InvalidConfig(format!(
                "treatment and control labels are both `{treatment}`"
            )));
        }
        Ok(Self { treatment, control })
    }

    /// Labels in (treatment, control) order
    pub fn as_pair(&self) -> [&str; 2] {
        [&self.treatment, &self.control]
    }
}

impl Default for ArmLabels {
    fn default() -> Self {
        Self {
            treatment: "ad".to_string(),
            control: "psa".to_string(),
        }
    }
}

/// Inclusive hour-of-day window counted as peak exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakHours {
    pub start: i64,
    pub end: i64,
}

impl PeakHours {
    pub fn new(start: i64, end: i64) -> Result<Self, AnalysisError> {
        if !(0..=23).contains(&start) || !(0..=23).contains(&end) || start > end {
            return Err(AnalysisError::InvalidConfig(format!(
                "peak hours must satisfy 0 <= start <= end <= 23, got {start}..={end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Boolean expression `start <= hour <= end`; a null hour stays null
    pub fn window(&self, hour: Expr) -> Expr {
        hour.clone()
            .gt_eq(lit(self.start))
            .and(hour.lt_eq(lit(self.end)))
    }
}

impl Default for PeakHours {
    fn default() -> Self {
        Self { start: 9, end: 17 }
    }
}

/// Everything a single pipeline run needs
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub arms: ArmLabels,
    pub confidence: f64,
    pub alpha: f64,
    pub yates_correction: bool,
    /// Ad-fatigue buckets with a sample count at or below this are dropped
    pub fatigue_min_count: usize,
    /// Segmentation cells at or below this count are dropped; 0 keeps every cell
    pub segment_min_count: usize,
    pub peak_hours: PeakHours,
    pub scatter_max_ads: i64,
}

impl AnalysisConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            arms: ArmLabels::default(),
            confidence: 0.95,
            alpha: 0.05,
            yates_correction: true,
            fatigue_min_count: 100,
            segment_min_count: 0,
            peak_hours: PeakHours::default(),
            scatter_max_ads: 500,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(AnalysisError::InvalidConfidence(self.confidence));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "alpha must lie strictly between 0 and 1, got {}",
                self.alpha
            )));
        }
        if self.scatter_max_ads < 1 {
            return Err(AnalysisError::InvalidConfig(format!(
                "scatter ad cap must be positive, got {}",
                self.scatter_max_ads
            )));
        }
        Ok(())
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.output_dir.join("figures")
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("results.txt")
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }
}
