//! Command-line interface definitions and argument parsing

use crate::config::{AnalysisConfig, ArmLabels, PeakHours};
use clap::Parser;
use std::path::PathBuf;

/// A/B test analysis of ad-exposure conversion data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data/raw/marketing_AB_test_data.csv")]
    pub input: PathBuf,

    /// Directory for results.txt and the figures/ subdirectory
    #[arg(short, long, default_value = "results")]
    pub output_dir: PathBuf,

    /// Label of the exposed (treatment) group
    #[arg(long, default_value = "ad")]
    pub treatment_label: String,

    /// Label of the control group
    #[arg(long, default_value = "psa")]
    pub control_label: String,

    /// Confidence level for the difference-of-proportions interval
    #[arg(long, default_value = "0.95")]
    pub confidence: f64,

    /// Significance threshold used in the interpretation
    #[arg(long, default_value = "0.05")]
    pub alpha: f64,

    /// Disable Yates' continuity correction on 2x2 tables
    #[arg(long)]
    pub no_yates: bool,

    /// Ad-fatigue buckets need more than this many users to be kept
    #[arg(long, default_value = "100")]
    pub fatigue_min_count: usize,

    /// Day/hour segments need more than this many users to be kept (0 keeps all)
    #[arg(long, default_value = "0")]
    pub segment_min_count: usize,

    /// First hour of the peak exposure window (inclusive)
    #[arg(long, default_value = "9")]
    pub peak_start: i64,

    /// Last hour of the peak exposure window (inclusive)
    #[arg(long, default_value = "17")]
    pub peak_end: i64,

    /// Upper bound on total ads shown in the conversion-by-ads scatter
    #[arg(long, default_value = "500")]
    pub scatter_max_ads: i64,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build a validated run configuration from the parsed flags
    pub fn to_config(&self) -> crate::Result<AnalysisConfig> {
        let arms = ArmLabels::new(self.treatment_label.trim(), self.control_label.trim())?;
        let peak_hours = PeakHours::new(self.peak_start, self.peak_end)?;

        let config = AnalysisConfig {
            arms,
            confidence: self.confidence,
            alpha: self.alpha,
            yates_correction: !self.no_yates,
            fatigue_min_count: self.fatigue_min_count,
            segment_min_count: self.segment_min_count,
            peak_hours,
            scatter_max_ads: self.scatter_max_ads,
            ..AnalysisConfig::new(&self.input, &self.output_dir)
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags() {
        let args = Args::parse_from(["liftforge"]);
        let config = args.to_config().unwrap();

        assert_eq!(config.arms, ArmLabels::default());
        assert_eq!(config.confidence, 0.95);
        assert_eq!(config.fatigue_min_count, 100);
        assert_eq!(config.segment_min_count, 0);
        assert_eq!(config.peak_hours, PeakHours::new(9, 17).unwrap());
        assert!(config.yates_correction);
    }

    #[test]
    fn test_to_config_rejects_bad_values() {
        let mut args = Args::parse_from(["liftforge", "--treatment-label", "exposed", "--control-label", "control"]);
        let config = args.to_config().unwrap();
        assert_eq!(config.arms.treatment, "exposed");

        args.control_label = "exposed".to_string();
        assert!(args.to_config().is_err());

        args.control_label = "control".to_string();
        args.confidence = 1.5;
        assert!(args.to_config().is_err());

        args.confidence = 0.95;
        args.peak_start = 20;
        assert!(args.to_config().is_err());
    }
}
