//! Integration tests for LiftForge

use clap::Parser;
use liftforge::{pipeline, AnalysisConfig, Args};
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, NamedTempFile};

const HEADER: &str = "user id,test group,converted,total ads,most ads day,most ads hour";
const DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const FIGURES: [&str; 8] = [
    "conversion_rates",
    "ads_distribution",
    "conversion_by_ads",
    "ad_views_heatmap",
    "cumulative_conversions",
    "conversion_by_day",
    "conversion_by_hour",
    "ad_fatigue",
];

/// 3000 users: two thirds `treatment`, one third `control`
fn create_test_csv(treatment: &str, control: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for i in 0..3000usize {
        let (group, converted) = if i % 3 == 0 {
            (control, i % 29 == 0)
        } else {
            (treatment, i % 17 == 0)
        };
        let converted = if converted { "True" } else { "False" };
        writeln!(
            file,
            "{},{},{},{},{},{}",
            900_000 + i,
            group,
            converted,
            i % 5 + 1,
            DAYS[i % 7],
            (i * 7) % 24
        )
        .unwrap();
    }
    file
}

fn config_for(input: &Path, output: &Path) -> AnalysisConfig {
    AnalysisConfig::new(input, output)
}

#[test]
fn test_end_to_end_pipeline() {
    let input = create_test_csv("ad", "psa");
    let output = tempdir().unwrap();

    let outcome = pipeline::run(&config_for(input.path(), output.path())).unwrap();

    assert_eq!(outcome.figures.len(), 8);
    for name in FIGURES {
        let path = output.path().join("figures").join(format!("{name}.png"));
        assert!(path.exists(), "missing figure {}", path.display());
    }

    assert_eq!(outcome.report_path, output.path().join("results.txt"));
    assert!(outcome.report_path.exists());

    let report = &outcome.report;
    assert_eq!(report.total_size, 3000);
    assert_eq!(report.treatment_size, 2000);
    assert_eq!(report.control_size, 1000);
    assert_eq!(report.chi_square.dof, 1);
    assert!(report.chi_square.p_value >= 0.0 && report.chi_square.p_value <= 1.0);
    assert!(report.interval.lower <= report.interval.upper);
    assert!((1..=5).contains(&report.fatigue_optimum.total_ads));

    let text = std::fs::read_to_string(&outcome.report_path).unwrap();
    assert_eq!(text, report.render());
    for heading in [
        "A/B Testing Analysis Results",
        "Conversion Rates:",
        "Statistical Tests:",
        "Segmentation Analysis:",
        "Best performing days:",
        "Best performing hours:",
        "Ad Fatigue Analysis:",
        "Interpretation:",
    ] {
        assert!(text.contains(heading), "report lacks `{heading}`");
    }
    assert!(text.contains("ad group size: 2000"));
    assert!(text.contains("psa group size: 1000"));
}

#[test]
fn test_missing_column_fails_before_writing() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "user id,test group,converted,total ads,most ads day").unwrap();
    writeln!(input, "1,ad,True,10,Monday").unwrap();
    writeln!(input, "2,psa,False,12,Tuesday").unwrap();
    let output = tempdir().unwrap();

    let err = pipeline::run(&config_for(input.path(), output.path())).unwrap_err();

    assert!(format!("{err:#}").contains("most ads hour"));
    assert!(!output.path().join("results.txt").exists());
}

#[test]
fn test_unexpected_group_labels_are_rejected() {
    let input = create_test_csv("ad", "psa");
    let output = tempdir().unwrap();
    let mut config = config_for(input.path(), output.path());
    config.arms = liftforge::ArmLabels::new("treatment", "control").unwrap();

    let err = pipeline::run(&config).unwrap_err();

    assert!(format!("{err:#}").contains("expected exactly the groups"));
    assert!(!output.path().join("results.txt").exists());
}

#[test]
fn test_fatigue_threshold_without_reliable_buckets() {
    let input = create_test_csv("ad", "psa");
    let output = tempdir().unwrap();
    let mut config = config_for(input.path(), output.path());
    config.fatigue_min_count = 10_000;

    let err = pipeline::run(&config).unwrap_err();

    assert!(format!("{err:#}").contains("no exposure bucket has more than 10000 observations"));
    assert!(!output.path().join("results.txt").exists());
}

#[test]
fn test_cli_labels_flow_through_pipeline() {
    let input = create_test_csv("exposed", "holdout");
    let output = tempdir().unwrap();

    let args = Args::parse_from([
        "liftforge",
        "--input",
        input.path().to_str().unwrap(),
        "--output-dir",
        output.path().to_str().unwrap(),
        "--treatment-label",
        "exposed",
        "--control-label",
        "holdout",
        "--confidence",
        "0.9",
        "--no-yates",
    ]);
    let config = args.to_config().unwrap();
    assert!(!config.yates_correction);

    let outcome = pipeline::run(&config).unwrap();
    let text = outcome.report.render();

    assert!(text.contains("exposed group size: 2000"));
    assert!(text.contains("holdout group size: 1000"));
    assert!(text.contains("90% Confidence Interval for difference in conversion rates"));
}

#[test]
fn test_missing_input_file() {
    let output = tempdir().unwrap();
    let missing = output.path().join("does_not_exist.csv");

    let err = pipeline::run(&config_for(&missing, output.path())).unwrap_err();

    assert!(format!("{err:#}").contains("does_not_exist.csv"));
}
