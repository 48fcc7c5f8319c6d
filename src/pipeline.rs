//! End-to-end run: prepare → test → segment → plot → report

use crate::analysis::{ad_fatigue_analysis, segmentation_analysis, SegmentField};
use crate::config::AnalysisConfig;
use crate::data::{prepare_data, CONVERTED, TEST_GROUP};
use crate::report::AnalysisReport;
use crate::stats::{chi_square_test, confidence_interval, effect_size};
use crate::viz::{self, AdFatigueChart, Figure, SegmentChart};
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Artifacts produced by a successful run
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub figures: Vec<PathBuf>,
    pub report_path: PathBuf,
    pub report: AnalysisReport,
}

/// Run the whole analysis described by `config`
///
/// The report file is written last, so a failed run never leaves a
/// results file behind.
pub fn run(config: &AnalysisConfig) -> crate::Result<AnalysisOutcome> {
    config.validate()?;

    // Step 1: output directory
    let figures_dir = config.figures_dir();
    fs::create_dir_all(&figures_dir)
        .with_context(|| format!("cannot create output directory {}", figures_dir.display()))?;

    // Step 2: load, clean and validate
    let arms = &config.arms;
    let data = prepare_data(config.input_path(), arms, config.peak_hours)?;

    // Step 3: significance, effect size and interval
    let chi_square = chi_square_test(&data, TEST_GROUP, CONVERTED, config.yates_correction)
        .with_context(|| format!("chi-square test on `{TEST_GROUP}` × `{CONVERTED}`"))?;
    let effect = effect_size(&data, TEST_GROUP, CONVERTED, arms)
        .with_context(|| format!("effect size of `{}` against `{}`", arms.treatment, arms.control))?;
    let interval = confidence_interval(&data, TEST_GROUP, CONVERTED, arms, config.confidence)
        .context("difference-of-proportions confidence interval")?;
    info!(
        chi2 = chi_square.statistic,
        p = chi_square.p_value,
        risk_ratio = effect.risk_ratio,
        "statistical tests complete"
    );

    // Step 4: descriptive figures
    let overview: Vec<Box<dyn Figure>> = vec![
        Box::new(viz::conversion_rates_chart(&data, TEST_GROUP, CONVERTED)?),
        Box::new(viz::ads_distribution_chart(&data)?),
        Box::new(viz::conversion_by_ads_chart(&data, TEST_GROUP, CONVERTED, config.scatter_max_ads)?),
        Box::new(viz::heatmap_chart(&data, &arms.treatment)?),
        Box::new(viz::cumulative_conversions_chart(&data, TEST_GROUP, CONVERTED)?),
    ];
    let mut figures = save_all(&overview, &figures_dir)?;

    // Step 5: segmentation and ad fatigue
    let day_table = segmentation_analysis(
        &data,
        TEST_GROUP,
        CONVERTED,
        SegmentField::DayOfWeek,
        config.segment_min_count,
    )
    .context("day-of-week segmentation")?;
    let hour_table = segmentation_analysis(
        &data,
        TEST_GROUP,
        CONVERTED,
        SegmentField::HourOfDay,
        config.segment_min_count,
    )
    .context("hour-of-day segmentation")?;
    let fatigue = ad_fatigue_analysis(
        &data,
        TEST_GROUP,
        CONVERTED,
        &arms.treatment,
        config.fatigue_min_count,
    )
    .with_context(|| format!("ad fatigue analysis of `{}`", arms.treatment))?;
    let fatigue_optimum = fatigue
        .optimum()
        .with_context(|| format!("ad fatigue analysis of `{}`", arms.treatment))?;

    // Figures for step 5
    let advanced: Vec<Box<dyn Figure>> = vec![
        Box::new(SegmentChart::new(day_table.clone())),
        Box::new(SegmentChart::new(hour_table.clone())),
        Box::new(AdFatigueChart::new(&fatigue)),
    ];
    figures.extend(save_all(&advanced, &figures_dir)?);

    // Step 6: the report goes last, once nothing else can fail
    let report = AnalysisReport {
        arms: arms.clone(),
        total_size: data.height(),
        treatment_size: data.group_size(&arms.treatment)?,
        control_size: data.group_size(&arms.control)?,
        chi_square,
        effect,
        interval,
        alpha: config.alpha,
        peak_hours: config.peak_hours,
        peak_hour_share: data.peak_hour_share()?,
        weekend_share: data.weekend_share()?,
        day_table,
        hour_table,
        fatigue_optimum,
    };

    let report_path = config.report_path();
    report.write(&report_path)?;
    info!(path = %report_path.display(), "report written");

    Ok(AnalysisOutcome {
        figures,
        report_path,
        report,
    })
}

fn save_all(figures: &[Box<dyn Figure>], dir: &std::path::Path) -> crate::Result<Vec<PathBuf>> {
    figures
        .iter()
        .map(|figure| {
            debug!(figure = figure.name(), "rendering");
            figure
                .save(dir)
                .with_context(|| format!("failed to render figure `{}`", figure.name()))
        })
        .collect()
}
