//! Plain-text results report

use crate::analysis::{BestSegment, FatigueBucket, SegmentTable};
use crate::config::{ArmLabels, PeakHours};
use crate::stats::{ChiSquareResult, EffectSize, ProportionDifferenceCi};
use anyhow::Context;
use std::fmt::Write as _;
use std::path::Path;

/// `value` as a percentage, e.g. 0.0255 → "2.55%"
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Scientific notation with a signed, two-digit exponent, e.g. "1.7053e-13"
pub fn format_scientific(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*e}", decimals, value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => formatted,
    }
}

/// Confidence level as a label, e.g. 0.95 → "95%", 0.975 → "97.5%"
pub fn confidence_label(confidence: f64) -> String {
    let pct = confidence * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{:.0}%", pct)
    } else {
        format!("{pct}%")
    }
}

/// Every number the pipeline reports, gathered before anything is written
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub arms: ArmLabels,
    pub total_size: usize,
    pub treatment_size: usize,
    pub control_size: usize,
    pub chi_square: ChiSquareResult,
    pub effect: EffectSize,
    pub interval: ProportionDifferenceCi,
    pub alpha: f64,
    pub peak_hours: PeakHours,
    pub peak_hour_share: f64,
    pub weekend_share: f64,
    pub day_table: SegmentTable,
    pub hour_table: SegmentTable,
    pub fatigue_optimum: FatigueBucket,
}

impl AnalysisReport {
    pub fn is_significant(&self) -> bool {
        self.chi_square.p_value < self.alpha
    }

    /// Render the full report text
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> std::fmt::Result {
        let ArmLabels { treatment, control } = &self.arms;
        let level = confidence_label(self.interval.confidence);

        writeln!(out, "A/B Testing Analysis Results")?;
        writeln!(out, "============================")?;
        writeln!(out)?;
        writeln!(out, "Total sample size: {}", self.total_size)?;
        writeln!(out, "{treatment} group size: {}", self.treatment_size)?;
        writeln!(out, "{control} group size: {}", self.control_size)?;
        writeln!(out)?;

        writeln!(out, "Conversion Rates:")?;
        writeln!(out, "{treatment} group: {}", format_percent(self.interval.treatment_mean, 2))?;
        writeln!(out, "{control} group: {}", format_percent(self.interval.control_mean, 2))?;
        writeln!(out)?;

        writeln!(out, "Statistical Tests:")?;
        writeln!(out, "Chi-square statistic: {:.4}", self.chi_square.statistic)?;
        writeln!(out, "p-value: {}", format_scientific(self.chi_square.p_value, 4))?;
        writeln!(out, "Risk Ratio: {:.4}", self.effect.risk_ratio)?;
        writeln!(out, "Absolute Risk Reduction: {:.4}", self.effect.absolute_risk_reduction)?;
        writeln!(
            out,
            "{level} Confidence Interval for difference in conversion rates: ({:.4}, {:.4})",
            self.interval.lower, self.interval.upper
        )?;
        writeln!(
            out,
            "{level} Confidence Interval for absolute difference: ({}, {})",
            format_percent(self.interval.lower, 2),
            format_percent(self.interval.upper, 2)
        )?;
        writeln!(out)?;

        writeln!(out, "Feature Summary:")?;
        writeln!(
            out,
            "Peak-hour exposure ({}:00-{}:00): {} of users",
            self.peak_hours.start,
            self.peak_hours.end,
            format_percent(self.peak_hour_share, 2)
        )?;
        writeln!(out, "Weekend exposure: {} of users", format_percent(self.weekend_share, 2))?;
        writeln!(out)?;

        writeln!(out, "Segmentation Analysis:")?;
        for (title, table) in [
            ("Day of Week", &self.day_table),
            ("Hour of Day", &self.hour_table),
        ] {
            writeln!(out, "{title} Conversion Rates:")?;
            write_table(out, table)?;
            writeln!(out)?;
            writeln!(out, "Best performing {}s:", table.field.noun())?;
            write_best(out, &table.best_segments())?;
            writeln!(out)?;
        }

        writeln!(out, "Ad Fatigue Analysis:")?;
        writeln!(out, "Optimal number of ads: {}", self.fatigue_optimum.total_ads)?;
        writeln!(out, "Maximum conversion rate: {}", format_percent(self.fatigue_optimum.rate, 2))?;
        writeln!(out)?;

        writeln!(out, "Interpretation:")?;
        let p_value = format_scientific(self.chi_square.p_value, 4);
        if self.is_significant() {
            writeln!(
                out,
                "The difference in conversion rates between the {treatment} and {control} groups is statistically significant (p = {p_value} < {}).",
                self.alpha
            )?;
            if self.effect.risk_ratio > 1.0 {
                writeln!(
                    out,
                    "The {treatment} campaign appears to be effective in increasing conversions. Users in the {treatment} group are {:.1}% more likely to convert than those in the {control} group.",
                    (self.effect.risk_ratio - 1.0) * 100.0
                )?;
            } else {
                writeln!(out, "The {treatment} campaign does not appear to be effective in increasing conversions.")?;
            }
        } else {
            writeln!(
                out,
                "The difference in conversion rates between the {treatment} and {control} groups is not statistically significant (p = {p_value})."
            )?;
            writeln!(out, "More data may be needed to draw a conclusive result.")?;
        }

        Ok(())
    }

    /// Write the rendered report to `path`
    pub fn write(&self, path: &Path) -> crate::Result<()> {
        std::fs::write(path, self.render())
            .with_context(|| format!("cannot write report to {}", path.display()))
    }
}

/// Groups as rows, segments as columns; missing cells print as NaN
fn write_table(out: &mut String, table: &SegmentTable) -> std::fmt::Result {
    let header = table.field.column();
    let first = table
        .groups
        .iter()
        .map(String::len)
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0);
    let labels: Vec<String> = table.segments.iter().map(ToString::to_string).collect();
    let widths: Vec<usize> = labels.iter().map(|l| l.len().max(8)).collect();

    write!(out, "{header:<first$}")?;
    for (label, width) in labels.iter().zip(&widths) {
        write!(out, "  {label:>width$}")?;
    }
    writeln!(out)?;

    for (i, group) in table.groups.iter().enumerate() {
        write!(out, "{group:<first$}")?;
        for (j, width) in widths.iter().enumerate() {
            let cell = match table.rate(i, j) {
                Some(rate) => format!("{rate:.6}"),
                None => "NaN".to_string(),
            };
            write!(out, "  {cell:>width$}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_best(out: &mut String, best: &[BestSegment]) -> std::fmt::Result {
    for entry in best {
        writeln!(out, "{}: {} ({})", entry.group, entry.segment, format_percent(entry.rate, 2))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{SegmentCell, SegmentField, SegmentKey};
    use chrono::Weekday;
    use ndarray::array;

    fn day_table() -> SegmentTable {
        SegmentTable {
            field: SegmentField::DayOfWeek,
            groups: vec!["ad".into(), "psa".into()],
            segments: vec![SegmentKey::Day(Weekday::Mon), SegmentKey::Day(Weekday::Tue)],
            cells: array![
                [
                    Some(SegmentCell { rate: 0.0332, count: 1000 }),
                    Some(SegmentCell { rate: 0.0298, count: 1000 })
                ],
                [Some(SegmentCell { rate: 0.0226, count: 100 }), None]
            ],
        }
    }

    fn hour_table() -> SegmentTable {
        SegmentTable {
            field: SegmentField::HourOfDay,
            groups: vec!["ad".into(), "psa".into()],
            segments: vec![SegmentKey::Hour(16), SegmentKey::Hour(20)],
            cells: array![
                [
                    Some(SegmentCell { rate: 0.0308, count: 500 }),
                    Some(SegmentCell { rate: 0.0297, count: 500 })
                ],
                [
                    Some(SegmentCell { rate: 0.0203, count: 50 }),
                    Some(SegmentCell { rate: 0.0228, count: 50 })
                ]
            ],
        }
    }

    fn report(p_value: f64, risk_ratio: f64) -> AnalysisReport {
        AnalysisReport {
            arms: ArmLabels::default(),
            total_size: 20_000,
            treatment_size: 10_000,
            control_size: 10_000,
            chi_square: ChiSquareResult {
                statistic: 9.428571428571429,
                p_value,
                dof: 1,
            },
            effect: EffectSize {
                treatment_rate: 0.06,
                control_rate: 0.05,
                risk_ratio,
                absolute_risk_reduction: 0.01,
            },
            interval: ProportionDifferenceCi {
                treatment_mean: 0.06,
                control_mean: 0.05,
                lower: 0.0036820296912778855,
                upper: 0.016317970308722105,
                margin: 0.0063179703087221095,
                confidence: 0.95,
            },
            alpha: 0.05,
            peak_hours: PeakHours::default(),
            peak_hour_share: 0.5,
            weekend_share: 0.25,
            day_table: day_table(),
            hour_table: hour_table(),
            fatigue_optimum: FatigueBucket {
                total_ads: 12,
                rate: 0.0481,
                count: 400,
            },
        }
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.0255, 2), "2.55%");
        assert_eq!(format_percent(0.0036820296912778855, 2), "0.37%");
        assert_eq!(format_percent(-0.0012, 2), "-0.12%");
    }

    #[test]
    fn test_format_scientific() {
        assert_eq!(format_scientific(0.002136306416781164, 4), "2.1363e-03");
        assert_eq!(format_scientific(1.7053e-13, 4), "1.7053e-13");
        assert_eq!(format_scientific(0.5, 4), "5.0000e-01");
        assert_eq!(format_scientific(12345.0, 2), "1.23e+04");
        assert_eq!(format_scientific(0.0, 4), "0.0000e+00");
    }

    #[test]
    fn test_confidence_label() {
        assert_eq!(confidence_label(0.95), "95%");
        assert_eq!(confidence_label(0.975), "97.5%");
    }

    #[test]
    fn test_render_statistics_section() {
        let text = report(0.002136306416781164, 1.2).render();

        assert!(text.starts_with("A/B Testing Analysis Results\n============================\n\n"));
        assert!(text.contains("Total sample size: 20000\nad group size: 10000\npsa group size: 10000\n"));
        assert!(text.contains("ad group: 6.00%\npsa group: 5.00%\n"));
        assert!(text.contains("Chi-square statistic: 9.4286\n"));
        assert!(text.contains("p-value: 2.1363e-03\n"));
        assert!(text.contains("Risk Ratio: 1.2000\n"));
        assert!(text.contains("Absolute Risk Reduction: 0.0100\n"));
        assert!(text.contains("95% Confidence Interval for difference in conversion rates: (0.0037, 0.0163)\n"));
        assert!(text.contains("95% Confidence Interval for absolute difference: (0.37%, 1.63%)\n"));
        assert!(text.contains("Peak-hour exposure (9:00-17:00): 50.00% of users\n"));
    }

    #[test]
    fn test_render_segments_and_fatigue() {
        let text = report(0.01, 1.2).render();

        assert!(text.contains("most ads day    Monday   Tuesday\n"));
        assert!(text.contains("psa           0.022600       NaN\n"));
        assert!(text.contains("Best performing days:\nad: Monday (3.32%)\npsa: Monday (2.26%)\n"));
        assert!(text.contains("Best performing hours:\nad: 16 (3.08%)\npsa: 20 (2.28%)\n"));
        assert!(text.contains("Optimal number of ads: 12\nMaximum conversion rate: 4.81%\n"));
    }

    #[test]
    fn test_render_interpretation() {
        let significant = report(0.002136306416781164, 1.2).render();
        assert!(significant.contains("is statistically significant (p = 2.1363e-03 < 0.05)."));
        assert!(significant.contains("Users in the ad group are 20.0% more likely to convert than those in the psa group."));

        let ineffective = report(0.002136306416781164, 0.8).render();
        assert!(ineffective.contains("The ad campaign does not appear to be effective"));

        let inconclusive = report(0.2, 1.2).render();
        assert!(inconclusive.contains("is not statistically significant (p = 2.0000e-01)."));
        assert!(inconclusive.contains("More data may be needed to draw a conclusive result."));
    }

    #[test]
    fn test_render_is_deterministic() {
        assert_eq!(report(0.01, 1.2).render(), report(0.01, 1.2).render());
    }
}
