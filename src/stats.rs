//! Hypothesis test, effect size and two-proportion confidence interval

use crate::config::ArmLabels;
use crate::data::{string_values, u64_values, GroupRate, PreparedData};
use crate::error::AnalysisError;
use anyhow::Context;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use tracing::debug;

/// Cross-tabulated counts of two categorical fields
#[derive(Debug, Clone, PartialEq)]
pub struct ContingencyTable {
    pub row_labels: Vec<String>,
    pub col_labels: Vec<String>,
    /// Observed counts, rows × columns
    pub counts: Array2<f64>,
}

impl ContingencyTable {
    /// Count every (row value, column value) pair of two columns
    pub fn from_data(data: &PreparedData, row_field: &str, col_field: &str) -> crate::Result<Self> {
        let df = data
            .frame()
            .clone()
            .lazy()
            .group_by([
                col(row_field).cast(DataType::String),
                col(col_field).cast(DataType::String),
            ])
            .agg([len().alias("count")])
            .collect()?;

        let rows = string_values(&df, row_field)?;
        let cols = string_values(&df, col_field)?;
        let counts = u64_values(&df, "count")?;

        let mut row_labels = rows.clone();
        row_labels.sort();
        row_labels.dedup();
        let mut col_labels = cols.clone();
        col_labels.sort();
        col_labels.dedup();

        for (field, labels) in [(row_field, &row_labels), (col_field, &col_labels)] {
            if labels.len() < 2 {
                return Err(AnalysisError::InsufficientVariation {
                    field: field.to_string(),
                    found: labels.len(),
                }
                .into());
            }
        }

        let mut table = Array2::zeros((row_labels.len(), col_labels.len()));
        for ((row, column), count) in rows.iter().zip(&cols).zip(counts) {
            // Both label lists were built from these values
            let i = row_labels.binary_search(row).unwrap_or_default();
            let j = col_labels.binary_search(column).unwrap_or_default();
            table[[i, j]] += count as f64;
        }

        Ok(Self {
            row_labels,
            col_labels,
            counts: table,
        })
    }

    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    /// Degrees of freedom, (rows − 1) × (cols − 1)
    pub fn dof(&self) -> usize {
        (self.counts.nrows().saturating_sub(1)) * (self.counts.ncols().saturating_sub(1))
    }

    /// Expected counts under independence, from the marginal totals
    pub fn expected(&self) -> Array2<f64> {
        let row_totals: Array1<f64> = self.counts.sum_axis(Axis(1));
        let col_totals: Array1<f64> = self.counts.sum_axis(Axis(0));
        let total = self.total();

        Array2::from_shape_fn(self.counts.dim(), |(i, j)| row_totals[i] * col_totals[j] / total)
    }

    pub fn transpose(&self) -> Self {
        Self {
            row_labels: self.col_labels.clone(),
            col_labels: self.row_labels.clone(),
            counts: self.counts.t().to_owned(),
        }
    }

    /// Pearson's chi-square test of independence
    ///
    /// With `yates` set, a 2×2 table gets the continuity correction: each
    /// observed count moves towards its expected count by at most 0.5.
    pub fn chi_square(&self, yates: bool) -> crate::Result<ChiSquareResult> {
        let dof = self.dof();
        // A single row or column has nothing to compare against
        if dof == 0 {
            return Err(AnalysisError::InsufficientVariation {
                field: "contingency table".to_string(),
                found: self.counts.nrows().min(self.counts.ncols()),
            }
            .into());
        }

        let expected = self.expected();
        let correct = yates && dof == 1;

        let statistic = self
            .counts
            .iter()
            .zip(expected.iter())
            .map(|(&observed, &expected)| {
                let diff = if correct {
                    let raw = (observed - expected).abs();
                    raw - raw.min(0.5)
                } else {
                    observed - expected
                };
                diff * diff / expected
            })
            .sum::<f64>();

        // Upper tail of χ²(dof), clamped to [0, 1]
        let distribution =
            ChiSquared::new(dof as f64).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
        let p_value = distribution.sf(statistic).clamp(0.0, 1.0);

        Ok(ChiSquareResult {
            statistic,
            p_value,
            dof,
        })
    }
}

/// Outcome of a chi-square test of independence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
}

/// Chi-square test of independence between a group field and an outcome field
pub fn chi_square_test(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    yates: bool,
) -> crate::Result<ChiSquareResult> {
    let table = ContingencyTable::from_data(data, group_field, outcome_field)?;
    debug!(rows = ?table.row_labels, cols = ?table.col_labels, counts = ?table.counts, "contingency table");
    table.chi_square(yates)
}

/// Risk ratio and absolute risk reduction of treatment versus control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSize {
    pub treatment_rate: f64,
    pub control_rate: f64,
    pub risk_ratio: f64,
    pub absolute_risk_reduction: f64,
}

/// Effect size from per-group rates
///
/// # Arguments
/// * `rates` - Per-group conversion rates, e.g. from `PreparedData::group_rates`
/// * `arms` - Which labels are treatment and control
///
/// # Returns
/// * `EffectSize` with `risk_ratio = p_t / p_c` and `absolute_risk_reduction = p_t - p_c`
pub fn calculate_effect_size(rates: &[GroupRate], arms: &ArmLabels) -> Result<EffectSize, AnalysisError> {
    let rate_of = |label: &str| {
        rates
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.rate)
            .ok_or_else(|| AnalysisError::MissingGroup(label.to_string()))
    };

    let treatment_rate = rate_of(&arms.treatment)?;
    let control_rate = rate_of(&arms.control)?;
    if control_rate == 0.0 {
        return Err(AnalysisError::UndefinedRiskRatio(arms.control.clone()));
    }

    Ok(EffectSize {
        treatment_rate,
        control_rate,
        risk_ratio: treatment_rate / control_rate,
        absolute_risk_reduction: treatment_rate - control_rate,
    })
}

/// Effect size computed from the group rates of a prepared dataset
pub fn effect_size(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    arms: &ArmLabels,
) -> crate::Result<EffectSize> {
    let rates = data.group_rates(group_field, outcome_field)?;
    Ok(calculate_effect_size(&rates, arms)?)
}

/// Normal-approximation interval for the difference of two proportions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProportionDifferenceCi {
    pub treatment_mean: f64,
    pub control_mean: f64,
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
    pub confidence: f64,
}

impl ProportionDifferenceCi {
    pub fn difference(&self) -> f64 {
        self.treatment_mean - self.control_mean
    }
}

/// Two-sided standard normal quantile for a confidence level
pub fn z_score(confidence: f64) -> Result<f64, AnalysisError> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(AnalysisError::InvalidConfidence(confidence));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    Ok(normal.inverse_cdf((1.0 + confidence) / 2.0))
}

/// Sample mean and unbiased (n − 1) variance of a binary sample
fn mean_and_variance(sample: &[bool], label: &str) -> Result<(f64, f64), AnalysisError> {
    let n = sample.len();
    if n < 2 {
        return Err(AnalysisError::InsufficientSample {
            label: label.to_string(),
            size: n,
        });
    }

    let n = n as f64;
    let mean = sample.iter().filter(|&&x| x).count() as f64 / n;
    let variance = sample
        .iter()
        .map(|&x| {
            let d = f64::from(u8::from(x)) - mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1.0);
    Ok((mean, variance))
}

/// Confidence interval for mean(treatment) − mean(control)
///
/// Errors name the samples "treatment" and "control"; use
/// [`labelled_difference_ci`] to report the real group labels.
pub fn proportion_difference_ci(
    treatment: &[bool],
    control: &[bool],
    confidence: f64,
) -> Result<ProportionDifferenceCi, AnalysisError> {
    labelled_difference_ci(treatment, control, confidence, ["treatment", "control"])
}

/// Confidence interval for mean(treatment) − mean(control)
///
/// # Arguments
/// * `treatment`, `control` - Binary outcomes of each arm
/// * `confidence` - Two-sided level, strictly between 0 and 1
/// * `labels` - (treatment, control) names used in error messages
///
/// # Returns
/// * Means, bounds and margin `z * sqrt(var_t / n_t + var_c / n_c)`
pub fn labelled_difference_ci(
    treatment: &[bool],
    control: &[bool],
    confidence: f64,
    labels: [&str; 2],
) -> Result<ProportionDifferenceCi, AnalysisError> {
    let z = z_score(confidence)?;
    let [treatment_label, control_label] = labels;
    let (treatment_mean, treatment_var) = mean_and_variance(treatment, treatment_label)?;
    let (control_mean, control_var) = mean_and_variance(control, control_label)?;

    // Unpooled standard error of the difference
    let standard_error =
        (treatment_var / treatment.len() as f64 + control_var / control.len() as f64).sqrt();
    if standard_error == 0.0 {
        return Err(AnalysisError::ZeroVariance);
    }

    let margin = z * standard_error;
    let difference = treatment_mean - control_mean;

    Ok(ProportionDifferenceCi {
        treatment_mean,
        control_mean,
        lower: difference - margin,
        upper: difference + margin,
        margin,
        confidence,
    })
}

/// Confidence interval for the two configured arms of a prepared dataset
pub fn confidence_interval(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    arms: &ArmLabels,
    confidence: f64,
) -> crate::Result<ProportionDifferenceCi> {
    let treatment = data.outcomes(group_field, outcome_field, &arms.treatment)?;
    let control = data.outcomes(group_field, outcome_field, &arms.control)?;

    labelled_difference_ci(&treatment, &control, confidence, arms.as_pair()).with_context(|| {
        format!(
            "confidence interval for `{}` ({} users) vs `{}` ({} users)",
            arms.treatment,
            treatment.len(),
            arms.control,
            control.len()
        )
    })
}
