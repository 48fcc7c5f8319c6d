//! Data loading, type coercion and feature derivation using Polars

use crate::config::{ArmLabels, PeakHours};
use crate::error::AnalysisError;
use anyhow::Context;
use chrono::Weekday;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

pub const USER_ID: &str = "user id";
pub const TEST_GROUP: &str = "test group";
pub const CONVERTED: &str = "converted";
pub const TOTAL_ADS: &str = "total ads";
pub const MOST_ADS_DAY: &str = "most ads day";
pub const MOST_ADS_HOUR: &str = "most ads hour";
pub const PEAK_HOUR_ADS: &str = "peak_hour_ads";
pub const WEEKEND_ADS: &str = "weekend_ads";

/// Columns the input file must provide
pub const REQUIRED_COLUMNS: [&str; 6] = [
    USER_ID,
    TEST_GROUP,
    CONVERTED,
    TOTAL_ADS,
    MOST_ADS_DAY,
    MOST_ADS_HOUR,
];

/// Day labels in calendar order, Monday first
pub const DAYS_ORDER: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub const HOURS_PER_DAY: usize = 24;

/// Parse a day-of-week label such as "Monday" or "mon"
pub fn parse_day(label: &str) -> Result<Weekday, AnalysisError> {
    label
        .trim()
        .parse::<Weekday>()
        .map_err(|_| AnalysisError::UnknownDay(label.to_string()))
}

/// Full English name of a weekday
pub fn day_name(day: Weekday) -> &'static str {
    DAYS_ORDER[day.num_days_from_monday() as usize]
}

/// Mean outcome rate of one group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRate {
    pub label: String,
    pub rate: f64,
    pub count: u64,
}

/// Conversion rate of the users in one group who saw exactly `total_ads` ads
#[derive(Debug, Clone, PartialEq)]
pub struct AdsRatePoint {
    pub group: String,
    pub total_ads: i64,
    pub rate: f64,
    pub count: u64,
}

/// Users per (day, hour) cell, days Monday..Sunday; `None` marks an empty cell
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapGrid {
    pub cells: [[Option<u64>; HOURS_PER_DAY]; 7],
}

impl HeatmapGrid {
    pub fn max_count(&self) -> u64 {
        self.cells
            .iter()
            .flatten()
            .filter_map(|c| *c)
            .max()
            .unwrap_or(0)
    }

    /// Whether any user of the group had this day as their peak day
    pub fn has_day(&self, day: usize) -> bool {
        self.cells[day].iter().any(Option::is_some)
    }
}

/// Running conversions and rate of one group, users ordered by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CumulativeSeries {
    pub label: String,
    pub conversions: Vec<u64>,
    pub rates: Vec<f64>,
}

impl CumulativeSeries {
    pub fn users(&self) -> usize {
        self.conversions.len()
    }
}

/// Cleaned dataset with derived features, immutable after preparation
#[derive(Debug, Clone)]
pub struct PreparedData {
    frame: DataFrame,
    arms: ArmLabels,
}

/// Load the CSV file into a DataFrame without any coercion
pub fn load_data(file_path: &Path) -> crate::Result<DataFrame> {
    std::fs::metadata(file_path)
        .with_context(|| format!("cannot read input file {}", file_path.display()))?;

    let df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .finish()
        .and_then(LazyFrame::collect)
        .with_context(|| format!("failed to parse CSV file {}", file_path.display()))?;

    info!(rows = df.height(), columns = df.width(), "data loaded");
    Ok(df)
}

/// Fail with every expected column the frame lacks
pub fn check_columns(df: &DataFrame) -> Result<(), AnalysisError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| df.column(name).is_err())
        .map(|name| (*name).to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::MissingColumns(missing))
    }
}

/// Coerce raw columns to their analysis types
///
/// The outcome and counters are cast strictly; an unparseable hour becomes null.
pub fn clean_data(lf: LazyFrame) -> LazyFrame {
    lf.with_columns([
        col(USER_ID).strict_cast(DataType::Int64),
        col(TEST_GROUP).cast(DataType::String),
        col(CONVERTED).strict_cast(DataType::Boolean),
        col(TOTAL_ADS).strict_cast(DataType::Int64),
        col(MOST_ADS_DAY).cast(DataType::String),
        col(MOST_ADS_HOUR).cast(DataType::Int64),
    ])
}

/// Derive the peak-hour and weekend exposure flags
pub fn create_features(lf: LazyFrame, peak_hours: PeakHours) -> LazyFrame {
    lf.with_columns([
        // Users without a peak hour are outside the window
        peak_hours
            .window(col(MOST_ADS_HOUR))
            .fill_null(lit(false))
            .alias(PEAK_HOUR_ADS),
        // Day labels are canonical by now, see `normalize_days`
        col(MOST_ADS_DAY)
            .eq(lit("Saturday"))
            .or(col(MOST_ADS_DAY).eq(lit("Sunday")))
            .fill_null(lit(false))
            .alias(WEEKEND_ADS),
    ])
}

/// Rewrite every day label to its full English name
///
/// Any form `parse_day` accepts ("sat", "saturday", "Saturday") maps to the
/// same label, so grouping and the weekend flag see one value per weekday.
///
/// # Returns
/// * `UnknownDay` for the first label that names no weekday
pub fn normalize_days(df: &mut DataFrame) -> crate::Result<()> {
    let days = df
        .column(MOST_ADS_DAY)?
        .str()?
        .into_iter()
        .map(|label| label.map(|l| parse_day(l).map(day_name)).transpose())
        .collect::<Result<Vec<Option<&'static str>>, AnalysisError>>()?;
    df.with_column(Series::new(MOST_ADS_DAY.into(), days))?;
    Ok(())
}

/// Load, clean and validate the dataset at `file_path`
///
/// # Arguments
/// * `file_path` - Path to the CSV export
/// * `arms` - Treatment and control labels the `test group` column must hold
/// * `peak_hours` - Inclusive hour window for the `peak_hour_ads` flag
///
/// # Returns
/// * `PreparedData` with typed columns and both derived flags
pub fn prepare_data(
    file_path: &Path,
    arms: &ArmLabels,
    peak_hours: PeakHours,
) -> crate::Result<PreparedData> {
    let raw = load_data(file_path)?;
    debug!(columns = ?raw.get_column_names(), "raw columns");
    PreparedData::from_frame(raw, arms, peak_hours)
        .with_context(|| format!("failed to prepare data from {}", file_path.display()))
}

impl PreparedData {
    /// Run cleaning, feature derivation and validation on an in-memory frame
    pub fn from_frame(raw: DataFrame, arms: &ArmLabels, peak_hours: PeakHours) -> crate::Result<Self> {
        check_columns(&raw)?;

        // Step 1: coerce column types
        let mut cleaned = clean_data(raw.lazy())
            .collect()
            .context("failed to coerce column types")?;

        // Step 2: canonical day names before anything groups on them
        normalize_days(&mut cleaned)?;

        // Step 3: derive the exposure flags
        let frame = create_features(cleaned.lazy(), peak_hours)
            .collect()
            .context("failed to derive features")?;

        let prepared = Self {
            frame,
            arms: arms.clone(),
        };
        prepared.validate()?;

        info!(
            rows = prepared.height(),
            treatment = %arms.treatment,
            control = %arms.control,
            "data prepared"
        );
        Ok(prepared)
    }

    fn validate(&self) -> crate::Result<()> {
        // Nullable day and hour columns are excluded from this check
        for name in [USER_ID, TEST_GROUP, CONVERTED, TOTAL_ADS] {
            let count = self.frame.column(name)?.null_count();
            if count > 0 {
                return Err(AnalysisError::NullValues {
                    column: name.to_string(),
                    count,
                }
                .into());
            }
        }

        let rows = self.height();
        let unique = self
            .frame
            .column(USER_ID)?
            .as_materialized_series()
            .n_unique()?;
        if unique != rows {
            return Err(AnalysisError::DuplicateUserIds { unique, rows }.into());
        }

        let found = self.unique_labels(TEST_GROUP)?;
        debug!(groups = ?found, "unique values in `{}`", TEST_GROUP);
        let expected: BTreeSet<String> = self.arms.as_pair().iter().map(|s| s.to_string()).collect();
        if found != expected {
            return Err(AnalysisError::UnexpectedGroups {
                expected: join(&expected),
                found: join(&found),
            }
            .into());
        }

        let hours = self.frame.column(MOST_ADS_HOUR)?.i64()?;
        if let Some(hour) = hours.into_iter().flatten().find(|h| !(0..24).contains(h)) {
            return Err(AnalysisError::InvalidHour(hour.to_string()).into());
        }

        Ok(())
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Total number of users
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Distinct non-null values of a column, rendered as strings
    pub fn unique_labels(&self, field: &str) -> crate::Result<BTreeSet<String>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .select([col(field).cast(DataType::String)])
            .collect()?;
        let labels = df.column(field)?.str()?.into_iter().flatten().map(str::to_string).collect();
        Ok(labels)
    }

    pub fn group_size(&self, label: &str) -> crate::Result<usize> {
        Ok(self
            .frame
            .column(TEST_GROUP)?
            .str()?
            .into_iter()
            .filter(|value| *value == Some(label))
            .count())
    }

    /// Outcome sequence of every user whose `group_field` equals `label`
    pub fn outcomes(&self, group_field: &str, outcome_field: &str, label: &str) -> crate::Result<Vec<bool>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(col(group_field).cast(DataType::String).eq(lit(label)))
            .select([col(outcome_field).strict_cast(DataType::Boolean)])
            .collect()?;
        let outcomes = df.column(outcome_field)?.bool()?.into_no_null_iter().collect();
        Ok(outcomes)
    }

    /// Mean outcome per group, sorted by group label
    pub fn group_rates(&self, group_field: &str, outcome_field: &str) -> crate::Result<Vec<GroupRate>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .group_by([col(group_field).cast(DataType::String)])
            .agg([
                col(outcome_field).cast(DataType::Float64).mean().alias("rate"),
                len().alias("count"),
            ])
            .sort_by_exprs([col(group_field)], SortMultipleOptions::default())
            .collect()?;

        let labels = string_values(&df, group_field)?;
        let rates = f64_values(&df, "rate")?;
        let counts = u64_values(&df, "count")?;

        Ok(labels
            .into_iter()
            .zip(rates)
            .zip(counts)
            .map(|((label, rate), count)| GroupRate { label, rate, count })
            .collect())
    }

    /// Total ads seen by each user, per arm in (treatment, control) order
    pub fn ads_by_group(&self) -> crate::Result<Vec<(String, Vec<i64>)>> {
        self.arms
            .as_pair()
            .into_iter()
            .map(|label| -> crate::Result<(String, Vec<i64>)> {
                let df = self
                    .frame
                    .clone()
                    .lazy()
                    .filter(col(TEST_GROUP).eq(lit(label)))
                    .select([col(TOTAL_ADS)])
                    .collect()?;
                Ok((label.to_string(), i64_values(&df, TOTAL_ADS)?))
            })
            .collect()
    }

    /// Conversion rate per (total ads, group) pair, capped at `max_ads`
    pub fn rate_by_ads_and_group(
        &self,
        group_field: &str,
        outcome_field: &str,
        max_ads: i64,
    ) -> crate::Result<Vec<AdsRatePoint>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(col(TOTAL_ADS).lt_eq(lit(max_ads)))
            .group_by([col(TOTAL_ADS), col(group_field).cast(DataType::String)])
            .agg([
                col(outcome_field).cast(DataType::Float64).mean().alias("rate"),
                len().alias("count"),
            ])
            .sort_by_exprs([col(TOTAL_ADS), col(group_field)], SortMultipleOptions::default())
            .collect()?;

        let ads = i64_values(&df, TOTAL_ADS)?;
        let groups = string_values(&df, group_field)?;
        let rates = f64_values(&df, "rate")?;
        let counts = u64_values(&df, "count")?;

        Ok(groups
            .into_iter()
            .zip(ads)
            .zip(rates.into_iter().zip(counts))
            .map(|((group, total_ads), (rate, count))| AdsRatePoint {
                group,
                total_ads,
                rate,
                count,
            })
            .collect())
    }

    /// Users per peak (day, hour) for one group
    pub fn heatmap_counts(&self, label: &str) -> crate::Result<HeatmapGrid> {
        let df = self
            .frame
            .clone()
            .lazy()
            .filter(
                col(TEST_GROUP)
                    .eq(lit(label))
                    .and(col(MOST_ADS_DAY).is_not_null())
                    .and(col(MOST_ADS_HOUR).is_not_null()),
            )
            .group_by([col(MOST_ADS_DAY), col(MOST_ADS_HOUR)])
            .agg([col(USER_ID).count().alias("count")])
            .collect()?;

        let days = string_values(&df, MOST_ADS_DAY)?;
        let hours = i64_values(&df, MOST_ADS_HOUR)?;
        let counts = u64_values(&df, "count")?;

        let mut grid = HeatmapGrid {
            cells: [[None; HOURS_PER_DAY]; 7],
        };
        for ((day, hour), count) in days.iter().zip(hours).zip(counts) {
            let row = parse_day(day)?.num_days_from_monday() as usize;
            match usize::try_from(hour) {
                Ok(h) if h < HOURS_PER_DAY => grid.cells[row][h] = Some(count),
                _ => warn!(hour, "skipping out-of-range hour in heatmap"),
            }
        }
        Ok(grid)
    }

    /// Running conversions per group with users ordered by id
    ///
    /// Groups appear in order of their first user.
    pub fn cumulative_by_group(
        &self,
        group_field: &str,
        outcome_field: &str,
    ) -> crate::Result<Vec<CumulativeSeries>> {
        let df = self
            .frame
            .clone()
            .lazy()
            .sort_by_exprs([col(USER_ID)], SortMultipleOptions::default())
            .select([
                col(group_field).cast(DataType::String),
                col(outcome_field).strict_cast(DataType::Boolean),
            ])
            .collect()?;

        let groups = string_values(&df, group_field)?;
        let outcomes = df.column(outcome_field)?.bool()?;

        let mut series: Vec<CumulativeSeries> = Vec::new();
        for (group, converted) in groups.into_iter().zip(outcomes.into_no_null_iter()) {
            let idx = match series.iter().position(|s| s.label == group) {
                Some(idx) => idx,
                None => {
                    series.push(CumulativeSeries {
                        label: group,
                        ..CumulativeSeries::default()
                    });
                    series.len() - 1
                }
            };
            let entry = &mut series[idx];
            let total = entry.conversions.last().copied().unwrap_or(0) + u64::from(converted);
            entry.conversions.push(total);
            entry.rates.push(total as f64 / entry.conversions.len() as f64);
        }
        Ok(series)
    }

    /// Fraction of users whose peak exposure hour falls inside the peak window
    pub fn peak_hour_share(&self) -> crate::Result<f64> {
        self.flag_share(PEAK_HOUR_ADS)
    }

    /// Fraction of users whose peak exposure day is Saturday or Sunday
    pub fn weekend_share(&self) -> crate::Result<f64> {
        self.flag_share(WEEKEND_ADS)
    }

    fn flag_share(&self, name: &str) -> crate::Result<f64> {
        let flags = self.frame.column(name)?.bool()?;
        let set = flags.into_no_null_iter().filter(|&flag| flag).count();
        Ok(set as f64 / self.height().max(1) as f64)
    }
}

fn join(labels: &BTreeSet<String>) -> String {
    labels.iter().cloned().collect::<Vec<_>>().join(", ")
}

pub(crate) fn string_values(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    let values = column
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string).ok_or_else(|| null_error(name)))
        .collect();
    values
}

pub(crate) fn i64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<i64>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    let values = column
        .i64()?
        .into_iter()
        .map(|value| value.ok_or_else(|| null_error(name)))
        .collect();
    values
}

pub(crate) fn u64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<u64>> {
    let column = df.column(name)?.cast(&DataType::UInt64)?;
    let values = column
        .u64()?
        .into_iter()
        .map(|value| value.ok_or_else(|| null_error(name)))
        .collect();
    values
}

pub(crate) fn f64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column
        .f64()?
        .into_iter()
        .map(|value| value.ok_or_else(|| null_error(name)))
        .collect();
    values
}

fn null_error(name: &str) -> anyhow::Error {
    AnalysisError::NullValues {
        column: name.to_string(),
        count: 1,
    }
    .into()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Two-arm frame with `n` users per arm and the given number of conversions
    ///
    /// Users alternate between arms; ads cycle through 1..=3, days through the
    /// week and hours through the day.
    pub fn two_arm_frame(n: usize, treatment_conversions: usize, control_conversions: usize) -> DataFrame {
        let mut ids = Vec::with_capacity(2 * n);
        let mut groups = Vec::with_capacity(2 * n);
        let mut converted = Vec::with_capacity(2 * n);
        let mut ads = Vec::with_capacity(2 * n);
        let mut days = Vec::with_capacity(2 * n);
        let mut hours = Vec::with_capacity(2 * n);

        for i in 0..n {
            for (offset, label, conversions) in [(0, "ad", treatment_conversions), (1, "psa", control_conversions)] {
                ids.push((2 * i + offset) as i64 + 1000);
                groups.push(label);
                converted.push(i < conversions);
                ads.push((i % 3) as i64 + 1);
                days.push(DAYS_ORDER[i % 7]);
                hours.push(Some((i % HOURS_PER_DAY) as i64));
            }
        }

        df!(
            USER_ID => ids,
            TEST_GROUP => groups,
            CONVERTED => converted,
            TOTAL_ADS => ads,
            MOST_ADS_DAY => days,
            MOST_ADS_HOUR => hours,
        )
        .unwrap()
    }

    /// Four treatment users peaking on Saturday under different spellings,
    /// two of them converted, and two control users on Monday
    pub fn mixed_day_frame() -> DataFrame {
        df!(
            USER_ID => [1i64, 2, 3, 4, 5, 6],
            TEST_GROUP => ["ad", "ad", "ad", "ad", "psa", "psa"],
            CONVERTED => [true, false, true, false, false, true],
            TOTAL_ADS => [3i64, 5, 7, 9, 2, 4],
            MOST_ADS_DAY => ["Saturday", "saturday", "Sat", "Saturday", "Monday", "mon"],
            MOST_ADS_HOUR => [Some(10i64), Some(11), Some(12), Some(13), Some(14), Some(15)],
        )
        .unwrap()
    }

    pub fn prepared(n: usize, treatment_conversions: usize, control_conversions: usize) -> PreparedData {
        PreparedData::from_frame(
            two_arm_frame(n, treatment_conversions, control_conversions),
            &ArmLabels::default(),
            PeakHours::default(),
        )
        .unwrap()
    }
}
