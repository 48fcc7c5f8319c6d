//! Segmentation by time of exposure and ad-fatigue aggregation

use crate::data::{
    day_name, f64_values, i64_values, parse_day, string_values, u64_values, PreparedData,
    HOURS_PER_DAY, MOST_ADS_DAY, MOST_ADS_HOUR, TOTAL_ADS,
};
use crate::error::AnalysisError;
use chrono::Weekday;
use ndarray::Array2;
use polars::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Time dimension a conversion table can be segmented by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentField {
    DayOfWeek,
    HourOfDay,
}

impl SegmentField {
    pub fn column(self) -> &'static str {
        match self {
            SegmentField::DayOfWeek => MOST_ADS_DAY,
            SegmentField::HourOfDay => MOST_ADS_HOUR,
        }
    }

    /// Singular noun used in the report, e.g. "day"
    pub fn noun(self) -> &'static str {
        match self {
            SegmentField::DayOfWeek => "day",
            SegmentField::HourOfDay => "hour",
        }
    }

    fn parse_key(self, raw: &str) -> Result<SegmentKey, AnalysisError> {
        match self {
            SegmentField::DayOfWeek => parse_day(raw).map(SegmentKey::Day),
            SegmentField::HourOfDay => raw
                .parse::<u8>()
                .ok()
                .filter(|h| usize::from(*h) < HOURS_PER_DAY)
                .map(SegmentKey::Hour)
                .ok_or_else(|| AnalysisError::InvalidHour(raw.to_string())),
        }
    }
}

impl FromStr for SegmentField {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            MOST_ADS_DAY => Ok(SegmentField::DayOfWeek),
            MOST_ADS_HOUR => Ok(SegmentField::HourOfDay),
            other => Err(AnalysisError::UnsupportedSegmentField(other.to_string())),
        }
    }
}

/// One segment value: a weekday or an hour of the day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKey {
    Day(Weekday),
    Hour(u8),
}

impl SegmentKey {
    fn rank(self) -> u32 {
        match self {
            SegmentKey::Day(day) => day.num_days_from_monday(),
            SegmentKey::Hour(hour) => 7 + u32::from(hour),
        }
    }
}

impl Ord for SegmentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for SegmentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKey::Day(day) => f.write_str(day_name(*day)),
            SegmentKey::Hour(hour) => write!(f, "{hour}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentCell {
    pub rate: f64,
    pub count: u64,
}

/// Mean outcome per (group, segment) with groups as rows
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTable {
    pub field: SegmentField,
    pub groups: Vec<String>,
    pub segments: Vec<SegmentKey>,
    /// `None` where a group has no users in a segment
    pub cells: Array2<Option<SegmentCell>>,
}

/// Highest-converting segment of one group
#[derive(Debug, Clone, PartialEq)]
pub struct BestSegment {
    pub group: String,
    pub segment: SegmentKey,
    pub rate: f64,
}

impl SegmentTable {
    pub fn rate(&self, group: usize, segment: usize) -> Option<f64> {
        self.cells[[group, segment]].map(|cell| cell.rate)
    }

    /// Argmax of each group row; ties go to the earliest segment
    pub fn best_segments(&self) -> Vec<BestSegment> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, group)| {
                let mut best: Option<(usize, f64)> = None;
                for j in 0..self.segments.len() {
                    if let Some(rate) = self.rate(i, j) {
                        if best.map_or(true, |(_, top)| rate > top) {
                            best = Some((j, rate));
                        }
                    }
                }
                best.map(|(j, rate)| BestSegment {
                    group: group.clone(),
                    segment: self.segments[j],
                    rate,
                })
            })
            .collect()
    }
}

/// Conversion rate for every (group, segment value) pair
///
/// Users without a value for the segment field are left out. When
/// `min_count` is non-zero, cells with `count <= min_count` are dropped.
pub fn segmentation_analysis(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    field: SegmentField,
    min_count: usize,
) -> crate::Result<SegmentTable> {
    let segment_col = field.column();
    let df = data
        .frame()
        .clone()
        .lazy()
        .filter(col(segment_col).is_not_null())
        .group_by([
            col(group_field).cast(DataType::String),
            col(segment_col).cast(DataType::String),
        ])
        .agg([
            col(outcome_field).cast(DataType::Float64).mean().alias("rate"),
            len().alias("count"),
        ])
        .collect()?;

    let group_values = string_values(&df, group_field)?;
    let segment_values = string_values(&df, segment_col)?
        .iter()
        .map(|raw| field.parse_key(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let rates = f64_values(&df, "rate")?;
    let counts = u64_values(&df, "count")?;

    let mut groups = group_values.clone();
    groups.sort();
    groups.dedup();
    let mut segments = segment_values.clone();
    segments.sort();
    segments.dedup();

    // Day labels are canonical after preparation, so each pair occurs once
    let mut cells = Array2::from_elem((groups.len(), segments.len()), None);
    let rows = group_values.iter().zip(&segment_values).zip(rates.into_iter().zip(counts));
    for ((group, segment), (rate, count)) in rows {
        if min_count > 0 && count <= min_count as u64 {
            continue;
        }
        let i = groups.binary_search(group).unwrap_or_default();
        let j = segments.binary_search(segment).unwrap_or_default();
        cells[[i, j]] = Some(SegmentCell { rate, count });
    }

    debug!(field = field.column(), groups = groups.len(), segments = segments.len(), "segmentation table");
    Ok(SegmentTable {
        field,
        groups,
        segments,
        cells,
    })
}

/// Conversion statistics of users who saw the same number of ads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FatigueBucket {
    pub total_ads: i64,
    pub rate: f64,
    pub count: u64,
}

/// Reliable exposure-count buckets of the treatment group, ascending by ads seen
#[derive(Debug, Clone, PartialEq)]
pub struct FatigueAnalysis {
    pub buckets: Vec<FatigueBucket>,
    pub min_count: usize,
}

impl FatigueAnalysis {
    /// Bucket with the highest rate; the smallest ad count wins a tie
    pub fn optimum(&self) -> Result<FatigueBucket, AnalysisError> {
        let mut best: Option<FatigueBucket> = None;
        for bucket in &self.buckets {
            if best.map_or(true, |top| bucket.rate > top.rate) {
                best = Some(*bucket);
            }
        }
        best.ok_or(AnalysisError::NoReliableBuckets(self.min_count))
    }
}

/// Conversion rate by number of ads seen, treatment group only
///
/// Buckets with `count <= min_count` are discarded.
pub fn ad_fatigue_analysis(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    treatment_label: &str,
    min_count: usize,
) -> crate::Result<FatigueAnalysis> {
    let df = data
        .frame()
        .clone()
        .lazy()
        .filter(col(group_field).cast(DataType::String).eq(lit(treatment_label)))
        .group_by([col(TOTAL_ADS)])
        .agg([
            col(outcome_field).cast(DataType::Float64).mean().alias("rate"),
            len().alias("count"),
        ])
        .filter(col("count").gt(lit(min_count as u64)))
        .sort_by_exprs([col(TOTAL_ADS)], SortMultipleOptions::default())
        .collect()?;

    let ads = i64_values(&df, TOTAL_ADS)?;
    let rates = f64_values(&df, "rate")?;
    let counts = u64_values(&df, "count")?;

    let buckets: Vec<FatigueBucket> = ads
        .into_iter()
        .zip(rates.into_iter().zip(counts))
        .map(|(total_ads, (rate, count))| FatigueBucket {
            total_ads,
            rate,
            count,
        })
        .collect();

    debug!(retained = buckets.len(), min_count, "ad fatigue buckets");
    Ok(FatigueAnalysis { buckets, min_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArmLabels, PeakHours};
    use crate::data::{fixtures, CONVERTED, TEST_GROUP};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_segment_field_parsing() {
        assert_eq!("most ads day".parse::<SegmentField>().unwrap(), SegmentField::DayOfWeek);
        assert_eq!("most ads hour".parse::<SegmentField>().unwrap(), SegmentField::HourOfDay);
        assert_eq!(
            "total ads".parse::<SegmentField>(),
            Err(AnalysisError::UnsupportedSegmentField("total ads".into()))
        );
    }

    #[test]
    fn test_segment_keys_sort_naturally() {
        let mut days = vec![
            SegmentKey::Day(Weekday::Sun),
            SegmentKey::Day(Weekday::Mon),
            SegmentKey::Day(Weekday::Fri),
        ];
        days.sort();
        assert_eq!(
            days.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["Monday", "Friday", "Sunday"]
        );

        let mut hours = vec![SegmentKey::Hour(10), SegmentKey::Hour(2)];
        hours.sort();
        assert_eq!(hours, vec![SegmentKey::Hour(2), SegmentKey::Hour(10)]);
    }

    #[test]
    fn test_day_segmentation() {
        // 14 users per arm: each weekday twice, the first 7 treatment users convert
        let data = fixtures::prepared(14, 7, 0);
        let table = segmentation_analysis(&data, TEST_GROUP, CONVERTED, SegmentField::DayOfWeek, 0).unwrap();

        assert_eq!(table.groups, vec!["ad", "psa"]);
        assert_eq!(table.segments.len(), 7);
        assert_eq!(table.segments[0], SegmentKey::Day(Weekday::Mon));
        for j in 0..7 {
            assert_abs_diff_eq!(table.rate(0, j).unwrap(), 0.5, epsilon = 1e-12);
            assert_eq!(table.rate(1, j), Some(0.0));
        }

        // Every segment ties, so the first one wins
        let best = table.best_segments();
        assert_eq!(best[0].segment, SegmentKey::Day(Weekday::Mon));
        assert_eq!(best[1].group, "psa");
    }

    #[test]
    fn test_day_spellings_share_one_segment() {
        let data = PreparedData::from_frame(
            fixtures::mixed_day_frame(),
            &ArmLabels::default(),
            PeakHours::default(),
        )
        .unwrap();
        let table = segmentation_analysis(&data, TEST_GROUP, CONVERTED, SegmentField::DayOfWeek, 0).unwrap();

        assert_eq!(
            table.segments,
            vec![SegmentKey::Day(Weekday::Mon), SegmentKey::Day(Weekday::Sat)]
        );
        let saturday = table.cells[[0, 1]].unwrap();
        assert_eq!(saturday.count, 4);
        assert_abs_diff_eq!(saturday.rate, 0.5, epsilon = 1e-12);
        assert_eq!(table.cells[[1, 0]].unwrap().count, 2);
        assert_eq!(table.rate(0, 0), None);
    }

    #[test]
    fn test_hour_segmentation_best_is_strict_max() {
        // Users 0..3 convert in the treatment arm, hours 0..23 cycle
        let data = fixtures::prepared(24, 3, 0);
        let table = segmentation_analysis(&data, TEST_GROUP, CONVERTED, SegmentField::HourOfDay, 0).unwrap();

        assert_eq!(table.segments.len(), 24);
        assert_eq!(table.segments[23], SegmentKey::Hour(23));
        let best = table.best_segments();
        assert_eq!(best[0].segment, SegmentKey::Hour(0));
        assert_eq!(best[0].rate, 1.0);
    }

    #[test]
    fn test_segmentation_min_count_drops_small_cells() {
        let data = fixtures::prepared(14, 7, 0);
        let table = segmentation_analysis(&data, TEST_GROUP, CONVERTED, SegmentField::DayOfWeek, 2).unwrap();
        assert!(table.cells.iter().all(Option::is_none));
        assert!(table.best_segments().is_empty());
    }

    #[test]
    fn test_ad_fatigue_filters_and_picks_optimum() {
        // 330 treatment users spread evenly over 1..=3 ads, 110 each
        let data = fixtures::prepared(330, 165, 0);
        let analysis = ad_fatigue_analysis(&data, TEST_GROUP, CONVERTED, "ad", 100).unwrap();

        assert_eq!(analysis.buckets.len(), 3);
        assert!(analysis.buckets.iter().all(|b| b.count > 100));
        assert_eq!(
            analysis.buckets.iter().map(|b| b.total_ads).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let optimum = analysis.optimum().unwrap();
        let max_rate = analysis.buckets.iter().map(|b| b.rate).fold(f64::MIN, f64::max);
        assert_eq!(optimum.rate, max_rate);

        let strict = ad_fatigue_analysis(&data, TEST_GROUP, CONVERTED, "ad", 110).unwrap();
        assert!(strict.buckets.is_empty());
        assert_eq!(strict.optimum(), Err(AnalysisError::NoReliableBuckets(110)));
    }

    #[test]
    fn test_fatigue_optimum_tie_prefers_fewest_ads() {
        let analysis = FatigueAnalysis {
            buckets: vec![
                FatigueBucket {
                    total_ads: 2,
                    rate: 0.04,
                    count: 150,
                },
                FatigueBucket {
                    total_ads: 5,
                    rate: 0.07,
                    count: 120,
                },
                FatigueBucket {
                    total_ads: 9,
                    rate: 0.07,
                    count: 300,
                },
            ],
            min_count: 100,
        };
        assert_eq!(analysis.optimum().unwrap().total_ads, 5);
    }
}
