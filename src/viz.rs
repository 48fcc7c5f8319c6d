//! Chart rendering using Plotters
//!
//! Every chart is a plain data struct built by a pure function of the prepared
//! data or an analysis result. Drawing happens only in [`Figure::save`], on a
//! backend owned by that call.

use crate::analysis::{FatigueAnalysis, FatigueBucket, SegmentField, SegmentKey, SegmentTable};
use crate::data::{AdsRatePoint, CumulativeSeries, HeatmapGrid, PreparedData, DAYS_ORDER, HOURS_PER_DAY};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::path::{Path, PathBuf};
use tracing::info;

/// Color palette for groups and segments
const PALETTE: [RGBColor; 7] = [
    RGBColor(76, 114, 176),
    RGBColor(221, 132, 82),
    RGBColor(85, 168, 104),
    RGBColor(196, 78, 82),
    RGBColor(129, 114, 179),
    RGBColor(147, 120, 96),
    RGBColor(218, 139, 195),
];

const MAX_LINE_POINTS: usize = 2_000;
const HISTOGRAM_BINS: usize = 40;

fn palette(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

fn percent_label(decimals: usize) -> impl Fn(&f64) -> String {
    move |y| format!("{:.*}%", decimals, y * 100.0)
}

/// Headroom above the largest plotted rate
fn rate_axis_max(max_rate: f64, headroom: f64) -> f64 {
    if max_rate > 0.0 {
        max_rate * headroom
    } else {
        1.0
    }
}

/// A self-contained chart that can be rendered to a PNG file
pub trait Figure {
    /// File stem of the rendered image
    fn name(&self) -> &'static str;

    fn size(&self) -> (u32, u32) {
        (1200, 600)
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()>;

    /// Render into `<dir>/<name>.png` and return the written path
    fn save(&self, dir: &Path) -> crate::Result<PathBuf> {
        let path = dir.join(format!("{}.png", self.name()));
        {
            let root = BitMapBackend::new(&path, self.size()).into_drawing_area();
            root.fill(&WHITE)?;
            self.draw(&root)?;
            root.present()?;
        }
        info!(path = %path.display(), "figure saved");
        Ok(path)
    }
}

/// Bar chart of the overall conversion rate per group
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRatesChart {
    pub bars: Vec<(String, f64)>,
}

pub fn conversion_rates_chart(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
) -> crate::Result<ConversionRatesChart> {
    let bars = data
        .group_rates(group_field, outcome_field)?
        .into_iter()
        .map(|r| (r.label, r.rate))
        .collect();
    Ok(ConversionRatesChart { bars })
}

impl Figure for ConversionRatesChart {
    fn name(&self) -> &'static str {
        "conversion_rates"
    }

    fn size(&self) -> (u32, u32) {
        (1000, 600)
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let n = self.bars.len();
        let max_rate = self.bars.iter().map(|(_, r)| *r).fold(0.0, f64::max);

        let mut chart = ChartBuilder::on(root)
            .caption(
                "Conversion Rates by Test Group",
                ("sans-serif", 30).into_font().style(FontStyle::Bold),
            )
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..rate_axis_max(max_rate, 1.2))?;

        let labels = &self.bars;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n)
            .x_label_formatter(&|x| match x {
                SegmentValue::CenterOf(i) => labels.get(*i).map(|(l, _)| l.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .y_label_formatter(&percent_label(0))
            .x_desc("Test Group")
            .y_desc("Conversion Rate")
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        chart.draw_series(self.bars.iter().enumerate().map(|(i, (_, rate))| {
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), *rate)],
                palette(i).filled(),
            );
            bar.set_margin(0, 0, 40, 40);
            bar
        }))?;

        let value_style = TextStyle::from(("sans-serif", 16).into_font().style(FontStyle::Bold))
            .pos(Pos::new(HPos::Center, VPos::Bottom));
        chart.draw_series(self.bars.iter().enumerate().map(|(i, (_, rate))| {
            Text::new(
                format!("{:.2}%", rate * 100.0),
                (SegmentValue::CenterOf(i), *rate),
                value_style.clone(),
            )
        }))?;

        Ok(())
    }
}

/// Log-binned density of ads seen by one group
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSeries {
    pub label: String,
    /// (lower edge, upper edge, density per log10 unit)
    pub bins: Vec<(f64, f64, f64)>,
    pub median: f64,
    pub p90: f64,
}

/// Histogram of total ads seen, log-scaled, with median and 90th-percentile markers
#[derive(Debug, Clone, PartialEq)]
pub struct AdsDistributionChart {
    pub series: Vec<DistributionSeries>,
    pub x_range: (f64, f64),
}

/// Linear-interpolated quantile of an ascending slice
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

pub fn ads_distribution_chart(data: &PreparedData) -> crate::Result<AdsDistributionChart> {
    let groups = data.ads_by_group()?;

    // Zero ads cannot be placed on a log axis
    let positive: Vec<(String, Vec<f64>)> = groups
        .into_iter()
        .map(|(label, ads)| {
            let mut values: Vec<f64> = ads.into_iter().filter(|&a| a > 0).map(|a| a as f64).collect();
            values.sort_by(f64::total_cmp);
            (label, values)
        })
        .collect();

    let lo = positive
        .iter()
        .filter_map(|(_, v)| v.first().copied())
        .fold(f64::INFINITY, f64::min);
    let hi = positive
        .iter()
        .filter_map(|(_, v)| v.last().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if lo.is_finite() && hi > lo { (lo, hi) } else { (1.0, 10.0) };

    let (log_lo, log_hi) = (lo.log10(), hi.log10());
    let step = (log_hi - log_lo) / HISTOGRAM_BINS as f64;
    let edges: Vec<f64> = (0..=HISTOGRAM_BINS)
        .map(|k| 10f64.powf(log_lo + step * k as f64))
        .collect();

    let series = positive
        .into_iter()
        .map(|(label, values)| {
            let mut counts = vec![0usize; HISTOGRAM_BINS];
            for v in &values {
                let k = (((v.log10() - log_lo) / step).floor() as usize).min(HISTOGRAM_BINS - 1);
                counts[k] += 1;
            }
            let n = values.len().max(1) as f64;
            let bins = counts
                .iter()
                .enumerate()
                .map(|(k, &c)| (edges[k], edges[k + 1], c as f64 / (n * step)))
                .collect();
            DistributionSeries {
                label,
                bins,
                median: quantile(&values, 0.5).unwrap_or(lo),
                p90: quantile(&values, 0.9).unwrap_or(lo),
            }
        })
        .collect();

    Ok(AdsDistributionChart {
        series,
        x_range: (lo, hi),
    })
}

impl Figure for AdsDistributionChart {
    fn name(&self) -> &'static str {
        "ads_distribution"
    }

    fn size(&self) -> (u32, u32) {
        (1400, 800)
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let y_max = self
            .series
            .iter()
            .flat_map(|s| s.bins.iter().map(|b| b.2))
            .fold(0.0, f64::max)
            .max(1e-9)
            * 1.25;
        let (x_lo, x_hi) = self.x_range;

        let mut chart = ChartBuilder::on(root)
            .caption("Distribution of Total Ads Seen (Log Scale)", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d((x_lo..x_hi).log_scale(), 0f64..y_max)?;

        chart
            .configure_mesh()
            .x_desc("Number of Ads (Log Scale)")
            .y_desc("Density")
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        for (i, series) in self.series.iter().enumerate() {
            let color = palette(i);
            chart
                .draw_series(series.bins.iter().map(|&(lo, hi, density)| {
                    Rectangle::new([(lo, 0.0), (hi, density)], color.mix(0.45).filled())
                }))?
                .label(series.label.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));

            // Stagger the marker labels so the groups do not overlap
            let label_y = y_max * (0.9 - i as f64 * 0.1);
            for (value, width, text, anchor) in [
                (series.median, 2, format!("{} median: {:.0}", series.label, series.median), HPos::Right),
                (series.p90, 1, format!("{} 90th percentile: {:.0}", series.label, series.p90), HPos::Left),
            ] {
                chart.draw_series(LineSeries::new(
                    vec![(value, 0.0), (value, y_max)],
                    color.mix(0.8).stroke_width(width),
                ))?;
                chart.draw_series(std::iter::once(Text::new(
                    text,
                    (value, label_y),
                    TextStyle::from(("sans-serif", 14).into_font())
                        .color(&color)
                        .pos(Pos::new(anchor, VPos::Bottom)),
                )))?;
            }
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        Ok(())
    }
}

/// Conversion rate against ads seen, one point per (ads, group)
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionByAdsChart {
    pub groups: Vec<String>,
    pub points: Vec<AdsRatePoint>,
    pub max_ads: i64,
}

pub fn conversion_by_ads_chart(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
    max_ads: i64,
) -> crate::Result<ConversionByAdsChart> {
    let points = data.rate_by_ads_and_group(group_field, outcome_field, max_ads)?;
    let mut groups: Vec<String> = points.iter().map(|p| p.group.clone()).collect();
    groups.sort();
    groups.dedup();
    Ok(ConversionByAdsChart {
        groups,
        points,
        max_ads,
    })
}

/// Marker radius between 2 and 10 px, scaled by sample count
fn marker_radius(count: u64, max_count: u64) -> i32 {
    let scale = (count as f64 / max_count.max(1) as f64).sqrt();
    (2.0 + 8.0 * scale).round() as i32
}

impl Figure for ConversionByAdsChart {
    fn name(&self) -> &'static str {
        "conversion_by_ads"
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let max_rate = self.points.iter().map(|p| p.rate).fold(0.0, f64::max);
        let max_count = self.points.iter().map(|p| p.count).max().unwrap_or(1);

        let mut chart = ChartBuilder::on(root)
            .caption("Conversion Rate by Number of Ads Seen", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..self.max_ads as f64, 0f64..rate_axis_max(max_rate, 1.1))?;

        chart
            .configure_mesh()
            .x_desc("Number of Ads")
            .y_desc("Conversion Rate")
            .y_label_formatter(&percent_label(1))
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        for (i, group) in self.groups.iter().enumerate() {
            let color = palette(i);
            chart
                .draw_series(self.points.iter().filter(|p| &p.group == group).map(|p| {
                    Circle::new(
                        (p.total_ads as f64, p.rate),
                        marker_radius(p.count, max_count),
                        color.mix(0.7).filled(),
                    )
                }))?
                .label(group.clone())
                .legend(move |(x, y)| Circle::new((x + 5, y), 5, color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        Ok(())
    }
}

/// Users per peak day and hour for one group, days Monday to Sunday
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapChart {
    pub label: String,
    pub grid: HeatmapGrid,
}

pub fn heatmap_chart(data: &PreparedData, label: &str) -> crate::Result<HeatmapChart> {
    Ok(HeatmapChart {
        label: label.to_string(),
        grid: data.heatmap_counts(label)?,
    })
}

/// Yellow-green-blue sequential scale, `t` in [0, 1]
fn ylgnbu(t: f64) -> RGBColor {
    const STOPS: [(f64, f64, f64); 3] = [(255.0, 255.0, 217.0), (65.0, 182.0, 196.0), (8.0, 29.0, 88.0)];
    let t = t.clamp(0.0, 1.0) * 2.0;
    let (a, b, f) = if t <= 1.0 {
        (STOPS[0], STOPS[1], t)
    } else {
        (STOPS[1], STOPS[2], t - 1.0)
    };
    let mix = |x: f64, y: f64| (x + (y - x) * f).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

impl Figure for HeatmapChart {
    fn name(&self) -> &'static str {
        "ad_views_heatmap"
    }

    fn size(&self) -> (u32, u32) {
        (1400, 800)
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let max_count = self.grid.max_count().max(1) as f64;

        let mut chart = ChartBuilder::on(root)
            .caption("Heatmap of Ad Views by Day and Hour", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(110)
            .build_cartesian_2d((0..HOURS_PER_DAY).into_segmented(), (0..7usize).into_segmented())?;

        // Row 0 is drawn at the top
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(HOURS_PER_DAY)
            .y_labels(7)
            .x_label_formatter(&|x| match x {
                SegmentValue::CenterOf(h) if *h < HOURS_PER_DAY => h.to_string(),
                _ => String::new(),
            })
            .y_label_formatter(&|y| match y {
                SegmentValue::CenterOf(r) if *r < 7 => DAYS_ORDER[6 - r].to_string(),
                _ => String::new(),
            })
            .x_desc("Hour of Day")
            .y_desc(format!("Day of Week ({} users, max {})", self.label, max_count))
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        let cells: Vec<(usize, usize, u64)> = self
            .grid
            .cells
            .iter()
            .enumerate()
            .flat_map(|(day, row)| {
                row.iter()
                    .enumerate()
                    .filter_map(move |(hour, count)| count.map(|c| (day, hour, c)))
            })
            .collect();

        chart.draw_series(cells.iter().map(|&(day, hour, count)| {
            let y = 6 - day;
            Rectangle::new(
                [(SegmentValue::Exact(hour), SegmentValue::Exact(y)), (SegmentValue::Exact(hour + 1), SegmentValue::Exact(y + 1))],
                ylgnbu(count as f64 / max_count).filled(),
            )
        }))?;

        let annotation = TextStyle::from(("sans-serif", 11).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
        chart.draw_series(cells.iter().map(|&(day, hour, count)| {
            let style = if count as f64 / max_count > 0.6 {
                annotation.color(&WHITE)
            } else {
                annotation.color(&BLACK)
            };
            Text::new(count.to_string(), (SegmentValue::CenterOf(hour), SegmentValue::CenterOf(6 - day)), style)
        }))?;

        Ok(())
    }
}

/// Downsampled cumulative series of one group: (users, conversions, rate)
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeLine {
    pub label: String,
    pub points: Vec<(f64, f64, f64)>,
}

/// Cumulative conversions with the running conversion rate on a second axis
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeConversionsChart {
    pub lines: Vec<CumulativeLine>,
}

/// Keep at most `max` evenly spaced indices, always including the last one
fn sample_indices(len: usize, max: usize) -> Vec<usize> {
    if len <= max {
        return (0..len).collect();
    }
    let step = len.div_ceil(max);
    let mut indices: Vec<usize> = (0..len).step_by(step).collect();
    if indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}

fn cumulative_line(series: &CumulativeSeries) -> CumulativeLine {
    let points = sample_indices(series.users(), MAX_LINE_POINTS)
        .into_iter()
        .map(|i| ((i + 1) as f64, series.conversions[i] as f64, series.rates[i]))
        .collect();
    CumulativeLine {
        label: series.label.clone(),
        points,
    }
}

pub fn cumulative_conversions_chart(
    data: &PreparedData,
    group_field: &str,
    outcome_field: &str,
) -> crate::Result<CumulativeConversionsChart> {
    let lines = data
        .cumulative_by_group(group_field, outcome_field)?
        .iter()
        .map(cumulative_line)
        .collect();
    Ok(CumulativeConversionsChart { lines })
}

impl Figure for CumulativeConversionsChart {
    fn name(&self) -> &'static str {
        "cumulative_conversions"
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let all = || self.lines.iter().flat_map(|l| l.points.iter());
        let x_max = all().map(|p| p.0).fold(1.0, f64::max);
        let conv_max = all().map(|p| p.1).fold(1.0, f64::max) * 1.05;
        let rate_max = rate_axis_max(all().map(|p| p.2).fold(0.0, f64::max), 1.1);

        let mut chart = ChartBuilder::on(root)
            .caption("Cumulative Conversions and Conversion Rates Over Time", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .right_y_label_area_size(70)
            .build_cartesian_2d(0f64..x_max, 0f64..conv_max)?
            .set_secondary_coord(0f64..x_max, 0f64..rate_max);

        chart
            .configure_mesh()
            .x_desc("Number of Users")
            .y_desc("Cumulative Conversions")
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        chart
            .configure_secondary_axes()
            .y_desc("Conversion Rate")
            .y_label_formatter(&percent_label(1))
            .draw()?;

        for (i, line) in self.lines.iter().enumerate() {
            let color = palette(i);
            chart
                .draw_series(LineSeries::new(
                    line.points.iter().map(|&(x, conversions, _)| (x, conversions)),
                    color.stroke_width(2),
                ))?
                .label(format!("{} (Cumulative)", line.label))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

            chart
                .draw_secondary_series(LineSeries::new(
                    line.points.iter().map(|&(x, _, rate)| (x, rate)),
                    color.mix(0.5).stroke_width(1),
                ))?
                .label(format!("{} (Rate)", line.label))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.mix(0.5).stroke_width(1)));
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        Ok(())
    }
}

/// Conversion rate per group and day (grouped bars) or hour (lines)
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentChart {
    pub table: SegmentTable,
}

impl SegmentChart {
    pub fn new(table: SegmentTable) -> Self {
        Self { table }
    }

    fn max_rate(&self) -> f64 {
        self.table
            .cells
            .iter()
            .filter_map(|c| c.map(|cell| cell.rate))
            .fold(0.0, f64::max)
    }

    fn draw_days(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let table = &self.table;
        let per_group = table.segments.len() + 1;
        let slots = table.groups.len() * per_group;

        let mut chart = ChartBuilder::on(root)
            .caption("Conversion Rates by Day of Week", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d((0..slots).into_segmented(), 0f64..rate_axis_max(self.max_rate(), 1.15))?;

        // One slot per (group, day) plus a spacer; the group name sits under its middle bar
        let groups = &table.groups;
        let middle = table.segments.len() / 2;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(slots)
            .x_label_formatter(&|x| match x {
                SegmentValue::CenterOf(k) if k % per_group == middle => {
                    groups.get(k / per_group).cloned().unwrap_or_default()
                }
                _ => String::new(),
            })
            .y_label_formatter(&percent_label(1))
            .x_desc("Test Group")
            .y_desc("Conversion Rate")
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        for (j, segment) in table.segments.iter().enumerate() {
            let color = palette(j);
            let bars = (0..table.groups.len()).filter_map(|i| {
                table.rate(i, j).map(|rate| {
                    let k = i * per_group + j;
                    let mut bar = Rectangle::new(
                        [(SegmentValue::Exact(k), 0.0), (SegmentValue::Exact(k + 1), rate)],
                        color.filled(),
                    );
                    bar.set_margin(0, 0, 1, 1);
                    bar
                })
            });
            chart
                .draw_series(bars)?
                .label(segment.to_string())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        Ok(())
    }

    fn draw_hours(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let table = &self.table;
        let mut chart = ChartBuilder::on(root)
            .caption("Conversion Rates by Hour of Day", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(0i32..(HOURS_PER_DAY as i32 - 1), 0f64..rate_axis_max(self.max_rate(), 1.15))?;

        chart
            .configure_mesh()
            .x_labels(HOURS_PER_DAY)
            .light_line_style(&WHITE)
            .bold_line_style(&BLACK.mix(0.15))
            .y_label_formatter(&percent_label(1))
            .x_desc("Hour of Day")
            .y_desc("Conversion Rate")
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        for (i, group) in table.groups.iter().enumerate() {
            let color = palette(i);
            let points: Vec<(i32, f64)> = table
                .segments
                .iter()
                .enumerate()
                .filter_map(|(j, segment)| match segment {
                    SegmentKey::Hour(hour) => table.rate(i, j).map(|rate| (i32::from(*hour), rate)),
                    SegmentKey::Day(_) => None,
                })
                .collect();
            chart
                .draw_series(LineSeries::new(points, color.stroke_width(2)).point_size(4))?
                .label(group.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;

        Ok(())
    }
}

impl Figure for SegmentChart {
    fn name(&self) -> &'static str {
        match self.table.field {
            SegmentField::DayOfWeek => "conversion_by_day",
            SegmentField::HourOfDay => "conversion_by_hour",
        }
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        match self.table.field {
            SegmentField::DayOfWeek => self.draw_days(root),
            SegmentField::HourOfDay => self.draw_hours(root),
        }
    }
}

/// Retained ad-fatigue buckets, sized by sample count
#[derive(Debug, Clone, PartialEq)]
pub struct AdFatigueChart {
    pub buckets: Vec<FatigueBucket>,
}

impl AdFatigueChart {
    pub fn new(analysis: &FatigueAnalysis) -> Self {
        Self {
            buckets: analysis.buckets.clone(),
        }
    }
}

impl Figure for AdFatigueChart {
    fn name(&self) -> &'static str {
        "ad_fatigue"
    }

    fn draw(&self, root: &DrawingArea<BitMapBackend<'_>, Shift>) -> crate::Result<()> {
        let x_max = self.buckets.iter().map(|b| b.total_ads).max().unwrap_or(1) as f64 + 1.0;
        let max_rate = self.buckets.iter().map(|b| b.rate).fold(0.0, f64::max);
        let max_count = self.buckets.iter().map(|b| b.count).max().unwrap_or(1);

        let mut chart = ChartBuilder::on(root)
            .caption("Ad Fatigue Analysis", ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(0f64..x_max, 0f64..rate_axis_max(max_rate, 1.1))?;

        chart
            .configure_mesh()
            .x_desc("Number of Ads Seen")
            .y_desc("Conversion Rate")
            .y_label_formatter(&percent_label(1))
            .axis_desc_style(("sans-serif", 15))
            .draw()?;

        let color = palette(0);
        chart.draw_series(self.buckets.iter().map(|b| {
            Circle::new(
                (b.total_ads as f64, b.rate),
                marker_radius(b.count, max_count),
                color.mix(0.7).filled(),
            )
        }))?;

        Ok(())
    }
}
