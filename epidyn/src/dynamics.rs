//! First and second order differences of a wide table, and the per-region aggregates built from
//! them.
//!
//! All functions here are pure: they take a [`WideTable`] (or a single column of one) and return
//! freshly computed values. Missing values are `None`, never zero. A [`DerivedSeries`] records how
//! many of its leading values are missing because there is not yet enough history, so that those
//! can be told apart from gaps in the input data.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::NaiveDate;
use itertools::Itertools;
use log::debug;
use nonempty::NonEmpty;

use crate::{
    dates::DateRange,
    error::{EpidynError, EpidynResult},
    frames::{ComparisonRow, MapCell, MapFrame, RankedRegion, RegionSummary},
    geo::RegionCodes,
    metric::{Metric, ValueKind},
    wide::WideTable,
};

/// Default trailing window used to smooth acceleration
pub const DEFAULT_ROLLING_WINDOW: usize = 7;

/// Day over day difference. The first value, and any value next to a missing one, is missing.
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(None);
    }
    out.extend(
        values
            .iter()
            .tuple_windows()
            .map(|(prev, curr)| Some((*curr)? - (*prev)?)),
    );
    out
}

/// Trailing arithmetic mean over `window` values. The first `window - 1` values are missing, as
/// is any window containing a missing value.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let sum = values[i + 1 - window..=i]
                .iter()
                .copied()
                .sum::<Option<f64>>()?;
            Some(sum / window as f64)
        })
        .collect()
}

/// Mean of the values that are present, or `None` if there are none.
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// A series derived from one region's column.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub values: Vec<Option<f64>>,
    /// Number of leading values that are missing for lack of history
    pub warmup: usize,
}

impl DerivedSeries {
    fn new(values: Vec<Option<f64>>, warmup: usize) -> Self {
        let warmup = warmup.min(values.len());
        Self { values, warmup }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Missing because the series has not accumulated enough history at `index`
    pub fn is_warmup(&self, index: usize) -> bool {
        index < self.warmup
    }

    /// Missing because of a gap in the input data
    pub fn is_gap(&self, index: usize) -> bool {
        !self.is_warmup(index) && index < self.values.len() && self.values[index].is_none()
    }

    pub fn mean(&self) -> Option<f64> {
        mean(&self.values)
    }
}

/// Parameters of the transform: how the metric accumulates and how wide the smoothing window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dynamics {
    pub kind: ValueKind,
    pub window: usize,
}

impl Default for Dynamics {
    fn default() -> Self {
        Self::new(ValueKind::Cumulative, DEFAULT_ROLLING_WINDOW)
    }
}

impl Dynamics {
    pub fn new(kind: ValueKind, window: usize) -> Self {
        Self {
            kind,
            window: window.max(1),
        }
    }

    /// New per day: the first difference of a cumulative series, or a daily series as is.
    pub fn new_per_day(&self, values: &[Option<f64>]) -> DerivedSeries {
        match self.kind {
            ValueKind::Cumulative => DerivedSeries::new(diff(values), 1),
            ValueKind::Daily => DerivedSeries::new(values.to_vec(), 0),
        }
    }

    /// Change of the new per day series.
    pub fn acceleration(&self, values: &[Option<f64>]) -> DerivedSeries {
        let new = self.new_per_day(values);
        DerivedSeries::new(diff(&new.values), new.warmup + 1)
    }

    /// Acceleration smoothed with the trailing rolling mean.
    pub fn smoothed_acceleration(&self, values: &[Option<f64>]) -> DerivedSeries {
        let acceleration = self.acceleration(values);
        DerivedSeries::new(
            rolling_mean(&acceleration.values, self.window),
            acceleration.warmup + self.window - 1,
        )
    }

    /// Mean acceleration of every region over `range`. The table is restricted to the range
    /// before differencing, so a range of fewer than three days (two for daily metrics) yields
    /// missing values.
    pub fn mean_acceleration(
        &self,
        table: &WideTable,
        range: &DateRange,
    ) -> BTreeMap<String, Option<f64>> {
        let restricted = table.restrict(range);
        restricted
            .columns()
            .map(|(region, column)| (region.to_string(), self.acceleration(column).mean()))
            .collect()
    }

    /// Regions ordered by mean acceleration over `range`, largest first. Regions without a value
    /// come last; ties are ordered by name.
    pub fn ranking(&self, table: &WideTable, range: &DateRange) -> Vec<RankedRegion> {
        self.mean_acceleration(table, range)
            .into_iter()
            .sorted_by(|(a_region, a), (b_region, b)| {
                let by_value = match (a, b) {
                    (Some(a), Some(b)) => b.total_cmp(a),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                by_value.then_with(|| a_region.cmp(b_region))
            })
            .enumerate()
            .map(|(idx, (region, mean_acceleration))| RankedRegion {
                rank: idx + 1,
                region,
                mean_acceleration,
            })
            .collect()
    }

    /// Smoothed acceleration of every region on `date`, joined to region codes. Regions without a
    /// code are left out of the cells and listed as unmapped.
    pub fn map_frame(
        &self,
        table: &WideTable,
        metric: Metric,
        date: NaiveDate,
        codes: &RegionCodes,
    ) -> MapFrame {
        let row = table.row_index(&date);
        if row.is_none() {
            debug!("No observations on {date}, map frame will be empty");
        }
        let mut cells = vec![];
        let mut unmapped = vec![];
        for (region, column) in table.columns() {
            let Some(code) = codes.get(region) else {
                debug!("No code for region '{region}', leaving it off the map");
                unmapped.push(region.to_string());
                continue;
            };
            let value = row.and_then(|row| self.smoothed_acceleration(column).get(row));
            cells.push(MapCell {
                region: region.to_string(),
                code: code.to_string(),
                value,
            });
        }
        MapFrame {
            date,
            metric,
            color_scale: metric.color_scale(),
            cells,
            unmapped,
        }
    }

    /// Latest value, average new per day and average acceleration of one region over `window`.
    pub fn summary(
        &self,
        table: &WideTable,
        region: &str,
        window: &DateRange,
    ) -> EpidynResult<RegionSummary> {
        let column = table
            .column(region)
            .ok_or_else(|| EpidynError::UnknownRegion(region.to_string()))?;
        let latest = table
            .row_at_or_before(&window.end)
            .filter(|row| window.contains(&table.dates()[*row]))
            .map(|row| (table.dates()[row], column[row]));
        let restricted = table.restrict(window);
        let restricted_column = restricted.column(region).unwrap_or_default();
        Ok(RegionSummary {
            region: region.to_string(),
            window: *window,
            latest_date: latest.map(|(date, _)| date),
            latest_value: latest.and_then(|(_, value)| value),
            average_new: self.new_per_day(restricted_column).mean(),
            average_acceleration: self.acceleration(restricted_column).mean(),
        })
    }

    /// Differences of whole number counts are whole numbers, so they are rounded to drop float
    /// noise. Daily values such as averages per 100k are kept as published.
    fn round_new(&self, value: f64) -> f64 {
        match self.kind {
            ValueKind::Cumulative => value.round(),
            ValueKind::Daily => value,
        }
    }

    /// Value, new per day and smoothed acceleration of each chosen region, day by day over
    /// `range`. Differences are taken after restricting to the range.
    pub fn compare(
        &self,
        table: &WideTable,
        regions: &NonEmpty<String>,
        range: &DateRange,
    ) -> EpidynResult<Vec<ComparisonRow>> {
        let regions = regions.iter().unique().collect_vec();
        let selected = table.select(&regions)?.restrict(range);
        let mut rows = vec![];
        for region in regions {
            let column = selected.column(region).unwrap_or_default();
            let new = self.new_per_day(column);
            let acceleration = self.smoothed_acceleration(column);
            rows.extend(
                selected
                    .dates()
                    .iter()
                    .enumerate()
                    .map(|(idx, date)| ComparisonRow {
                        date: *date,
                        region: region.clone(),
                        value: column[idx],
                        new: new.get(idx).map(|v| self.round_new(v)),
                        acceleration: acceleration.get(idx),
                    }),
            );
        }
        Ok(rows)
    }
}
