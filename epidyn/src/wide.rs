//! The date-indexed wide table: one row per day, one column per region.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use itertools::Itertools;

use crate::{
    dates::DateRange,
    error::{EpidynError, EpidynResult},
};

/// Values of one region, aligned with [`WideTable::dates`]. `None` marks a day on which the region
/// has no observation.
pub type Column = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideTable {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Column>,
}

impl WideTable {
    /// Builds a table from explicit columns. Dates must be strictly ascending and every column
    /// must have one value per date.
    pub fn try_new(dates: Vec<NaiveDate>, columns: BTreeMap<String, Column>) -> EpidynResult<Self> {
        if let Some((a, b)) = dates.iter().tuple_windows().find(|(a, b)| a >= b) {
            return Err(EpidynError::MalformedData(format!(
                "dates must be strictly ascending, found {a} before {b}"
            )));
        }
        if let Some((region, values)) = columns.iter().find(|(_, v)| v.len() != dates.len()) {
            return Err(EpidynError::MalformedData(format!(
                "column '{region}' has {} values for {} dates",
                values.len(),
                dates.len()
            )));
        }
        Ok(Self { dates, columns })
    }

    /// Pivots long form observations into a wide table. Several observations for the same region
    /// and date are summed; missing values are skipped by the sum.
    pub fn from_observations<I, S>(observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, S, Option<f64>)>,
        S: Into<String>,
    {
        let mut dates = BTreeSet::new();
        let mut cells: BTreeMap<String, BTreeMap<NaiveDate, Option<f64>>> = BTreeMap::new();
        for (date, region, value) in observations {
            dates.insert(date);
            let cell = cells.entry(region.into()).or_default().entry(date).or_default();
            *cell = match (*cell, value) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            };
        }
        let dates = dates.into_iter().collect_vec();
        let columns = cells
            .into_iter()
            .map(|(region, by_date)| {
                let column = dates
                    .iter()
                    .map(|date| by_date.get(date).copied().flatten())
                    .collect();
                (region, column)
            })
            .collect();
        Self { dates, columns }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Region names in ascending order
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, region: &str) -> Option<&[Option<f64>]> {
        self.columns.get(region).map(Vec::as_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.columns
            .iter()
            .map(|(region, column)| (region.as_str(), column.as_slice()))
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn row_index(&self, date: &NaiveDate) -> Option<usize> {
        self.dates.binary_search(date).ok()
    }

    /// Index of the latest row dated on or before `date`
    pub fn row_at_or_before(&self, date: &NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| d <= date).checked_sub(1)
    }

    /// Keeps only the rows within `range`.
    pub fn restrict(&self, range: &DateRange) -> WideTable {
        let start = self.dates.partition_point(|d| *d < range.start);
        let end = self.dates.partition_point(|d| *d <= range.end).max(start);
        WideTable {
            dates: self.dates[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(region, column)| (region.clone(), column[start..end].to_vec()))
                .collect(),
        }
    }

    /// Keeps only the named regions. Every name must be a column of the table.
    pub fn select<S: AsRef<str>>(&self, regions: &[S]) -> EpidynResult<WideTable> {
        let columns = regions
            .iter()
            .map(|region| {
                let region = region.as_ref();
                self.columns
                    .get(region)
                    .map(|column| (region.to_string(), column.clone()))
                    .ok_or_else(|| EpidynError::UnknownRegion(region.to_string()))
            })
            .collect::<EpidynResult<BTreeMap<_, _>>>()?;
        Ok(WideTable {
            dates: self.dates.clone(),
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn table() -> WideTable {
        WideTable::from_observations(vec![
            (date(3), "Utah", Some(3.0)),
            (date(1), "Utah", Some(1.0)),
            (date(2), "Ohio", Some(5.0)),
            (date(2), "Utah", Some(2.0)),
            (date(3), "Ohio", Some(7.0)),
            (date(3), "Ohio", Some(1.0)),
        ])
    }

    #[test]
    fn pivot_should_sort_dates_and_fill_gaps() {
        let table = table();
        assert_eq!(table.dates(), &[date(1), date(2), date(3)]);
        assert_eq!(table.regions().collect_vec(), vec!["Ohio", "Utah"]);
        assert_eq!(table.column("Utah").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(
            table.column("Ohio").unwrap(),
            &[None, Some(5.0), Some(8.0)],
            "duplicates are summed and unobserved days are missing"
        );
    }

    #[test]
    fn restrict_should_select_inclusive_range() {
        let table = table();
        let restricted = table.restrict(&DateRange::new(date(2), date(3)));
        assert_eq!(restricted.dates(), &[date(2), date(3)]);
        assert_eq!(restricted.column("Utah").unwrap(), &[Some(2.0), Some(3.0)]);

        let empty = table.restrict(&DateRange::new(date(3), date(1)));
        assert!(empty.is_empty());
        assert_eq!(empty.column("Utah").unwrap().len(), 0);

        let outside = table.restrict(&DateRange::new(date(10), date(20)));
        assert!(outside.is_empty());
    }

    #[test]
    fn select_should_reject_unknown_regions() {
        let table = table();
        assert_eq!(table.select(&["Utah"]).unwrap().regions().count(), 1);
        assert!(matches!(
            table.select(&["Utah", "Atlantis"]),
            Err(EpidynError::UnknownRegion(region)) if region == "Atlantis"
        ));
    }

    #[test]
    fn row_lookup() {
        let table = table();
        assert_eq!(table.row_index(&date(2)), Some(1));
        assert_eq!(table.row_index(&date(9)), None);
        assert_eq!(table.row_at_or_before(&date(9)), Some(2));
        assert_eq!(table.row_at_or_before(&NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()), None);
    }

    #[test]
    fn try_new_should_validate_shape() {
        let columns = BTreeMap::from([("Utah".to_string(), vec![Some(1.0)])]);
        assert!(WideTable::try_new(vec![date(1), date(2)], columns.clone()).is_err());
        assert!(WideTable::try_new(vec![date(2)], columns.clone()).is_ok());
        let two = BTreeMap::from([("Utah".to_string(), vec![Some(1.0), Some(2.0)])]);
        assert!(WideTable::try_new(vec![date(2), date(1)], two).is_err());
    }
}
