//! Date ranges and the default selections derived from "today".

use std::{fmt::Display, str::FromStr};

use anyhow::bail;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// An inclusive range of dates. A range whose start is after its end selects nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.start <= *date && *date <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...{}", self.start, self.end)
    }
}

impl FromStr for DateRange {
    type Err = anyhow::Error;

    /// Parses `START...END` or a single `DATE`, with dates as `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split("...")
            .map(|part| part.trim().parse::<NaiveDate>())
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [date] => Ok(DateRange::single(*date)),
            [start, end] => Ok(DateRange::new(*start, *end)),
            _ => bail!("Invalid date range '{s}', expected START...END"),
        }
    }
}

/// Default selections, all relative to an injected current date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultDates {
    pub today: NaiveDate,
}

impl DefaultDates {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn days_ago(&self, days: i64) -> NaiveDate {
        self.today - Duration::days(days)
    }

    pub fn starting(&self) -> NaiveDate {
        self.days_ago(9)
    }

    /// Latest date expected to be fully reported
    pub fn ending(&self) -> NaiveDate {
        self.days_ago(2)
    }

    pub fn month_ago(&self) -> NaiveDate {
        self.days_ago(30)
    }

    pub fn long_lookback(&self) -> NaiveDate {
        self.days_ago(240)
    }

    /// The week used for summaries and the acceleration ranking
    pub fn window(&self) -> DateRange {
        DateRange::new(self.starting(), self.ending())
    }

    /// The month ending at [`DefaultDates::ending`]
    pub fn last_month(&self) -> DateRange {
        DateRange::new(self.month_ago(), self.ending())
    }

    /// The long range used when comparing regions
    pub fn lookback(&self) -> DateRange {
        DateRange::new(self.long_lookback(), self.ending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_should_be_relative_to_today() {
        let defaults = DefaultDates::new(date(2021, 3, 10));
        assert_eq!(defaults.starting(), date(2021, 3, 1));
        assert_eq!(defaults.ending(), date(2021, 3, 8));
        assert_eq!(defaults.month_ago(), date(2021, 2, 8));
        assert_eq!(defaults.long_lookback(), date(2020, 7, 13));
        assert_eq!(
            defaults.window(),
            DateRange::new(date(2021, 3, 1), date(2021, 3, 8))
        );
        assert_eq!(
            defaults.last_month(),
            DateRange::new(date(2021, 2, 8), date(2021, 3, 8))
        );
    }

    #[test]
    fn date_range_should_parse() {
        assert_eq!(
            "2021-01-01...2021-01-31".parse::<DateRange>().unwrap(),
            DateRange::new(date(2021, 1, 1), date(2021, 1, 31))
        );
        assert_eq!(
            "2021-01-05".parse::<DateRange>().unwrap(),
            DateRange::single(date(2021, 1, 5))
        );
        assert!("2021-01-01...".parse::<DateRange>().is_err());
        assert!("2021-01-01...2021-01-02...2021-01-03"
            .parse::<DateRange>()
            .is_err());
    }

    #[test]
    fn reversed_range_should_be_empty() {
        let range = DateRange::new(date(2021, 1, 2), date(2021, 1, 1));
        assert!(range.is_empty());
        assert!(!range.contains(&date(2021, 1, 1)));
        assert!(!DateRange::single(date(2021, 1, 1)).is_empty());
    }
}
