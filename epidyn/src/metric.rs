//! The enumerated metrics a source publishes, and how each one should be differenced and drawn.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{
    error::{EpidynError, EpidynResult},
    COL,
};

/// Layout of the observations CSV.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum SourceFormat {
    /// One row per county per day with cumulative `cases` and `deaths`.
    #[default]
    Counties,
    /// One row per state per day with daily counts and their rolling averages.
    RollingAverages,
}

impl SourceFormat {
    /// Metrics published by this source, in display order.
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            SourceFormat::Counties => &[Metric::Cases, Metric::Deaths],
            SourceFormat::RollingAverages => &[
                Metric::Cases,
                Metric::CasesAvg,
                Metric::CasesAvgPer100k,
                Metric::Deaths,
                Metric::DeathsAvg,
                Metric::DeathsAvgPer100k,
            ],
        }
    }

    /// Whether values of this source accumulate over time or are already per day.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            SourceFormat::Counties => ValueKind::Cumulative,
            SourceFormat::RollingAverages => ValueKind::Daily,
        }
    }

    pub fn ensure_supports(&self, metric: Metric) -> EpidynResult<()> {
        if self.metrics().contains(&metric) {
            Ok(())
        } else {
            Err(EpidynError::UnsupportedMetric {
                metric: metric.to_string(),
                format: self.to_string(),
            })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Cumulative,
    Daily,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Metric {
    Cases,
    CasesAvg,
    #[strum(serialize = "cases_avg_per_100k")]
    #[serde(rename = "cases_avg_per_100k")]
    CasesAvgPer100k,
    Deaths,
    DeathsAvg,
    #[strum(serialize = "deaths_avg_per_100k")]
    #[serde(rename = "deaths_avg_per_100k")]
    DeathsAvgPer100k,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricFamily {
    Cases,
    Deaths,
}

/// Fixed bounds of the choropleth colour scale. Bounds do not follow the data so that the scale
/// stays stable while stepping through dates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ColorScale {
    pub name: &'static str,
    pub low: f64,
    pub high: f64,
}

impl Metric {
    /// Name of the source column holding this metric
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Cases => COL::CASES,
            Metric::CasesAvg => COL::CASES_AVG,
            Metric::CasesAvgPer100k => COL::CASES_AVG_PER_100K,
            Metric::Deaths => COL::DEATHS,
            Metric::DeathsAvg => COL::DEATHS_AVG,
            Metric::DeathsAvgPer100k => COL::DEATHS_AVG_PER_100K,
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            Metric::Cases | Metric::CasesAvg | Metric::CasesAvgPer100k => MetricFamily::Cases,
            Metric::Deaths | Metric::DeathsAvg | Metric::DeathsAvgPer100k => MetricFamily::Deaths,
        }
    }

    pub fn color_scale(&self) -> ColorScale {
        match self.family() {
            MetricFamily::Cases => ColorScale {
                name: "Viridis",
                low: -1000.0,
                high: 1000.0,
            },
            MetricFamily::Deaths => ColorScale {
                name: "RdBu_r",
                low: -50.0,
                high: 50.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn metric_should_parse_from_column_name() {
        assert_eq!(Metric::from_str("cases").unwrap(), Metric::Cases);
        assert_eq!(
            Metric::from_str("deaths_avg_per_100k").unwrap(),
            Metric::DeathsAvgPer100k
        );
        assert_eq!(Metric::from_str("Cases_Avg").unwrap(), Metric::CasesAvg);
        assert!(Metric::from_str("recoveries").is_err());
    }

    #[test]
    fn metric_display_should_match_column() {
        for metric in SourceFormat::RollingAverages.metrics() {
            assert_eq!(metric.to_string(), metric.column());
        }
    }

    #[test]
    fn color_scale_is_fixed_per_family() {
        assert_eq!(Metric::Cases.color_scale(), Metric::CasesAvg.color_scale());
        assert_eq!(Metric::Cases.color_scale().low, -1000.0);
        assert_eq!(Metric::Deaths.color_scale().high, 50.0);
        assert_eq!(Metric::DeathsAvg.color_scale().name, "RdBu_r");
    }

    #[test]
    fn counties_source_should_reject_rolling_metrics() {
        assert!(SourceFormat::Counties.ensure_supports(Metric::Cases).is_ok());
        assert!(SourceFormat::Counties
            .ensure_supports(Metric::CasesAvg)
            .is_err());
        assert_eq!(
            SourceFormat::from_str("rolling-averages").unwrap(),
            SourceFormat::RollingAverages
        );
    }
}
