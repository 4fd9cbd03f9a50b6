//! Derived frames handed to the presentation layer, and their conversion to polars `DataFrame`s for
//! the output formatters.

use chrono::NaiveDate;
use itertools::Itertools;
use polars::{
    frame::DataFrame,
    prelude::{NamedFrom, PolarsResult},
    series::Series,
};
use serde::Serialize;

use crate::{
    dates::DateRange,
    metric::{ColorScale, Metric},
    COL,
};

/// One region's position in the mean acceleration ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRegion {
    pub rank: usize,
    pub region: String,
    pub mean_acceleration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapCell {
    pub region: String,
    pub code: String,
    pub value: Option<f64>,
}

/// Smoothed acceleration per region on a single date, ready to be drawn as a choropleth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFrame {
    pub date: NaiveDate,
    pub metric: Metric,
    pub color_scale: ColorScale,
    pub cells: Vec<MapCell>,
    /// Regions that have no geographic code
    pub unmapped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub window: DateRange,
    pub latest_date: Option<NaiveDate>,
    pub latest_value: Option<f64>,
    pub average_new: Option<f64>,
    pub average_acceleration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    pub region: String,
    pub value: Option<f64>,
    pub new: Option<f64>,
    pub acceleration: Option<f64>,
}

fn date_strings<'a>(dates: impl Iterator<Item = &'a NaiveDate>) -> Vec<String> {
    dates.map(|d| d.to_string()).collect()
}

pub fn ranking_to_dataframe(ranking: &[RankedRegion]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            COL::RANK,
            ranking.iter().map(|r| r.rank as u32).collect_vec(),
        ),
        Series::new(
            COL::REGION,
            ranking.iter().map(|r| r.region.as_str()).collect_vec(),
        ),
        Series::new(
            COL::MEAN_ACCELERATION,
            ranking.iter().map(|r| r.mean_acceleration).collect_vec(),
        ),
    ])
}

impl MapFrame {
    /// One row per mapped region with `region`, `code` and `acceleration` columns.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(
                COL::DATE,
                date_strings(std::iter::repeat(&self.date).take(self.cells.len())),
            ),
            Series::new(
                COL::REGION,
                self.cells.iter().map(|c| c.region.as_str()).collect_vec(),
            ),
            Series::new(
                COL::CODE,
                self.cells.iter().map(|c| c.code.as_str()).collect_vec(),
            ),
            Series::new(
                COL::ACCELERATION,
                self.cells.iter().map(|c| c.value).collect_vec(),
            ),
        ])
    }

    /// Properties attached to the whole map when written as GeoJSON
    pub fn metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut metadata = serde_json::Map::new();
        metadata.insert("date".into(), self.date.to_string().into());
        metadata.insert("metric".into(), self.metric.to_string().into());
        metadata.insert("color_scale".into(), self.color_scale.name.into());
        metadata.insert(
            "range_color".into(),
            serde_json::json!([self.color_scale.low, self.color_scale.high]),
        );
        metadata
    }
}

pub fn summaries_to_dataframe(summaries: &[RegionSummary]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            COL::REGION,
            summaries.iter().map(|s| s.region.as_str()).collect_vec(),
        ),
        Series::new(
            "start",
            date_strings(summaries.iter().map(|s| &s.window.start)),
        ),
        Series::new("end", date_strings(summaries.iter().map(|s| &s.window.end))),
        Series::new(
            COL::VALUE,
            summaries.iter().map(|s| s.latest_value).collect_vec(),
        ),
        Series::new(
            "average_new",
            summaries.iter().map(|s| s.average_new).collect_vec(),
        ),
        Series::new(
            "average_acceleration",
            summaries
                .iter()
                .map(|s| s.average_acceleration)
                .collect_vec(),
        ),
    ])
}

pub fn comparison_to_dataframe(rows: &[ComparisonRow]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(COL::DATE, date_strings(rows.iter().map(|r| &r.date))),
        Series::new(
            COL::REGION,
            rows.iter().map(|r| r.region.as_str()).collect_vec(),
        ),
        Series::new(COL::VALUE, rows.iter().map(|r| r.value).collect_vec()),
        Series::new(COL::NEW, rows.iter().map(|r| r.new).collect_vec()),
        Series::new(
            COL::ACCELERATION,
            rows.iter().map(|r| r.acceleration).collect_vec(),
        ),
    ])
}
