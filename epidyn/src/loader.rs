//! Fetching the observations CSV and reshaping it into wide tables.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Cursor,
    time::SystemTime,
};

use chrono::NaiveDate;
use itertools::{izip, Itertools};
use log::{debug, info};
use polars::prelude::*;

use crate::{
    cache::DiskCache,
    config::Config,
    error::{EpidynError, EpidynResult},
    geo::RegionCodes,
    metric::{Metric, SourceFormat},
    wide::WideTable,
    COL,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn unavailable(source: &str, reason: impl ToString) -> EpidynError {
    EpidynError::DataUnavailable {
        source_path: source.to_string(),
        reason: reason.to_string(),
    }
}

/// Reads `source` from a URL or a local path. A single attempt is made; any failure surfaces as
/// [`EpidynError::DataUnavailable`].
pub async fn fetch(source: &str) -> EpidynResult<Vec<u8>> {
    info!("Attempting to load {source}");
    if is_remote(source) {
        let response = reqwest::get(source)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| unavailable(source, e))?;
        let bytes = response.bytes().await.map_err(|e| unavailable(source, e))?;
        Ok(bytes.to_vec())
    } else {
        tokio::fs::read(source)
            .await
            .map_err(|e| unavailable(source, e))
    }
}

/// Same as [`fetch`], but serves remote sources from `disk_cache` while the cached copy is fresh.
pub async fn fetch_cached(source: &str, disk_cache: Option<&DiskCache>) -> EpidynResult<Vec<u8>> {
    let Some(disk_cache) = disk_cache.filter(|_| is_remote(source)) else {
        return fetch(source).await;
    };
    if let Some(bytes) = disk_cache.read(source, SystemTime::now()).await {
        return Ok(bytes);
    }
    let bytes = fetch(source).await?;
    disk_cache.write(source, &bytes).await;
    Ok(bytes)
}

fn parse_date(value: &str) -> EpidynResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| EpidynError::MalformedData(format!("invalid date '{value}': {e}")))
}

/// Sum of a group that stays missing when every value in the group is missing.
fn null_aware_sum(value: Expr) -> Expr {
    when(value.clone().null_count().lt(value.clone().len()))
        .then(value.sum())
        .otherwise(lit(NULL))
}

/// Parses the observations CSV into a long form `DataFrame` with `date`, `region` and one `f64`
/// column per metric of `format`, sorted by date then region. County rows are summed per state and
/// rolling averages rows keep their `geoid`.
///
/// Column types are inferred from every row, since counts published as whole numbers early on
/// can turn fractional later in the file.
pub fn parse_observations(bytes: Vec<u8>, format: SourceFormat) -> EpidynResult<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| EpidynError::MalformedData(format!("observations: {e}")))?;
    debug!("Read observations with shape: {:?}", df.shape());

    let values = format
        .metrics()
        .iter()
        .map(|metric| col(metric.column()).cast(DataType::Float64))
        .collect_vec();
    let keys = [
        col(COL::DATE).cast(DataType::String),
        col(COL::STATE).alias(COL::REGION),
    ];
    let lf = df.lazy();
    let lf = match format {
        SourceFormat::Counties => lf
            .group_by(keys)
            .agg(values.into_iter().map(null_aware_sum).collect_vec()),
        SourceFormat::RollingAverages => lf.select(
            keys.into_iter()
                .chain([col(COL::GEOID).cast(DataType::String)])
                .chain(values)
                .collect_vec(),
        ),
    };
    lf.sort([COL::DATE, COL::REGION], SortMultipleOptions::default())
        .collect()
        .map_err(|e| EpidynError::MalformedData(format!("observations: {e}")))
}

/// Pivots the long form observations into one wide table per metric.
pub fn pivot(
    observations: &DataFrame,
    format: SourceFormat,
) -> EpidynResult<BTreeMap<Metric, WideTable>> {
    let dates = observations
        .column(COL::DATE)?
        .str()?
        .into_iter()
        .map(|date| date.map(parse_date).transpose())
        .collect::<EpidynResult<Vec<_>>>()?;
    let regions = observations.column(COL::REGION)?.str()?;
    format
        .metrics()
        .iter()
        .map(|metric| {
            let values = observations.column(metric.column())?.f64()?;
            let table = WideTable::from_observations(
                izip!(dates.iter(), regions, values)
                    .filter_map(|(date, region, value)| Some(((*date)?, region?, value))),
            );
            Ok::<_, EpidynError>((*metric, table))
        })
        .collect()
}

/// Region codes embedded in the `geoid` column of parsed rolling averages observations.
fn geoid_codes(observations: &DataFrame, code_width: usize) -> EpidynResult<RegionCodes> {
    let pairs: BTreeSet<(&str, &str)> = izip!(
        observations.column(COL::REGION)?.str()?,
        observations.column(COL::GEOID)?.str()?
    )
    .filter_map(|(region, geoid)| Some((region?, geoid?)))
    .collect();
    Ok(RegionCodes::from_geoids(pairs, code_width))
}

/// Everything loaded from one observations source.
#[derive(Debug)]
pub struct Dataset {
    pub source: String,
    pub format: SourceFormat,
    /// Long form observations, see [`parse_observations`]
    pub observations: DataFrame,
    pub tables: BTreeMap<Metric, WideTable>,
    /// Distinct region names in ascending order
    pub regions: Vec<String>,
    pub region_codes: RegionCodes,
}

impl Dataset {
    /// Builds a dataset from the raw observations CSV and a code lookup.
    pub fn from_csv(
        source: &str,
        bytes: Vec<u8>,
        format: SourceFormat,
        mut region_codes: RegionCodes,
        code_width: usize,
    ) -> EpidynResult<Self> {
        let observations = parse_observations(bytes, format)?;
        if format == SourceFormat::RollingAverages {
            region_codes.merge(geoid_codes(&observations, code_width)?);
        }
        let tables = pivot(&observations, format)?;
        let regions = observations
            .column(COL::REGION)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect_vec();
        info!(
            "Loaded {} observations for {} regions from {source}",
            observations.height(),
            regions.len()
        );
        Ok(Self {
            source: source.to_string(),
            format,
            observations,
            tables,
            regions,
            region_codes,
        })
    }

    pub fn table(&self, metric: Metric) -> EpidynResult<&WideTable> {
        self.format.ensure_supports(metric)?;
        self.tables
            .get(&metric)
            .ok_or_else(|| EpidynError::MalformedData(format!("no table for metric {metric}")))
    }

    /// First and last observed dates
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let table = self.tables.values().next()?;
        Some((table.first_date()?, table.last_date()?))
    }
}

/// Loads the observations and region codes named in `config`.
pub async fn load_dataset(config: &Config, disk_cache: Option<&DiskCache>) -> EpidynResult<Dataset> {
    let codes = fetch(&config.region_codes).await?;
    let region_codes = RegionCodes::from_csv(codes, config.code_width)?;
    let bytes = fetch_cached(&config.dataset, disk_cache).await?;
    Dataset::from_csv(
        &config.dataset,
        bytes,
        config.source_format,
        region_codes,
        config.code_width,
    )
}
