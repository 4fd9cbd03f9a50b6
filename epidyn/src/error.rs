//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum EpidynError {
    #[error("Data unavailable from '{source_path}': {reason}")]
    DataUnavailable { source_path: String, reason: String },
    #[error("Malformed data: {0}")]
    MalformedData(String),
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    #[error("Metric '{metric}' is not published by the '{format}' source")]
    UnsupportedMetric { metric: String, format: String },
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type EpidynResult<T> = Result<T, EpidynError>;
