use epidyn::error::EpidynError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum EpidynCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("{0}")]
    EpidynError(#[from] EpidynError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid TOML in config file: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Output format '{0}' is not available for this command")]
    UnsupportedOutput(String),
}

pub type EpidynCliResult<T> = Result<T, EpidynCliError>;
