use serde::{Deserialize, Serialize};

use crate::metric::SourceFormat;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// URL or local path of the observations CSV
    pub dataset: String,
    pub source_format: SourceFormat,
    /// CSV mapping region names to geographic codes
    pub region_codes: String,
    /// GeoJSON boundary file keyed by region code. Not shipped with the crate; only map output as
    /// GeoJSON reads it.
    pub boundaries: String,
    /// Feature property holding the region code. When unset the feature `id` is used.
    pub boundary_id_property: Option<String>,
    /// Width that numeric region codes are zero padded to
    pub code_width: usize,
    pub cache_ttl_secs: u64,
    pub rolling_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dataset: "https://raw.githubusercontent.com/nytimes/covid-19-data/master/us-counties.csv"
                .into(),
            source_format: SourceFormat::Counties,
            region_codes: "data/state_fips.csv".into(),
            boundaries: "data/us-states.json".into(),
            boundary_id_property: None,
            code_width: 2,
            cache_ttl_secs: 3600,
            rolling_window: 7,
        }
    }
}

impl Config {
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}
