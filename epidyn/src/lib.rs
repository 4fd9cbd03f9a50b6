use std::{path::Path, sync::Arc, time::Instant};

use log::{debug, info};

use crate::{
    cache::{DiskCache, TtlCache},
    config::Config,
    dynamics::Dynamics,
    error::EpidynResult,
    geo::Boundaries,
    loader::Dataset,
};

// Re-exports
pub use column_names as COL;

// Modules
pub mod cache;
pub mod column_names;
pub mod config;
pub mod dates;
pub mod dynamics;
pub mod error;
pub mod formatters;
pub mod frames;
pub mod geo;
pub mod loader;
pub mod metric;
pub mod wide;

/// Handle on the configured data sources, with a time bounded cache of the loaded dataset.
pub struct Epidyn {
    pub config: Config,
    cache: TtlCache<String, Arc<Dataset>>,
    disk_cache: Option<DiskCache>,
}

impl Epidyn {
    /// Setup the Epidyn object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the Epidyn object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        let cache = TtlCache::new(config.cache_ttl());
        Self {
            config,
            cache,
            disk_cache: None,
        }
    }

    /// Also keep raw downloads in `cache_dir` so that separate processes share them
    pub fn with_disk_cache<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.disk_cache = Some(DiskCache::new(cache_dir, self.config.cache_ttl()));
        self
    }

    /// The dataset, loaded on first use and reloaded once the cached copy has expired.
    pub async fn dataset(&mut self) -> EpidynResult<Arc<Dataset>> {
        self.dataset_at(Instant::now()).await
    }

    /// Same as [`Epidyn::dataset`] with an explicit current instant.
    pub async fn dataset_at(&mut self, now: Instant) -> EpidynResult<Arc<Dataset>> {
        let key = self.config.dataset.clone();
        if let Some(dataset) = self.cache.get(&key, now) {
            debug!("Serving {key} from cache");
            return Ok(dataset);
        }
        self.cache.evict_expired(now);
        info!("Loading {key}");
        let dataset = Arc::new(loader::load_dataset(&self.config, self.disk_cache.as_ref()).await?);
        self.cache.insert(key, dataset.clone(), now);
        Ok(dataset)
    }

    /// Boundary features for the map
    pub async fn boundaries(&self) -> EpidynResult<Boundaries> {
        let bytes = loader::fetch(&self.config.boundaries).await?;
        let contents = String::from_utf8(bytes).map_err(|e| {
            error::EpidynError::MalformedData(format!("boundary file is not UTF-8: {e}"))
        })?;
        Boundaries::from_geojson(
            &contents,
            self.config.boundary_id_property.as_deref(),
            self.config.code_width,
        )
    }

    /// The transform matching the configured source
    pub fn dynamics(&self) -> Dynamics {
        Dynamics::new(
            self.config.source_format.value_kind(),
            self.config.rolling_window,
        )
    }
}

impl Default for Epidyn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;
    use httpmock::prelude::*;

    use super::*;
    use crate::{
        dates::DateRange,
        loader::tests::{COUNTIES_CSV, ROLLING_CSV},
        metric::{Metric, SourceFormat},
    };

    fn codes_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"state,fips\nUtah,49\nOhio,39\n").unwrap();
        file
    }

    #[tokio::test]
    async fn dataset_should_be_cached_until_ttl_elapses() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/us-counties.csv");
                then.status(200).body(COUNTIES_CSV);
            })
            .await;
        let codes = codes_file();
        let mut epidyn = Epidyn::new_with_config(Config {
            dataset: server.url("/us-counties.csv"),
            region_codes: codes.path().to_string_lossy().to_string(),
            ..Config::default()
        });

        let start = Instant::now();
        let first = epidyn.dataset_at(start).await.unwrap();
        let second = epidyn
            .dataset_at(start + Duration::from_secs(60))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second), "second load should be cached");
        mock.assert_hits_async(1).await;

        let third = epidyn
            .dataset_at(start + Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third), "expired entry should reload");
        mock.assert_hits_async(2).await;
        assert_eq!(third.region_codes.get("Utah"), Some("49"));
    }

    #[tokio::test]
    async fn unavailable_dataset_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/us-counties.csv");
                then.status(500);
            })
            .await;
        let codes = codes_file();
        let mut epidyn = Epidyn::new_with_config(Config {
            dataset: server.url("/us-counties.csv"),
            region_codes: codes.path().to_string_lossy().to_string(),
            ..Config::default()
        });
        assert!(matches!(
            epidyn.dataset().await,
            Err(error::EpidynError::DataUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn end_to_end_ranking_from_rolling_averages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/us-states.csv");
                then.status(200).body(ROLLING_CSV);
            })
            .await;
        let codes = codes_file();
        let mut epidyn = Epidyn::new_with_config(Config {
            dataset: server.url("/us-states.csv"),
            source_format: SourceFormat::RollingAverages,
            region_codes: codes.path().to_string_lossy().to_string(),
            ..Config::default()
        });
        let dataset = epidyn.dataset().await.unwrap();
        let table = dataset.table(Metric::Cases).unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 2).unwrap(),
        );
        let ranking = epidyn.dynamics().ranking(table, &range);
        assert_eq!(ranking[0].region, "Ohio");
        assert_eq!(ranking[0].mean_acceleration, Some(5.0));
        assert_eq!(ranking[1].mean_acceleration, Some(2.0));
    }
}
