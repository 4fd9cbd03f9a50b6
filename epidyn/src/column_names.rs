//! This module stores the column names used both when reading the upstream CSV sources and when
//! serialising derived frames. Source names must be kept in sync with the published datasets.

// Source columns
pub const DATE: &str = "date";
pub const STATE: &str = "state";
pub const GEOID: &str = "geoid";
pub const FIPS: &str = "fips";

pub const CASES: &str = "cases";
pub const CASES_AVG: &str = "cases_avg";
pub const CASES_AVG_PER_100K: &str = "cases_avg_per_100k";
pub const DEATHS: &str = "deaths";
pub const DEATHS_AVG: &str = "deaths_avg";
pub const DEATHS_AVG_PER_100K: &str = "deaths_avg_per_100k";

// Derived columns
pub const REGION: &str = "region";
pub const CODE: &str = "code";
pub const VALUE: &str = "value";
pub const NEW: &str = "new";
pub const ACCELERATION: &str = "acceleration";
pub const MEAN_ACCELERATION: &str = "mean_acceleration";
pub const RANK: &str = "rank";
