//! Region codes and the GeoJSON boundaries keyed by them.

use std::{collections::BTreeMap, io::Cursor, str::FromStr};

use geojson::{feature::Id, Feature, GeoJson};
use itertools::izip;
use log::{debug, warn};
use polars::prelude::{CsvReadOptions, DataType, SerReader};

use crate::{
    error::{EpidynError, EpidynResult},
    COL,
};

/// Zero pads purely numeric codes to `width` digits, so that `1` and `01` name the same region.
/// Other codes are only trimmed.
pub fn normalize_code(raw: &str, width: usize) -> String {
    let raw = raw.trim();
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{raw:0>width$}")
    } else {
        raw.to_string()
    }
}

/// Lookup from region name to its fixed geographic code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCodes(BTreeMap<String, String>);

impl RegionCodes {
    pub fn from_pairs<I, R, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (R, C)>,
        R: Into<String>,
        C: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(region, code)| (region.into(), code.into()))
                .collect(),
        )
    }

    /// Reads a reference CSV with at least `state` and `fips` columns.
    pub fn from_csv(bytes: Vec<u8>, code_width: usize) -> EpidynResult<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| EpidynError::MalformedData(format!("region code table: {e}")))?;
        let codes = df.column(COL::FIPS)?.cast(&DataType::String)?;
        let pairs = izip!(df.column(COL::STATE)?.str()?, codes.str()?)
            .filter_map(|(region, code)| Some((region?, normalize_code(code?, code_width))))
            .collect::<Vec<_>>();
        debug!("Read {} region codes", pairs.len());
        Ok(Self::from_pairs(pairs))
    }

    /// Codes embedded in identifiers such as `USA-01`, keyed by region name.
    pub fn from_geoids<'a, I>(pairs: I, code_width: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::from_pairs(pairs.into_iter().filter_map(|(region, geoid)| {
            let code = geoid.rsplit_once('-').map(|(_, code)| code);
            if code.is_none() {
                warn!("Unexpected geoid '{geoid}' for region '{region}'");
            }
            Some((region, normalize_code(code?, code_width)))
        }))
    }

    /// Adds entries from `other` for regions this lookup does not know yet.
    pub fn merge(&mut self, other: RegionCodes) {
        for (region, code) in other.0 {
            self.0.entry(region).or_insert(code);
        }
    }

    pub fn get(&self, region: &str) -> Option<&str> {
        self.0.get(region).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Boundary features keyed by region code.
#[derive(Debug, Clone, Default)]
pub struct Boundaries {
    features: BTreeMap<String, Feature>,
}

fn json_to_code(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Boundaries {
    /// Parses a GeoJSON feature collection. Each feature is keyed by its `id`, or by
    /// `id_property` when given. Features without a usable key are skipped.
    pub fn from_geojson(
        contents: &str,
        id_property: Option<&str>,
        code_width: usize,
    ) -> EpidynResult<Self> {
        let geojson = GeoJson::from_str(contents)
            .map_err(|e| EpidynError::MalformedData(format!("boundary file: {e}")))?;
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(EpidynError::MalformedData(
                    "boundary file must contain features, found a bare geometry".into(),
                ))
            }
        };
        let mut keyed = BTreeMap::new();
        for feature in features {
            let code = match id_property {
                Some(property) => feature.property(property).and_then(json_to_code),
                None => match &feature.id {
                    Some(Id::String(s)) => Some(s.clone()),
                    Some(Id::Number(n)) => Some(n.to_string()),
                    None => None,
                },
            };
            match code {
                Some(code) => {
                    keyed.insert(normalize_code(&code, code_width), feature);
                }
                None => debug!("Skipping boundary feature without a code"),
            }
        }
        debug!("Read {} boundary features", keyed.len());
        Ok(Self { features: keyed })
    }

    pub fn get(&self, code: &str) -> Option<&Feature> {
        self.features.get(code)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
