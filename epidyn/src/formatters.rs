use std::io::Write;

use anyhow::{Context, Result};
use enum_dispatch::enum_dispatch;
use log::debug;
use polars::prelude::*;
use serde_json::{json, Value};

use crate::{geo::Boundaries, COL};

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`.
/// Types without a JSON counterpart are written with their display form.
fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::Int32(n) => json!(*n),
        AnyValue::Int64(n) => json!(*n),
        AnyValue::UInt32(n) => json!(*n),
        AnyValue::UInt64(n) => json!(*n),
        AnyValue::Float32(n) => json!(*n),
        AnyValue::Float64(n) => json!(*n),
        other => Value::String(other.to_string()),
    }
}

/// Trait to define different output generators. `save` writes the `DataFrame` to a writer and
/// `format` collects the same output into a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        self.save(&mut data, df)?;
        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential output type
#[enum_dispatch(OutputGenerator)]
#[derive(Debug)]
pub enum OutputFormatter {
    GeoJSON(GeoJSONFormatter),
    GeoJSONSeq(GeoJSONSeqFormatter),
    Csv(CSVFormatter),
}

/// Format the results as a CSV file
#[derive(Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// Joins each row of a frame with a `code` column to its boundary feature. Every other column
/// becomes a feature property. Rows without a boundary are dropped.
fn features(boundaries: &Boundaries, df: &DataFrame) -> Result<Vec<geojson::Feature>> {
    let codes = df
        .column(COL::CODE)
        .context("frame has no code column to join boundaries on")?
        .str()?;
    let other_cols = df.drop(COL::CODE)?;
    let mut features = vec![];
    for (idx, code) in codes.into_iter().enumerate() {
        let Some(code) = code else { continue };
        let Some(boundary) = boundaries.get(code) else {
            debug!("No boundary for code '{code}', dropping it from the map");
            continue;
        };
        let mut feature = boundary.clone();
        feature.set_property(COL::CODE, code);
        for col in other_cols.get_columns() {
            feature.set_property(col.name(), any_value_to_json(&col.get(idx)?));
        }
        features.push(feature);
    }
    Ok(features)
}

/// Format the results as a geojson feature collection, with the frame's own metadata as foreign
/// members of the collection.
#[derive(Debug, Default)]
pub struct GeoJSONFormatter {
    pub boundaries: Boundaries,
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl OutputGenerator for GeoJSONFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let feature_collection = geojson::FeatureCollection {
            bbox: None,
            features: features(&self.boundaries, df)?,
            foreign_members: self.metadata.clone(),
        };
        writer.write_all(feature_collection.to_string().as_bytes())?;
        Ok(())
    }
}

/// Format the results as geojson sequence format
/// This is one line per feature serialized as a
/// geojson feature
#[derive(Debug, Default)]
pub struct GeoJSONSeqFormatter {
    pub boundaries: Boundaries,
}

impl OutputGenerator for GeoJSONSeqFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        for feature in features(&self.boundaries, df)? {
            writeln!(writer, "{feature}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::tests::BOUNDARIES;

    fn test_df() -> DataFrame {
        df!(
            COL::REGION => &["Utah", "California", "Guam"],
            COL::CODE => &["49", "06", "66"],
            COL::ACCELERATION => &[Some(1.5), None, Some(2.0)]
        )
        .unwrap()
    }

    fn boundaries() -> Boundaries {
        Boundaries::from_geojson(BOUNDARIES, None, 2).unwrap()
    }

    #[test]
    fn test_csv_output() {
        let formatter = CSVFormatter;
        let output = formatter.format(&mut test_df()).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("region,code,acceleration"));
        assert_eq!(lines.next(), Some("Utah,49,1.5"));
        assert_eq!(lines.next(), Some("California,06,"));
    }

    #[test]
    fn test_geojson_output_drops_unmapped_rows() {
        let formatter = GeoJSONFormatter {
            boundaries: boundaries(),
            metadata: Some(serde_json::Map::from_iter([(
                "metric".to_string(),
                json!("cases"),
            )])),
        };
        let output = formatter.format(&mut test_df()).unwrap();
        let collection: geojson::FeatureCollection = output.parse::<geojson::GeoJson>()
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(collection.features.len(), 2, "Guam has no boundary");
        let utah = &collection.features[0];
        assert_eq!(utah.property("region"), Some(&json!("Utah")));
        assert_eq!(utah.property("acceleration"), Some(&json!(1.5)));
        assert_eq!(
            collection.features[1].property("acceleration"),
            Some(&Value::Null)
        );
        assert_eq!(
            collection.foreign_members.unwrap().get("metric"),
            Some(&json!("cases"))
        );
    }

    #[test]
    fn test_geojsonseq_output() {
        let formatter = GeoJSONSeqFormatter {
            boundaries: boundaries(),
        };
        let output = formatter.format(&mut test_df()).unwrap();
        assert_eq!(output.lines().count(), 2);
        for line in output.lines() {
            assert!(line.parse::<geojson::Feature>().is_ok());
        }
    }

    #[test]
    fn geojson_requires_code_column() {
        let formatter = GeoJSONSeqFormatter {
            boundaries: boundaries(),
        };
        let mut df = df!(COL::REGION => &["Utah"]).unwrap();
        assert!(formatter.format(&mut df).is_err());
    }
}
