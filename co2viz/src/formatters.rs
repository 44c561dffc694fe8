use anyhow::{anyhow, Result};
use enum_dispatch::enum_dispatch;
use geo::geometry::Geometry;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use strum_macros::EnumString;
use wkt::TryFromWkt;

use crate::COL;

/// Utility function to convert from polars `AnyValue` to `serde_json::Value`
/// Doesn't cover all types but the ones our tables hold.
fn any_value_to_json(value: &AnyValue) -> Result<Value> {
    match value {
        AnyValue::Null => Ok(Value::Null),
        AnyValue::Boolean(b) => Ok(Value::Bool(*b)),
        AnyValue::String(s) => Ok(Value::String((*s).to_string())),
        AnyValue::StringOwned(s) => Ok(Value::String(s.to_string())),
        AnyValue::Int8(n) => Ok(json!(*n)),
        AnyValue::Int16(n) => Ok(json!(*n)),
        AnyValue::Int32(n) => Ok(json!(*n)),
        AnyValue::Int64(n) => Ok(json!(*n)),
        AnyValue::UInt8(n) => Ok(json!(*n)),
        AnyValue::UInt16(n) => Ok(json!(*n)),
        AnyValue::UInt32(n) => Ok(json!(*n)),
        AnyValue::UInt64(n) => Ok(json!(*n)),
        // NaN has no JSON representation
        AnyValue::Float32(n) if n.is_nan() => Ok(Value::Null),
        AnyValue::Float64(n) if n.is_nan() => Ok(Value::Null),
        AnyValue::Float32(n) => Ok(json!(*n)),
        AnyValue::Float64(n) => Ok(json!(*n)),
        _ => Err(anyhow!("Failed to convert type {value:?}")),
    }
}

/// Properties of row `idx` for every column of `df`.
fn row_properties(df: &DataFrame, idx: usize) -> Result<serde_json::Map<String, Value>> {
    let mut properties = serde_json::Map::new();
    for col in df.get_columns() {
        let val = any_value_to_json(&col.get(idx)?)?;
        properties.insert(col.name().to_string(), val);
    }
    Ok(properties)
}

/// Convert a dataframe with a WKT `geometry` column into GeoJSON features. All other columns
/// become feature properties. Rows with a null geometry are skipped.
pub fn features_from_df(df: &DataFrame) -> Result<Vec<geojson::Feature>> {
    let geometry_col = df.column(COL::GEOMETRY)?;
    let other_cols = df.drop(COL::GEOMETRY)?;
    let mut features: Vec<geojson::Feature> = vec![];

    for (idx, geom) in geometry_col.str()?.into_iter().enumerate() {
        if let Some(wkt_str) = geom {
            let geom: Geometry<f64> = Geometry::try_from_wkt_str(wkt_str)
                .map_err(|e| anyhow!("Invalid WKT at row {idx}: {e}"))?;
            features.push(geojson::Feature {
                geometry: Some(geojson::Geometry::from(&geom)),
                properties: Some(row_properties(&other_cols, idx)?),
                bbox: None,
                id: None,
                foreign_members: None,
            });
        }
    }
    Ok(features)
}

/// Trait to define different output generators. Defines two
/// functions, format which generates a serialized string of the
/// `DataFrame` and save which writes it to a writer
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        self.save(&mut data, df)?;
        Ok(String::from_utf8(data)?)
    }
}

/// Enum of OutputFormatters one for each potential
/// output type
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    GeoJSON(GeoJSONFormatter),
    Json(JsonFormatter),
    Csv(CSVFormatter),
}

/// Table output formats selectable from the command line.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum TableFormat {
    Table,
    Csv,
    Json,
    GeoJSON,
}

impl TryFrom<TableFormat> for OutputFormatter {
    type Error = anyhow::Error;
    fn try_from(value: TableFormat) -> Result<Self> {
        match value {
            TableFormat::Csv => Ok(OutputFormatter::Csv(CSVFormatter)),
            TableFormat::Json => Ok(OutputFormatter::Json(JsonFormatter)),
            TableFormat::GeoJSON => Ok(OutputFormatter::GeoJSON(GeoJSONFormatter)),
            TableFormat::Table => Err(anyhow!("Terminal tables are not written by a formatter")),
        }
    }
}

/// Format the results as a CSV file. A WKT geometry column is written as is.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CSVFormatter;

impl OutputGenerator for CSVFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// Format the results as a JSON array with one object per row
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonFormatter;

impl OutputGenerator for JsonFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let rows = (0..df.height())
            .map(|idx| row_properties(df, idx).map(Value::Object))
            .collect::<Result<Vec<_>>>()?;
        serde_json::to_writer(writer, &rows)?;
        Ok(())
    }
}

/// Format the results as a geojson file
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct GeoJSONFormatter;

impl OutputGenerator for GeoJSONFormatter {
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let feature_collection = geojson::FeatureCollection {
            bbox: None,
            features: features_from_df(df)?,
            foreign_members: None,
        };
        Ok(feature_collection.to_string())
    }

    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        let result = self.format(df)?;
        writer.write_all(result.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use polars::df;

    use super::*;

    fn test_df() -> DataFrame {
        df!(
            COL::CODE => &["CHL", "ARG"],
            COL::CO2 => &[Some(80.5), None],
            COL::HAS_DATA => &[true, false],
            COL::GEOMETRY => &[
                "POLYGON((0 0,1 0,1 1,0 1,0 0))",
                "POLYGON((2 0,3 0,3 1,2 1,2 0))"
            ]
        )
        .unwrap()
    }

    #[test]
    fn geojson_has_one_feature_per_row() -> Result<()> {
        let mut df = test_df();
        let output = GeoJSONFormatter.format(&mut df)?;
        let collection: geojson::FeatureCollection = output.parse()?;
        assert_eq!(collection.features.len(), 2);
        let second = &collection.features[1];
        assert_eq!(second.property(COL::CODE), Some(&json!("ARG")));
        assert_eq!(second.property(COL::CO2), Some(&Value::Null));
        assert_eq!(second.property(COL::HAS_DATA), Some(&json!(false)));
        Ok(())
    }

    #[test]
    fn json_rows_keep_column_names() -> Result<()> {
        let mut df = test_df().drop(COL::GEOMETRY)?;
        let output = JsonFormatter.format(&mut df)?;
        let rows: Value = serde_json::from_str(&output)?;
        assert_eq!(rows[0]["code"], json!("CHL"));
        assert_eq!(rows[0]["co2"], json!(80.5));
        Ok(())
    }

    #[test]
    fn csv_has_header_and_rows() -> Result<()> {
        let mut df = test_df().drop(COL::GEOMETRY)?;
        let output = CSVFormatter.format(&mut df)?;
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "code,co2,has_data");
        assert_eq!(lines.len(), 3);
        Ok(())
    }

    #[test]
    fn invalid_wkt_is_an_error() {
        let df = df!(COL::CODE => &["CHL"], COL::GEOMETRY => &["not wkt"]).unwrap();
        assert!(features_from_df(&df).is_err());
    }

    #[test]
    fn table_format_parses_case_insensitively() {
        assert_eq!(TableFormat::from_str("geojson").unwrap(), TableFormat::GeoJSON);
        assert_eq!(TableFormat::from_str("CSV").unwrap(), TableFormat::Csv);
        assert!(OutputFormatter::try_from(TableFormat::Table).is_err());
    }
}
