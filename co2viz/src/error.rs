//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Co2VizError {
    #[error("Emissions CSV not found: {}", .0.display())]
    MissingDataFile(PathBuf),
    #[error("Expected column '{0}' not found in the emissions CSV")]
    MissingColumn(String),
    #[error("No CO2 emissions column found in the CSV (columns: {0})")]
    NoCo2Column(String),
    #[error("Invalid geometry for '{0}'")]
    InvalidGeometry(String),
    #[error("Failed to load world geometry from '{0}': {1}")]
    WorldSource(String, String),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped GeoJSON error: {0}")]
    GeoJsonError(#[from] geojson::Error),
    #[error("Wrapped JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Wrapped IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Co2VizError {
    /// Whether the error comes from the emissions dataset being absent, in which case callers
    /// show download instructions.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Co2VizError::MissingDataFile(_))
    }
}

pub type Co2VizResult<T> = Result<T, Co2VizError>;

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_anyhow() {
        let anyhow_error = anyhow!("An anyhow error");
        let error: Co2VizError = anyhow_error.into();
        assert!(error.to_string().contains("An anyhow error"));
        assert!(!error.is_missing_data());
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = Co2VizError::MissingDataFile(PathBuf::from("data/owid-co2-data.csv"));
        assert!(error.is_missing_data());
        assert_eq!(
            error.to_string(),
            "Emissions CSV not found: data/owid-co2-data.csv"
        );
    }
}
