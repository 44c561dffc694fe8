use co2viz::error::Co2VizError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum Co2VizCliError {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("{0}")]
    Co2VizError(#[from] Co2VizError),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid TOML in config file: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl Co2VizCliError {
    /// Whether the emissions CSV is missing, so that download instructions can be shown.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Co2VizCliError::Co2VizError(err) if err.is_missing_data())
    }
}

pub type Co2VizCliResult<T> = Result<T, Co2VizCliError>;
