use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Public GeoJSON of country borders that carries ISO-3 codes.
pub const FALLBACK_WORLD_URL: &str = "https://datahub.io/core/geo-countries/r/countries.geojson";

/// Where the OWID dataset can be downloaded from.
pub const OWID_CO2_URL: &str =
    "https://raw.githubusercontent.com/owid/co2-data/master/owid-co2-data.csv";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Path of the OWID emissions CSV.
    pub data_path: PathBuf,
    /// Local path or URL of the world geometry GeoJSON.
    pub world_source: String,
    /// Used when `world_source` cannot be loaded. `None` disables the fallback.
    pub world_fallback: Option<String>,
    /// Directory that static HTML maps are written to.
    pub output_dir: PathBuf,
    /// Years exported by the `maps` command.
    pub map_years: Vec<i32>,
    /// Countries preselected in the time series.
    pub default_countries: Vec<String>,
    pub top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: PathBuf::from("data").join("owid-co2-data.csv"),
            world_source: "data/countries.geojson".into(),
            world_fallback: Some(FALLBACK_WORLD_URL.into()),
            output_dir: PathBuf::from("."),
            map_years: vec![1751, 1851, 1951, 2024],
            default_countries: vec!["Chile".into(), "Argentina".into(), "Brazil".into()],
            top_n: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"top_n": 5}"#).unwrap();
        assert_eq!(config.top_n, 5);
        assert_eq!(config.map_years, vec![1751, 1851, 1951, 2024]);
        assert_eq!(config.world_fallback.as_deref(), Some(FALLBACK_WORLD_URL));
    }
}
