use std::collections::HashSet;

use geo::geometry::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson};
use log::{debug, info, warn};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use wkt::ToWkt;

use crate::config::Config;
use crate::error::{Co2VizError, Co2VizResult};
use crate::formatters::features_from_df;
use crate::COL;

/// World geometry table with one row per ISO-3 code and columns `code`, `country` and
/// `geometry` (WKT).
#[derive(Debug, Clone, PartialEq)]
pub struct World(pub DataFrame);

fn property_str(feature: &Feature, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| feature.property(alias))
        .find_map(|value| value.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}

impl World {
    /// Build the world table from a GeoJSON document. The first feature seen for a code is kept.
    pub fn from_geojson(geojson: GeoJson) -> Co2VizResult<Self> {
        let features = match geojson {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(Co2VizError::WorldSource(
                    "geojson".into(),
                    "expected features, found a bare geometry".into(),
                ))
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut codes: Vec<String> = vec![];
        let mut names: Vec<String> = vec![];
        let mut geoms: Vec<String> = vec![];

        for feature in features {
            let Some(code) = property_str(&feature, COL::WORLD_CODE_ALIASES) else {
                debug!("Skipping feature without a code: {:?}", feature.properties);
                continue;
            };
            let code = code.to_uppercase();
            let Some(geometry) = feature.geometry.clone() else {
                debug!("Skipping feature without geometry: {code}");
                continue;
            };
            if !seen.insert(code.clone()) {
                continue;
            }
            let geom: Geometry<f64> = geometry
                .try_into()
                .map_err(|_| Co2VizError::InvalidGeometry(code.clone()))?;
            let name = property_str(&feature, COL::WORLD_NAME_ALIASES).unwrap_or_else(|| code.clone());
            geoms.push(geom.wkt_string());
            names.push(name);
            codes.push(code);
        }

        let df = DataFrame::new(vec![
            Series::new(COL::CODE, codes),
            Series::new(COL::COUNTRY, names),
            Series::new(COL::GEOMETRY, geoms),
        ])?;
        info!("Loaded world geometry with shape: {:?}", df.shape());
        Ok(Self(df))
    }

    pub fn as_df(&self) -> &DataFrame {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.height()
    }

    pub fn is_empty(&self) -> bool {
        self.0.height() == 0
    }

    pub fn codes(&self) -> Co2VizResult<Vec<String>> {
        Ok(self
            .0
            .column(COL::CODE)?
            .str()?
            .into_iter()
            .flatten()
            .map(|code| code.to_string())
            .collect())
    }

    /// Features keyed by `properties.code`, as referenced by the choropleth traces.
    pub fn feature_collection(&self) -> Co2VizResult<FeatureCollection> {
        let features = features_from_df(&self.0)?;
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch(source: &str) -> Result<String, String> {
    if is_remote(source) {
        info!("Downloading world geometry from {source}");
        let response = reqwest::get(source)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| e.to_string())?;
        response.text().await.map_err(|e| e.to_string())
    } else {
        info!("Reading world geometry from {source}");
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Load world geometry from a local GeoJSON path or an `http(s)` URL.
pub async fn load_world(source: &str) -> Co2VizResult<World> {
    let text = fetch(source)
        .await
        .map_err(|e| Co2VizError::WorldSource(source.into(), e))?;
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Co2VizError::WorldSource(source.into(), e.to_string()))?;
    World::from_geojson(geojson)
}

/// Load the configured world source, trying the fallback source if that fails.
pub async fn load_world_with_fallback(config: &Config) -> Co2VizResult<World> {
    match load_world(&config.world_source).await {
        Ok(world) => Ok(world),
        Err(err) => match config.world_fallback.as_deref() {
            Some(fallback) if fallback != config.world_source => {
                warn!("{err}; falling back to {fallback}");
                load_world(fallback).await
            }
            _ => Err(err),
        },
    }
}
