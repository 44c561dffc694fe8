use std::sync::Arc;

use anyhow::anyhow;
use choropleth::JoinedYear;
use dashboard::Dashboard;
use figures::Figure;
use log::debug;
use polars::frame::DataFrame;
use selection::{Metric, Selection};
use tokio::try_join;
use world::World;

use crate::config::Config;
use crate::error::{Co2VizError, Co2VizResult};

// Re-exports
pub use column_names as COL;

// Modules
pub mod choropleth;
pub mod column_names;
pub mod config;
pub mod dashboard;
pub mod emissions;
pub mod error;
pub mod figures;
pub mod formatters;
pub mod selection;
pub mod world;

/// Emissions and world geometry loaded together, the input of every chart
pub struct Co2Explorer {
    pub config: Config,
    pub emissions: Arc<DataFrame>,
    pub world: World,
}

impl Co2Explorer {
    /// Setup the explorer with default configuration
    pub async fn new() -> Co2VizResult<Self> {
        Self::new_with_config(Config::default()).await
    }

    /// Setup the explorer with custom configuration, loading the emissions CSV and the world
    /// geometry concurrently
    pub async fn new_with_config(config: Config) -> Co2VizResult<Self> {
        debug!("config: {config:?}");
        let data_path = config.data_path.clone();
        // Required because polars is blocking
        let emissions = async move {
            tokio::task::spawn_blocking(move || emissions::load_emissions(data_path))
                .await
                .map_err(|e| Co2VizError::from(anyhow!(e)))?
        };
        let (emissions, world) = try_join!(emissions, world::load_world_with_fallback(&config))?;
        Ok(Self::from_parts(config, Arc::new(emissions), world))
    }

    /// Setup the explorer from already loaded tables
    pub fn from_parts(config: Config, emissions: Arc<DataFrame>, world: World) -> Self {
        Self {
            config,
            emissions,
            world,
        }
    }

    pub fn years(&self) -> Co2VizResult<Vec<i32>> {
        emissions::available_years(&self.emissions)
    }

    pub fn countries(&self) -> Co2VizResult<Vec<String>> {
        emissions::available_countries(&self.emissions)
    }

    /// Top `n` emitters of `year` by `metric`
    pub fn top_emitters(&self, year: i32, metric: Metric, n: usize) -> Co2VizResult<DataFrame> {
        let metric = metric.resolve(&self.emissions);
        Ok(selection::top_n(&self.emissions, year, metric, n)?)
    }

    pub fn time_series(&self, countries: &[String], metric: Metric) -> Co2VizResult<DataFrame> {
        let metric = metric.resolve(&self.emissions);
        Ok(selection::time_series(&self.emissions, countries, metric)?)
    }

    /// World geometry joined with the emissions of `year`
    pub fn joined(&self, year: i32) -> Co2VizResult<JoinedYear> {
        choropleth::join_year(&self.world, &self.emissions, year)
    }

    pub fn top_figure(&self, year: i32, metric: Metric, n: usize) -> Co2VizResult<Figure> {
        let metric = metric.resolve(&self.emissions);
        figures::bar_chart(&self.top_emitters(year, metric, n)?, year, metric)
    }

    pub fn series_figure(&self, countries: &[String], metric: Metric) -> Co2VizResult<Figure> {
        let metric = metric.resolve(&self.emissions);
        figures::line_chart(&self.time_series(countries, metric)?, metric)
    }

    pub fn map_figure(&self, year: i32) -> Co2VizResult<Figure> {
        figures::choropleth_map(&self.joined(year)?, &self.world)
    }

    /// Build all dashboard charts for a selection
    pub fn dashboard(&self, selection: Selection) -> Co2VizResult<Dashboard> {
        Dashboard::build(self, selection)
    }
}
