//! HTTP server for the interactive dashboard.
//!
//! Every interaction reloads the page with the new selection as query parameters, and the page is
//! rebuilt from the cached emissions table.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use co2viz::{
    config::Config,
    dashboard::render_error_page,
    emissions::EmissionsCache,
    error::{Co2VizError, Co2VizResult},
    selection::{Metric, Selection},
    world::{load_world_with_fallback, World},
    Co2Explorer,
};
use log::{error, info};
use serde_json::json;

use crate::error::Co2VizCliResult;

/// Raw query parameters. Pairs rather than a map so that `country` can repeat.
type Params = Vec<(String, String)>;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    cache: Arc<EmissionsCache>,
    world: Arc<World>,
}

impl AppState {
    pub fn new(config: Config, world: World) -> Self {
        Self {
            config: Arc::new(config),
            cache: Arc::new(EmissionsCache::new()),
            world: Arc::new(world),
        }
    }

    /// Load the world geometry once. The emissions CSV is read on the first request so that a
    /// missing file is reported in the browser.
    pub async fn load(config: Config) -> Co2VizCliResult<Self> {
        let world = load_world_with_fallback(&config).await?;
        Ok(Self::new(config, world))
    }

    fn explorer(&self) -> Co2VizResult<Co2Explorer> {
        let emissions = self.cache.get_or_load(&self.config.data_path)?;
        Ok(Co2Explorer::from_parts(
            (*self.config).clone(),
            emissions,
            (*self.world).clone(),
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/years", get(years))
        .route("/api/countries", get(countries))
        .route("/api/figures/top", get(top_figure))
        .route("/api/figures/series", get(series_figure))
        .route("/api/figures/map", get(map_figure))
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Co2VizCliResult<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow!("Invalid address {host}:{port}: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");
    println!("Dashboard running at http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the selection from the query string. An empty query selects the configured countries;
/// a submitted form without any `country` selects none.
fn selection_from_params(params: &Params, config: &Config) -> Result<Selection, String> {
    let mut selection = Selection {
        top_n: Some(config.top_n),
        ..Selection::default()
    };
    if params.is_empty() {
        selection.countries = config.default_countries.clone();
        return Ok(selection);
    }
    for (key, value) in params {
        match key.as_str() {
            "year" if value.is_empty() => {}
            "year" => {
                selection.year = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid year: {value}"))?,
                )
            }
            "country" => selection.countries.push(value.clone()),
            "countries" => selection.countries.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|country| !country.is_empty())
                    .map(str::to_string),
            ),
            "per_capita" => {
                let per_capita = matches!(value.as_str(), "true" | "on" | "1");
                selection.metric = Metric::from_per_capita(per_capita);
            }
            "metric" => {
                selection.metric = value
                    .parse()
                    .map_err(|_| format!("Invalid metric: {value}"))?
            }
            "top_n" => {
                selection.top_n = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid top_n: {value}"))?,
                )
            }
            _ => {}
        }
    }
    Ok(selection)
}

fn status_for(err: &Co2VizError) -> StatusCode {
    if err.is_missing_data() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Run blocking polars work off the async runtime.
async fn blocking<T, F>(state: AppState, f: F) -> Co2VizResult<T>
where
    T: Send + 'static,
    F: FnOnce(Co2Explorer) -> Co2VizResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(state.explorer()?))
        .await
        .map_err(|e| Co2VizError::from(anyhow!(e)))?
}

/// Answer a JSON endpoint with the result of `f`.
async fn json_response<T, F>(state: AppState, f: F) -> Response
where
    T: serde::Serialize + Send + 'static,
    F: FnOnce(Co2Explorer) -> Co2VizResult<T> + Send + 'static,
{
    match blocking(state, f).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => {
            error!("{err}");
            json_error(status_for(&err), err.to_string())
        }
    }
}

async fn index(State(state): State<AppState>, Query(params): Query<Params>) -> Response {
    let selection = match selection_from_params(&params, &state.config) {
        Ok(selection) => selection,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    let page = blocking(state, move |explorer| {
        explorer.dashboard(selection)?.render_page(true)
    })
    .await;
    match page {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!("{err}");
            (status_for(&err), Html(render_error_page(&err))).into_response()
        }
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn years(State(state): State<AppState>) -> Response {
    json_response(state, |explorer| explorer.years()).await
}

async fn countries(State(state): State<AppState>) -> Response {
    json_response(state, |explorer| explorer.countries()).await
}

async fn top_figure(State(state): State<AppState>, Query(params): Query<Params>) -> Response {
    let selection = match selection_from_params(&params, &state.config) {
        Ok(selection) => selection,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message),
    };
    json_response(state, move |explorer| {
        let year = selection.resolve_year(&explorer.emissions)?;
        explorer.top_figure(year, selection.metric, selection.top_n())
    })
    .await
}

async fn series_figure(State(state): State<AppState>, Query(params): Query<Params>) -> Response {
    let selection = match selection_from_params(&params, &state.config) {
        Ok(selection) => selection,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message),
    };
    json_response(state, move |explorer| {
        explorer.series_figure(&selection.countries, selection.metric)
    })
    .await
}

async fn map_figure(State(state): State<AppState>, Query(params): Query<Params>) -> Response {
    let selection = match selection_from_params(&params, &state.config) {
        Ok(selection) => selection,
        Err(message) => return json_error(StatusCode::BAD_REQUEST, message),
    };
    json_response(state, move |explorer| {
        let year = selection.resolve_year(&explorer.emissions)?;
        explorer.map_figure(year)
    })
    .await
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::cli::tests::test_config;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    async fn test_state(config: Config) -> AppState {
        AppState::load(config).await.unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn empty_query_selects_default_countries() {
        let config = Config::default();
        let selection = selection_from_params(&Params::new(), &config).unwrap();
        assert_eq!(selection.countries, config.default_countries);
        assert_eq!(selection.year, None);
        assert_eq!(selection.metric, Metric::Co2);
    }

    #[test]
    fn submitted_form_is_parsed() {
        let config = Config::default();
        let selection = selection_from_params(
            &params(&[
                ("year", "2020"),
                ("country", "Chile"),
                ("country", "Peru"),
                ("per_capita", "true"),
            ]),
            &config,
        )
        .unwrap();
        assert_eq!(selection.year, Some(2020));
        assert_eq!(selection.countries, vec!["Chile", "Peru"]);
        assert_eq!(selection.metric, Metric::Co2PerCapita);

        // Deselecting every country is kept as an empty selection
        let selection = selection_from_params(&params(&[("year", "2020")]), &config).unwrap();
        assert!(selection.countries.is_empty());

        assert!(selection_from_params(&params(&[("year", "abc")]), &config).is_err());
    }

    #[tokio::test]
    async fn index_renders_dashboard() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(test_config(dir.path())).await;
        let response = index(
            State(state),
            Query(params(&[("year", "2019"), ("country", "Chile")])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("<option value=\"2019\" selected>2019</option>"));
        assert!(html.contains("<option value=\"Chile\" selected>Chile</option>"));
    }

    #[tokio::test]
    async fn index_explains_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_path: dir.path().join("missing.csv"),
            ..test_config(dir.path())
        };
        let response = index(State(test_state(config).await), Query(vec![])).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let html = body_string(response).await;
        assert!(html.contains("curl -L -o data/owid-co2-data.csv"));
    }

    #[tokio::test]
    async fn api_returns_years_and_figures() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(test_config(dir.path())).await;

        let response = years(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let years: Vec<i32> = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(years, vec![2019, 2020]);

        let response = top_figure(State(state.clone()), Query(params(&[("top_n", "2")]))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let figure: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(figure["data"][0]["type"], "bar");
        assert_eq!(figure["data"][0]["x"].as_array().map(Vec::len), Some(2));

        let response = map_figure(State(state), Query(params(&[("year", "abc")]))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
