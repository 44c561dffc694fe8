//! The dashboard page: controls plus the map, top emitters and time series charts.

use log::{debug, error};
use serde::Serialize;

use crate::config::OWID_CO2_URL;
use crate::error::{Co2VizError, Co2VizResult};
use crate::figures::{escape_html, Figure, PLOTLY_CDN};
use crate::selection::{Metric, Selection};
use crate::Co2Explorer;

pub const PAGE_TITLE: &str = "CO₂ Emissions Explorer";

/// Outcome of building one chart. A failing chart does not prevent the others from rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Chart {
    Figure { figure: Figure },
    Empty { message: String },
    Failed { message: String },
}

impl Chart {
    fn from_result(result: Co2VizResult<Figure>, name: &str) -> Self {
        match result {
            Ok(figure) => Chart::Figure { figure },
            Err(err) => {
                error!("Error generating the {name}: {err}");
                Chart::Failed {
                    message: format!("Error generating the {name}: {err}"),
                }
            }
        }
    }

    pub fn figure(&self) -> Option<&Figure> {
        match self {
            Chart::Figure { figure } => Some(figure),
            _ => None,
        }
    }

    fn to_html(&self, id: &str) -> Co2VizResult<String> {
        match self {
            Chart::Figure { figure } => figure.to_div(id),
            Chart::Empty { message } => Ok(format!(
                "<p class=\"info\">{}</p>",
                escape_html(message)
            )),
            Chart::Failed { message } => Ok(format!(
                "<p class=\"error\">{}</p>",
                escape_html(message)
            )),
        }
    }
}

/// Everything needed to render the dashboard for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub year: i32,
    pub metric: Metric,
    pub selection: Selection,
    pub years: Vec<i32>,
    pub countries: Vec<String>,
    pub map_years: Vec<i32>,
    /// Rows in the top emitters chart, the requested count when the chart is empty.
    pub top_count: usize,
    pub map: Chart,
    pub top: Chart,
    pub series: Chart,
}

impl Dashboard {
    pub fn build(explorer: &Co2Explorer, selection: Selection) -> Co2VizResult<Self> {
        let year = selection.resolve_year(&explorer.emissions)?;
        let metric = selection.metric.resolve(&explorer.emissions);
        debug!("Building dashboard for {year} ({metric}) and {:?}", selection.countries);

        let map = Chart::from_result(explorer.map_figure(year), "map");

        let mut top_count = selection.top_n();
        let top = match explorer.top_emitters(year, metric, selection.top_n()) {
            Ok(top) if top.height() == 0 => Chart::Empty {
                message: format!("No data for {year}."),
            },
            Ok(top) => {
                top_count = top.height();
                Chart::from_result(
                    crate::figures::bar_chart(&top, year, metric),
                    "top emitters chart",
                )
            }
            Err(err) => Chart::from_result(Err(err), "top emitters chart"),
        };

        let series = if selection.countries.is_empty() {
            Chart::Empty {
                message: "Select one or more countries to compare.".into(),
            }
        } else {
            Chart::from_result(
                explorer.series_figure(&selection.countries, metric),
                "time series",
            )
        };

        Ok(Self {
            year,
            metric,
            years: explorer.years()?,
            countries: explorer.countries()?,
            map_years: explorer.config.map_years.clone(),
            top_count,
            selection,
            map,
            top,
            series,
        })
    }

    fn controls(&self) -> String {
        let years = self
            .years
            .iter()
            .map(|year| {
                let selected = if *year == self.year { " selected" } else { "" };
                format!("<option value=\"{year}\"{selected}>{year}</option>")
            })
            .collect::<Vec<_>>()
            .join("");
        let countries = self
            .countries
            .iter()
            .map(|country| {
                let selected = if self.selection.countries.contains(country) {
                    " selected"
                } else {
                    ""
                };
                let country = escape_html(country);
                format!("<option value=\"{country}\"{selected}>{country}</option>")
            })
            .collect::<Vec<_>>()
            .join("");
        let per_capita = if self.metric == Metric::Co2PerCapita {
            " checked"
        } else {
            ""
        };
        format!(
            "<form class=\"controls\" method=\"get\" action=\"/\">\n\
             <h2>Controls</h2>\n\
             <label>Year <select name=\"year\" onchange=\"this.form.submit()\">{years}</select></label>\n\
             <label>Countries to compare <select name=\"country\" multiple size=\"12\">{countries}</select></label>\n\
             <label><input type=\"checkbox\" name=\"per_capita\" value=\"true\"{per_capita}> Show per capita (co2_per_capita)</label>\n\
             <button type=\"submit\">Update</button>\n\
             </form>"
        )
    }

    fn saved_maps(&self) -> String {
        let links = self
            .map_years
            .iter()
            .map(|year| format!("<li><a href=\"map_co2_{year}.html\">map_co2_{year}.html</a></li>"))
            .collect::<Vec<_>>()
            .join("");
        format!("<p>Previously exported maps:</p><ul>{links}</ul>")
    }

    /// Render the dashboard page. `interactive` adds the controls form, which needs the server.
    pub fn render_page(&self, interactive: bool) -> Co2VizResult<String> {
        let controls = if interactive {
            self.controls()
        } else {
            String::new()
        };
        let body = format!(
            "<h1>{PAGE_TITLE}</h1>\n\
             <p>Interactive maps and charts based on the Our World in Data CO₂ dataset.</p>\n\
             {controls}\n\
             <section><h2>World map of CO₂ emissions, {year}</h2>\n{map}</section>\n\
             <section><h2>Top {n} emitters in {year}</h2>\n{top}</section>\n\
             <section><h2>Time series: comparison between countries</h2>\n{series}</section>\n\
             <footer>{saved}</footer>",
            year = self.year,
            n = self.top_count,
            map = self.map.to_html("map")?,
            top = self.top.to_html("top")?,
            series = self.series.to_html("series")?,
            saved = self.saved_maps(),
        );
        Ok(page(PAGE_TITLE, &body))
    }
}

const STYLE: &str = "body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 1000px; }\n\
    .controls { display: flex; flex-wrap: wrap; gap: 1rem; align-items: flex-end; }\n\
    .controls h2 { width: 100%; margin-bottom: 0; }\n\
    .controls label { display: flex; flex-direction: column; gap: 0.25rem; }\n\
    .error { color: #b00020; }\n\
    .info { color: #555; }\n\
    code { background: #f2f2f2; padding: 0.1rem 0.3rem; }";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <script src=\"{PLOTLY_CDN}\"></script>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape_html(title)
    )
}

/// User-facing page for an error that stops the dashboard from rendering.
pub fn render_error_page(err: &Co2VizError) -> String {
    let mut body = format!(
        "<h1>{PAGE_TITLE}</h1>\n<p class=\"error\">Could not load the emissions data: {}</p>\n",
        escape_html(&err.to_string())
    );
    if err.is_missing_data() {
        body.push_str(&format!(
            "<p>Download the dataset from Our World in Data and place it in the <code>data/</code> \
             directory:</p>\n<p><code>{OWID_CO2_URL}</code></p>\n\
             <ul>\n<li>Create the <code>data/</code> directory in the project and download the CSV there.</li>\n\
             <li>Or run: <code>mkdir -p data &amp;&amp; curl -L -o data/owid-co2-data.csv {OWID_CO2_URL}</code></li>\n</ul>\n"
        ));
    }
    page(PAGE_TITLE, &body)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::selection::tests::test_emissions;
    use crate::world::tests::test_world;

    fn explorer() -> Co2Explorer {
        Co2Explorer::from_parts(Config::default(), Arc::new(test_emissions()), test_world())
    }

    fn selection(year: Option<i32>, countries: &[&str]) -> Selection {
        Selection {
            year,
            countries: countries.iter().map(|c| c.to_string()).collect(),
            ..Selection::default()
        }
    }

    #[test]
    fn dashboard_builds_all_charts() -> anyhow::Result<()> {
        let dashboard = Dashboard::build(&explorer(), selection(None, &["Chile", "Peru"]))?;
        assert_eq!(dashboard.year, 2020);
        assert!(dashboard.map.figure().is_some());
        assert!(dashboard.top.figure().is_some());
        assert_eq!(dashboard.series.figure().map(|f| f.data.len()), Some(2));
        Ok(())
    }

    #[test]
    fn year_without_data_shows_message() -> anyhow::Result<()> {
        let dashboard = Dashboard::build(&explorer(), selection(Some(1900), &[]))?;
        assert!(matches!(dashboard.top, Chart::Empty { .. }));
        assert!(matches!(dashboard.series, Chart::Empty { .. }));
        // Every country is drawn in grey
        assert!(dashboard.map.figure().is_some());
        let html = dashboard.render_page(false)?;
        assert!(html.contains("No data for 1900."));
        Ok(())
    }

    #[test]
    fn top_heading_matches_chart_rows() -> anyhow::Result<()> {
        // Four countries have 2020 values, fewer than the default of ten
        let dashboard = Dashboard::build(&explorer(), selection(Some(2020), &[]))?;
        assert_eq!(dashboard.top_count, 4);
        let html = dashboard.render_page(false)?;
        assert!(html.contains("<h2>Top 4 emitters in 2020</h2>"));
        assert!(html.contains("Top 4 CO₂ emitters (co2) in 2020"));
        assert!(!html.contains("Top 10"));
        Ok(())
    }

    #[test]
    fn interactive_page_marks_selection() -> anyhow::Result<()> {
        let dashboard = Dashboard::build(&explorer(), selection(Some(2019), &["Chile"]))?;
        let html = dashboard.render_page(true)?;
        assert!(html.contains("<option value=\"2019\" selected>2019</option>"));
        assert!(html.contains("<option value=\"Chile\" selected>Chile</option>"));
        assert!(html.contains("<option value=\"Peru\">Peru</option>"));
        assert!(html.contains("map_co2_1751.html"));
        assert!(!dashboard.render_page(false)?.contains("<form"));
        Ok(())
    }

    #[test]
    fn missing_data_page_has_instructions() {
        let err = Co2VizError::MissingDataFile(PathBuf::from("data/owid-co2-data.csv"));
        let html = render_error_page(&err);
        assert!(html.contains("curl -L -o data/owid-co2-data.csv"));
        let other = render_error_page(&Co2VizError::MissingColumn("year".into()));
        assert!(!other.contains("curl"));
    }
}
