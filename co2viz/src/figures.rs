//! Plotly figure descriptions for the three dashboard charts.
//!
//! The figures serialize to the JSON accepted by `Plotly.newPlot`, so rendering is left to
//! plotly.js in the browser.

use itertools::izip;
use serde::Serialize;
use serde_json::{json, Value};

use crate::choropleth::JoinedYear;
use crate::error::Co2VizResult;
use crate::selection::Metric;
use crate::world::World;
use crate::COL;

pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
pub const NO_DATA_COLOR: &str = "#d0d0d0";
pub const MAP_COLORSCALE: &str = "Reds";
pub const MAP_WIDTH: u32 = 900;
pub const MAP_HEIGHT: u32 = 600;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Bar(BarTrace),
    Scatter(ScatterTrace),
    Choropleth(ChoroplethTrace),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BarTrace {
    pub x: Vec<String>,
    pub y: Vec<f64>,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScatterTrace {
    pub x: Vec<i32>,
    pub y: Vec<f64>,
    pub mode: String,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChoroplethTrace {
    pub geojson: Value,
    pub featureidkey: String,
    pub locations: Vec<String>,
    pub z: Vec<f64>,
    pub text: Vec<String>,
    pub hovertemplate: String,
    pub colorscale: Value,
    pub showscale: bool,
    pub showlegend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colorbar: Option<Value>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Layout {
    pub title: Title,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<Axis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Geo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Title {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
}

impl Title {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            x: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Axis {
    pub title: Title,
}

impl Axis {
    fn titled(text: impl Into<String>) -> Self {
        Self {
            title: Title::new(text),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Projection {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Geo {
    pub projection: Projection,
    pub fitbounds: String,
    pub visible: bool,
}

impl Figure {
    pub fn to_json(&self) -> Co2VizResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Standalone HTML page showing this figure.
    pub fn to_html(&self) -> Co2VizResult<String> {
        let title = escape_html(&self.layout.title.text);
        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <script src=\"{PLOTLY_CDN}\"></script>\n</head>\n<body>\n{}\n</body>\n</html>\n",
            self.to_div("figure")?
        ))
    }

    /// A `div` with the given id and the script that draws this figure into it.
    pub fn to_div(&self, id: &str) -> Co2VizResult<String> {
        // `</` would end the script element early
        let json = self.to_json()?.replace("</", "<\\/");
        Ok(format!(
            "<div id=\"{id}\" class=\"chart\"></div>\n<script>(function () {{\n  var figure = {json};\n  Plotly.newPlot(\"{id}\", figure.data, figure.layout, {{responsive: true}});\n}})();</script>",
        ))
    }
}

pub fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Bar chart of a top emitters table as returned by `selection::top_n`.
pub fn bar_chart(
    top: &polars::frame::DataFrame,
    year: i32,
    metric: Metric,
) -> Co2VizResult<Figure> {
    let countries = top.column(COL::COUNTRY)?.str()?;
    let values = top.column(metric.column())?.f64()?;
    let (x, y): (Vec<String>, Vec<f64>) = izip!(countries, values)
        .filter_map(|(country, value)| Some((country?.to_string(), value?)))
        .unzip();
    Ok(Figure {
        data: vec![Trace::Bar(BarTrace {
            x,
            y,
            name: metric.to_string(),
        })],
        layout: Layout {
            title: Title::new(format!(
                "Top {} CO₂ emitters ({metric}) in {year}",
                top.height()
            )),
            xaxis: Some(Axis::titled("Country")),
            yaxis: Some(Axis::titled(metric.label())),
            ..Layout::default()
        },
    })
}

/// Line chart with one trace per country of a table returned by `selection::time_series`.
pub fn line_chart(series: &polars::frame::DataFrame, metric: Metric) -> Co2VizResult<Figure> {
    let countries = series.column(COL::COUNTRY)?.str()?;
    let years = series.column(COL::YEAR)?.i32()?;
    let values = series.column(metric.column())?.f64()?;

    let mut traces: Vec<ScatterTrace> = vec![];
    for (country, year, value) in izip!(countries, years, values) {
        let (Some(country), Some(year), Some(value)) = (country, year, value) else {
            continue;
        };
        // Rows arrive grouped by country
        if let Some(trace) = traces.last_mut().filter(|trace| trace.name == country) {
            trace.x.push(year);
            trace.y.push(value);
            continue;
        }
        traces.push(ScatterTrace {
            x: vec![year],
            y: vec![value],
            mode: "lines".into(),
            name: country.to_string(),
        });
    }

    Ok(Figure {
        data: traces.into_iter().map(Trace::Scatter).collect(),
        layout: Layout {
            title: Title::new("CO₂ emissions over time"),
            xaxis: Some(Axis::titled("Year")),
            yaxis: Some(Axis::titled(metric.label())),
            ..Layout::default()
        },
    })
}

/// World map coloured by CO2, with countries lacking data drawn in a flat neutral colour.
pub fn choropleth_map(joined: &JoinedYear, world: &World) -> Co2VizResult<Figure> {
    let geojson = serde_json::to_value(world.feature_collection()?)?;
    let (with_data, without_data) = joined.partition()?;

    let mut locations = vec![];
    let mut text = vec![];
    let mut z = vec![];
    for (code, country, value) in izip!(
        with_data.column(COL::CODE)?.str()?,
        with_data.column(COL::COUNTRY)?.str()?,
        with_data.column(COL::CO2)?.f64()?
    ) {
        if let (Some(code), Some(value)) = (code, value) {
            locations.push(code.to_string());
            text.push(country.unwrap_or(code).to_string());
            z.push(value);
        }
    }
    let data_trace = ChoroplethTrace {
        geojson: geojson.clone(),
        featureidkey: format!("properties.{}", COL::CODE),
        locations,
        z,
        text,
        hovertemplate: "<b>%{text}</b><br>CO₂: %{z}<extra></extra>".into(),
        colorscale: json!(MAP_COLORSCALE),
        showscale: true,
        showlegend: false,
        colorbar: Some(json!({ "title": { "text": COL::CO2 } })),
    };

    let mut grey_locations = vec![];
    let mut grey_text = vec![];
    for (code, country) in izip!(
        without_data.column(COL::CODE)?.str()?,
        without_data.column(COL::COUNTRY)?.str()?
    ) {
        if let Some(code) = code {
            grey_locations.push(code.to_string());
            grey_text.push(country.unwrap_or(code).to_string());
        }
    }
    let no_data_trace = ChoroplethTrace {
        geojson,
        featureidkey: format!("properties.{}", COL::CODE),
        z: vec![0.0; grey_locations.len()],
        locations: grey_locations,
        text: grey_text,
        hovertemplate: "<b>%{text}</b><br>No data<extra></extra>".into(),
        colorscale: json!([[0.0, NO_DATA_COLOR], [1.0, NO_DATA_COLOR]]),
        showscale: false,
        showlegend: false,
        colorbar: None,
    };

    Ok(Figure {
        data: vec![
            Trace::Choropleth(data_trace),
            Trace::Choropleth(no_data_trace),
        ],
        layout: Layout {
            title: Title {
                text: format!("CO₂ emissions by country in {}", joined.year),
                x: Some(0.5),
            },
            geo: Some(Geo {
                projection: Projection {
                    kind: "natural earth".into(),
                },
                fitbounds: "locations".into(),
                visible: false,
            }),
            width: Some(MAP_WIDTH),
            height: Some(MAP_HEIGHT),
            ..Layout::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choropleth::join_year;
    use crate::selection::tests::test_emissions;
    use crate::selection::{time_series, top_n};
    use crate::world::tests::test_world;

    #[test]
    fn bar_chart_follows_top_table() -> anyhow::Result<()> {
        let top = top_n(&test_emissions(), 2020, Metric::Co2, 10)?;
        let figure = bar_chart(&top, 2020, Metric::Co2)?;
        let Trace::Bar(bar) = &figure.data[0] else {
            panic!("expected a bar trace");
        };
        assert_eq!(bar.x, vec!["Brazil", "Argentina", "Chile", "Peru"]);
        assert_eq!(bar.y, vec![470.0, 170.0, 80.0, 55.0]);
        assert_eq!(figure.layout.title.text, "Top 4 CO₂ emitters (co2) in 2020");
        Ok(())
    }

    #[test]
    fn line_chart_has_a_trace_per_country() -> anyhow::Result<()> {
        let countries = vec!["Chile".to_string(), "Argentina".to_string()];
        let series = time_series(&test_emissions(), &countries, Metric::Co2)?;
        let figure = line_chart(&series, Metric::Co2)?;
        let names: Vec<&str> = figure
            .data
            .iter()
            .map(|trace| match trace {
                Trace::Scatter(scatter) => scatter.name.as_str(),
                _ => panic!("expected scatter traces"),
            })
            .collect();
        assert_eq!(names, vec!["Argentina", "Chile"]);
        if let Trace::Scatter(chile) = &figure.data[1] {
            assert_eq!(chile.x, vec![2019, 2020]);
            assert_eq!(chile.y, vec![85.0, 80.0]);
        }
        Ok(())
    }

    #[test]
    fn choropleth_has_data_and_grey_traces() -> anyhow::Result<()> {
        let world = test_world();
        let joined = join_year(&world, &test_emissions(), 2019)?;
        let figure = choropleth_map(&joined, &world)?;
        assert_eq!(figure.data.len(), 2);
        let (Trace::Choropleth(with), Trace::Choropleth(grey)) = (&figure.data[0], &figure.data[1])
        else {
            panic!("expected choropleth traces");
        };
        assert_eq!(with.locations, vec!["CHL", "ARG"]);
        assert_eq!(with.z, vec![85.0, 180.0]);
        assert_eq!(grey.locations, vec!["PER"]);
        assert!(!grey.showscale);
        assert_eq!(with.locations.len() + grey.locations.len(), world.len());
        Ok(())
    }

    #[test]
    fn choropleth_serializes_to_plotly_json() -> anyhow::Result<()> {
        let world = test_world();
        let joined = join_year(&world, &test_emissions(), 2020)?;
        let value: Value = serde_json::from_str(&choropleth_map(&joined, &world)?.to_json()?)?;
        assert_eq!(value["data"][0]["type"], json!("choropleth"));
        assert_eq!(value["data"][0]["featureidkey"], json!("properties.code"));
        assert_eq!(value["data"][0]["colorscale"], json!("Reds"));
        assert_eq!(value["data"][1]["colorscale"][0][1], json!(NO_DATA_COLOR));
        assert_eq!(value["layout"]["geo"]["projection"]["type"], json!("natural earth"));
        assert_eq!(value["layout"]["geo"]["fitbounds"], json!("locations"));
        assert_eq!(value["layout"]["title"]["x"], json!(0.5));
        assert_eq!(value["layout"]["width"], json!(900));
        assert!(value["layout"].get("xaxis").is_none());
        Ok(())
    }

    #[test]
    fn html_embeds_plotly_and_escapes_script_end() -> anyhow::Result<()> {
        let figure = Figure {
            data: vec![Trace::Bar(BarTrace {
                x: vec!["</script>".into()],
                y: vec![1.0],
                name: "co2".into(),
            })],
            layout: Layout {
                title: Title::new("A & B"),
                ..Layout::default()
            },
        };
        let html = figure.to_html()?;
        assert!(html.contains(PLOTLY_CDN));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(!html.contains("\"</script>\""));
        Ok(())
    }
}
