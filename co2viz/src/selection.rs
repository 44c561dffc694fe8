//! Year and country filters over an emissions table.

use anyhow::anyhow;
use itertools::Itertools;
use log::{debug, warn};
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::emissions::available_years;
use crate::error::Co2VizResult;
use crate::COL;

/// Number of rows shown in the top emitters chart by default.
pub const DEFAULT_TOP_N: usize = 10;

/// The value plotted in the charts.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Co2,
    Co2PerCapita,
}

impl Metric {
    pub fn from_per_capita(per_capita: bool) -> Self {
        if per_capita {
            Metric::Co2PerCapita
        } else {
            Metric::Co2
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Metric::Co2 => COL::CO2,
            Metric::Co2PerCapita => COL::CO2_PER_CAPITA,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Co2 => "CO₂ (million tonnes)",
            Metric::Co2PerCapita => "CO₂ per capita (tonnes)",
        }
    }

    /// Falls back to total CO2 when the table has no per capita column.
    pub fn resolve(self, df: &DataFrame) -> Self {
        if df.get_column_names().contains(&self.column()) {
            self
        } else {
            warn!(
                "The dataset has no '{}' column, showing total CO2 instead",
                self.column()
            );
            Metric::Co2
        }
    }
}

/// What the user picked in the dashboard controls.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    /// `None` selects the latest year of the dataset.
    pub year: Option<i32>,
    pub countries: Vec<String>,
    pub metric: Metric,
    pub top_n: Option<usize>,
}

impl Selection {
    pub fn top_n(&self) -> usize {
        self.top_n.unwrap_or(DEFAULT_TOP_N)
    }

    /// The selected year, or the latest year present in `df`.
    pub fn resolve_year(&self, df: &DataFrame) -> Co2VizResult<i32> {
        match self.year {
            Some(year) => Ok(year),
            None => available_years(df)?
                .last()
                .copied()
                .ok_or_else(|| anyhow!("The emissions table has no years").into()),
        }
    }
}

pub fn year_expr(year: i32) -> Expr {
    col(COL::YEAR).eq(lit(year))
}

pub fn countries_expr(countries: &[String]) -> Expr {
    let countries = Series::new("countries", countries.iter().map(String::as_str).collect_vec());
    col(COL::COUNTRY).is_in(lit(countries))
}

/// Rows of `df` for a single year.
pub fn filter_year(df: &DataFrame, year: i32) -> PolarsResult<DataFrame> {
    df.clone().lazy().filter(year_expr(year)).collect()
}

/// Rows of `df` whose country is one of `countries`.
pub fn filter_countries(df: &DataFrame, countries: &[String]) -> PolarsResult<DataFrame> {
    df.clone().lazy().filter(countries_expr(countries)).collect()
}

/// At most `n` rows of `year` with a value for `metric`, sorted by that value descending.
pub fn top_n(df: &DataFrame, year: i32, metric: Metric, n: usize) -> PolarsResult<DataFrame> {
    let value = metric.column();
    let result = df
        .clone()
        .lazy()
        .filter(year_expr(year).and(col(value).is_not_null()))
        .sort(
            [value],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true),
        )
        .limit(n as IdxSize)
        .select([col(COL::COUNTRY), col(COL::CODE), col(COL::YEAR), col(value)])
        .collect()?;
    debug!("Top {n} for {year}: {:?}", result.shape());
    Ok(result)
}

/// Yearly values of `metric` for the given countries, ordered by country then year.
pub fn time_series(df: &DataFrame, countries: &[String], metric: Metric) -> PolarsResult<DataFrame> {
    let value = metric.column();
    df.clone()
        .lazy()
        .filter(countries_expr(countries).and(col(value).is_not_null()))
        .select([col(COL::COUNTRY), col(COL::YEAR), col(value)])
        .sort([COL::COUNTRY, COL::YEAR], SortMultipleOptions::default())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;

    use polars::df;

    use super::*;

    pub(crate) fn test_emissions() -> DataFrame {
        df!(
            COL::COUNTRY => &["Chile", "Chile", "Argentina", "Argentina", "Brazil", "Peru", "Peru"],
            COL::CODE => &["CHL", "CHL", "ARG", "ARG", "BRA", "PER", "PER"],
            COL::YEAR => &[2019i32, 2020, 2019, 2020, 2020, 2019, 2020],
            COL::CO2 => &[Some(85.0), Some(80.0), Some(180.0), Some(170.0), Some(470.0), None, Some(55.0)],
            COL::CO2_PER_CAPITA => &[Some(4.4), Some(4.1), Some(4.0), Some(3.7), Some(2.2), None, Some(1.6)]
        )
        .unwrap()
    }

    /// One row per country for two years, more countries than the default top N.
    fn many_countries() -> DataFrame {
        let countries = (0..15).map(|i| format!("Country {i}")).collect_vec();
        let codes = (0..15).map(|i| format!("C{i:02}")).collect_vec();
        let mut all_countries = countries.clone();
        all_countries.extend(countries);
        let mut all_codes = codes.clone();
        all_codes.extend(codes);
        let years = (0..30).map(|i| if i < 15 { 2000i32 } else { 2001 }).collect_vec();
        let values = (0..30).map(|i| ((i * 37) % 23) as f64).collect_vec();
        df!(
            COL::COUNTRY => all_countries,
            COL::CODE => all_codes,
            COL::YEAR => years,
            COL::CO2 => values
        )
        .unwrap()
    }

    #[test]
    fn top_n_is_bounded_and_descending_for_every_year() -> anyhow::Result<()> {
        let df = many_countries();
        for year in available_years(&df)? {
            let top = top_n(&df, year, Metric::Co2, DEFAULT_TOP_N)?;
            assert!(top.height() <= DEFAULT_TOP_N);
            let values: Vec<f64> = top.column(COL::CO2)?.f64()?.into_no_null_iter().collect();
            assert!(
                values.windows(2).all(|w| w[0] >= w[1]),
                "values should be sorted descending: {values:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn top_n_skips_missing_values() -> anyhow::Result<()> {
        let top = top_n(&test_emissions(), 2019, Metric::Co2, 10)?;
        let countries: Vec<&str> = top.column(COL::COUNTRY)?.str()?.into_no_null_iter().collect();
        assert_eq!(countries, vec!["Argentina", "Chile"]);
        Ok(())
    }

    #[test]
    fn top_n_uses_selected_metric() -> anyhow::Result<()> {
        let top = top_n(&test_emissions(), 2020, Metric::Co2PerCapita, 2)?;
        let countries: Vec<&str> = top.column(COL::COUNTRY)?.str()?.into_no_null_iter().collect();
        assert_eq!(countries, vec!["Chile", "Argentina"]);
        Ok(())
    }

    #[test]
    fn year_and_country_filters() -> anyhow::Result<()> {
        let df = test_emissions();
        assert_eq!(filter_year(&df, 2020)?.height(), 4);
        assert_eq!(filter_year(&df, 1900)?.height(), 0);
        let selected = filter_countries(&df, &["Chile".to_string(), "Peru".to_string()])?;
        assert_eq!(selected.height(), 4);
        Ok(())
    }

    #[test]
    fn time_series_is_ordered() -> anyhow::Result<()> {
        let df = test_emissions();
        let series = time_series(&df, &["Peru".to_string(), "Chile".to_string()], Metric::Co2)?;
        let years: Vec<i32> = series.column(COL::YEAR)?.i32()?.into_no_null_iter().collect();
        let countries: Vec<&str> = series.column(COL::COUNTRY)?.str()?.into_no_null_iter().collect();
        assert_eq!(countries, vec!["Chile", "Chile", "Peru"]);
        assert_eq!(years, vec![2019, 2020, 2020]);
        Ok(())
    }

    #[test]
    fn metric_falls_back_without_per_capita() {
        let df = test_emissions().drop(COL::CO2_PER_CAPITA).unwrap();
        assert_eq!(Metric::Co2PerCapita.resolve(&df), Metric::Co2);
        assert_eq!(Metric::Co2PerCapita.resolve(&test_emissions()), Metric::Co2PerCapita);
    }

    #[test]
    fn metric_parses_from_str() {
        assert_eq!(Metric::from_str("co2_per_capita").unwrap(), Metric::Co2PerCapita);
        assert_eq!(Metric::Co2.to_string(), "co2");
    }

    #[test]
    fn missing_year_selects_latest() -> anyhow::Result<()> {
        let selection = Selection::default();
        assert_eq!(selection.resolve_year(&test_emissions())?, 2020);
        assert_eq!(selection.top_n(), DEFAULT_TOP_N);
        Ok(())
    }
}
