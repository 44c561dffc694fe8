use co2viz::{selection::Metric, COL};
use comfy_table::{presets::NOTHING, *};
use itertools::{izip, Itertools};
use polars::frame::DataFrame;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        )
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn format_value(value: Option<f64>) -> String {
    value.map(|value| format!("{value:.3}")).unwrap_or_default()
}

fn right_align(table: &mut Table, index: usize) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(CellAlignment::Right);
    }
}

/// Ranked table of the top emitters of a year.
pub fn display_top(top: &DataFrame, metric: Metric) -> anyhow::Result<()> {
    let mut table = new_table(&["#", "Country", "ISO-3", "Year", metric.label()]);
    for (rank, (country, code, year, value)) in izip!(
        top.column(COL::COUNTRY)?.str()?,
        top.column(COL::CODE)?.str()?,
        top.column(COL::YEAR)?.i32()?,
        top.column(metric.column())?.f64()?,
    )
    .enumerate()
    {
        table.add_row(vec![
            (rank + 1).to_string(),
            country.unwrap_or_default().to_string(),
            code.unwrap_or_default().to_string(),
            year.map(|year| year.to_string()).unwrap_or_default(),
            format_value(value),
        ]);
    }
    right_align(&mut table, 0);
    right_align(&mut table, 4);
    println!("\n{}", table);
    Ok(())
}

pub fn display_series(series: &DataFrame, metric: Metric) -> anyhow::Result<()> {
    let mut table = new_table(&["Country", "Year", metric.label()]);
    for (country, year, value) in izip!(
        series.column(COL::COUNTRY)?.str()?,
        series.column(COL::YEAR)?.i32()?,
        series.column(metric.column())?.f64()?,
    ) {
        table.add_row(vec![
            country.unwrap_or_default().to_string(),
            year.map(|year| year.to_string()).unwrap_or_default(),
            format_value(value),
        ]);
    }
    right_align(&mut table, 2);
    println!("\n{}", table);
    Ok(())
}

/// The joined map table without its geometry column.
pub fn display_joined(joined: &DataFrame) -> anyhow::Result<()> {
    let mut table = new_table(&["ISO-3", "Country", Metric::Co2.label(), "Has data"]);
    for (code, country, co2, has_data) in izip!(
        joined.column(COL::CODE)?.str()?,
        joined.column(COL::COUNTRY)?.str()?,
        joined.column(COL::CO2)?.f64()?,
        joined.column(COL::HAS_DATA)?.bool()?,
    ) {
        table.add_row(vec![
            code.unwrap_or_default().to_string(),
            country.unwrap_or_default().to_string(),
            format_value(co2),
            if has_data.unwrap_or_default() { "yes" } else { "no" }.to_string(),
        ]);
    }
    right_align(&mut table, 2);
    println!("\n{}", table);
    Ok(())
}

pub fn display_years(years: &[i32]) {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) => {
            println!("\n{} years available, from {first} to {last}:", years.len());
            println!("{}", years.iter().join(", "));
        }
        _ => println!("\nNo years available"),
    }
}

pub fn display_countries(countries: &[String]) {
    let mut table = new_table(&["Country"]);
    for country in countries {
        table.add_row(vec![country.as_str()]);
    }
    println!("\n{}", table);
}
