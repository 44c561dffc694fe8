use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use co2viz::{
    config::Config,
    emissions::{self, load_emissions},
    formatters::{OutputFormatter, OutputGenerator, TableFormat},
    selection::{self, Metric, Selection},
    Co2Explorer,
};
use enum_dispatch::enum_dispatch;
use log::{debug, error, info};
use polars::frame::DataFrame;
use spinners::{Spinner, Spinners};

use crate::display::{display_countries, display_joined, display_series, display_top, display_years};
use crate::error::{Co2VizCliError, Co2VizCliResult};
use crate::server;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_EMISSIONS_STRING: &str = "Loading emissions data";
const LOADING_ALL_STRING: &str = "Loading emissions data and world geometry";

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(spinner: Option<Spinner>) {
    if let Some(mut s) = spinner {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Load the emissions CSV only, for commands that do not draw the map.
async fn load_emissions_only(config: &Config, quiet: bool) -> Co2VizCliResult<Arc<DataFrame>> {
    let sp = start_spinner(quiet, LOADING_EMISSIONS_STRING);
    let data_path = config.data_path.clone();
    // Required because polars is blocking
    let result = tokio::task::spawn_blocking(move || load_emissions(data_path))
        .await
        .map_err(|e| anyhow!(e))?;
    stop_spinner(sp);
    Ok(Arc::new(result?))
}

async fn load_explorer(config: Config, quiet: bool) -> Co2VizCliResult<Co2Explorer> {
    let sp = start_spinner(quiet, LOADING_ALL_STRING);
    let result = Co2Explorer::new_with_config(config).await;
    stop_spinner(sp);
    Ok(result?)
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> Co2VizCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

fn write_html<U: AsRef<Path>>(html: &str, output_file: U) -> Co2VizCliResult<()> {
    let output_file = output_file.as_ref();
    if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output_file, html)
        .with_context(|| format!("Failed to write {}", output_file.display()))?;
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()>;
}

/// The `maps` command exports one standalone choropleth HTML file per year.
#[derive(Args, Debug)]
pub struct MapsCommand {
    #[arg(
        short = 'y',
        long,
        value_delimiter = ',',
        help = "Years to export, comma separated. Defaults to the configured map years"
    )]
    years: Vec<i32>,
    #[arg(short = 'o', long, help = "Directory to write the maps to")]
    output_dir: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

impl MapsCommand {
    fn map_path(output_dir: &Path, year: i32) -> PathBuf {
        output_dir.join(format!("map_co2_{year}.html"))
    }
}

impl RunCommand for MapsCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `maps` subcommand");
        let years = if self.years.is_empty() {
            config.map_years.clone()
        } else {
            self.years.clone()
        };
        let output_dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output_dir.clone());
        std::fs::create_dir_all(&output_dir)?;
        let explorer = load_explorer(config, self.quiet).await?;

        // A failing year does not stop the others from being written
        for year in years {
            let path = Self::map_path(&output_dir, year);
            match explorer
                .map_figure(year)
                .and_then(|figure| figure.to_html())
                .map_err(Co2VizCliError::from)
                .and_then(|html| write_html(&html, &path))
            {
                Ok(()) => println!("Saved {}", path.display()),
                Err(err) => error!("Error generating map for {year}: {err}"),
            }
        }
        Ok(())
    }
}

/// Arguments shared by the commands that select a year and a metric.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[arg(short = 'y', long, help = "Year to show. Defaults to the latest year in the data")]
    year: Option<i32>,
    #[arg(
        short = 'c',
        long = "country",
        help = "Countries to compare in the time series. Can be repeated"
    )]
    countries: Vec<String>,
    #[arg(long, help = "Use CO₂ per capita instead of total CO₂")]
    per_capita: bool,
    #[arg(short = 'n', long, help = "Number of top emitters to show")]
    top_n: Option<usize>,
}

impl SelectionArgs {
    fn to_selection(&self, config: &Config) -> Selection {
        Selection {
            year: self.year,
            countries: if self.countries.is_empty() {
                config.default_countries.clone()
            } else {
                self.countries.clone()
            },
            metric: Metric::from_per_capita(self.per_capita),
            top_n: Some(self.top_n.unwrap_or(config.top_n)),
        }
    }
}

/// The `dashboard` command writes a static dashboard page for one selection.
#[derive(Args, Debug)]
pub struct DashboardCommand {
    #[command(flatten)]
    selection_args: SelectionArgs,
    #[arg(
        short = 'o',
        long,
        default_value = "dashboard.html",
        help = "Output file to place the page"
    )]
    output_file: PathBuf,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DashboardCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `dashboard` subcommand");
        let selection = self.selection_args.to_selection(&config);
        let explorer = load_explorer(config, self.quiet).await?;
        let html = explorer.dashboard(selection)?.render_page(false)?;
        write_html(&html, &self.output_file)?;
        println!("Saved {}", self.output_file.display());
        Ok(())
    }
}

/// The `top` command lists the largest emitters of a year.
#[derive(Args, Debug)]
pub struct TopCommand {
    #[arg(short = 'y', long, help = "Year to rank. Defaults to the latest year in the data")]
    year: Option<i32>,
    #[arg(short = 'n', long, help = "Number of countries to show")]
    top_n: Option<usize>,
    #[arg(long, help = "Rank by CO₂ per capita instead of total CO₂")]
    per_capita: bool,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json",
        default_value = "table",
        help = "Output format"
    )]
    output_format: TableFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for TopCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `top` subcommand");
        let df = load_emissions_only(&config, self.quiet).await?;
        let selection = Selection {
            year: self.year,
            ..Selection::default()
        };
        let year = selection.resolve_year(&df)?;
        let metric = Metric::from_per_capita(self.per_capita).resolve(&df);
        let top = selection::top_n(&df, year, metric, self.top_n.unwrap_or(config.top_n))?;
        debug!("{top:?}");
        if top.height() == 0 {
            println!("No data for {year}.");
            return Ok(());
        }
        match self.output_format {
            TableFormat::Table => {
                println!("\nTop {} emitters in {year}:", top.height());
                display_top(&top, metric)?
            }
            format => {
                let formatter: OutputFormatter = format.try_into()?;
                write_output(formatter, top, self.output_file.as_deref())?
            }
        }
        Ok(())
    }
}

/// The `series` command prints the yearly values of a set of countries.
#[derive(Args, Debug)]
pub struct SeriesCommand {
    #[arg(
        short = 'c',
        long = "country",
        help = "Countries to compare. Can be repeated. Defaults to the configured countries"
    )]
    countries: Vec<String>,
    #[arg(long, help = "Use CO₂ per capita instead of total CO₂")]
    per_capita: bool,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json",
        default_value = "table",
        help = "Output format"
    )]
    output_format: TableFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for SeriesCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `series` subcommand");
        let countries = if self.countries.is_empty() {
            config.default_countries.clone()
        } else {
            self.countries.clone()
        };
        let df = load_emissions_only(&config, self.quiet).await?;
        let metric = Metric::from_per_capita(self.per_capita).resolve(&df);
        let series = selection::time_series(&df, &countries, metric)?;
        match self.output_format {
            TableFormat::Table => display_series(&series, metric)?,
            format => {
                let formatter: OutputFormatter = format.try_into()?;
                write_output(formatter, series, self.output_file.as_deref())?
            }
        }
        Ok(())
    }
}

/// The `years` command lists the years present in the emissions data.
#[derive(Args, Debug)]
pub struct YearsCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for YearsCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `years` subcommand");
        let df = load_emissions_only(&config, self.quiet).await?;
        display_years(&emissions::available_years(&df)?);
        Ok(())
    }
}

/// The `countries` command lists the countries present in the emissions data.
#[derive(Args, Debug)]
pub struct CountriesCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CountriesCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `countries` subcommand");
        let df = load_emissions_only(&config, self.quiet).await?;
        println!("\nThe following countries are available:");
        display_countries(&emissions::available_countries(&df)?);
        Ok(())
    }
}

/// The `joined` command outputs the world geometry joined with one year of emissions.
#[derive(Args, Debug)]
pub struct JoinedCommand {
    #[arg(short = 'y', long, help = "Year to join. Defaults to the latest year in the data")]
    year: Option<i32>,
    #[arg(
        short = 'f',
        long,
        value_name = "geojson|csv|json|table",
        default_value = "geojson",
        help = "Output format"
    )]
    output_format: TableFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for JoinedCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `joined` subcommand");
        let explorer = load_explorer(config, self.quiet).await?;
        let year = Selection {
            year: self.year,
            ..Selection::default()
        }
        .resolve_year(&explorer.emissions)?;
        let joined = explorer.joined(year)?;
        match self.output_format {
            TableFormat::Table => display_joined(joined.as_df())?,
            format => {
                let formatter: OutputFormatter = format.try_into()?;
                write_output(formatter, joined.df, self.output_file.as_deref())?
            }
        }
        Ok(())
    }
}

/// The `serve` command runs the interactive dashboard.
#[derive(Args, Debug)]
pub struct ServeCommand {
    #[arg(long, default_value = "127.0.0.1", help = "Address to listen on")]
    host: String,
    #[arg(short = 'p', long, default_value_t = 8501, help = "Port to listen on")]
    port: u16,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ServeCommand {
    async fn run(&self, config: Config) -> Co2VizCliResult<()> {
        info!("Running `serve` subcommand");
        let sp = start_spinner(self.quiet, "Loading world geometry");
        let state = server::AppState::load(config).await;
        stop_spinner(sp);
        server::serve(state?, &self.host, self.port).await
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about = "Explore CO₂ emissions by country from the Our World in Data dataset", long_about = None, name = "co2viz")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        long,
        global = true,
        help = "Path of a TOML config file. Defaults to `co2viz/config.toml` in the user config directory"
    )]
    pub config: Option<PathBuf>,
}

/// Subcommands of the CLI. Each one implements `RunCommand` and declares its own arguments.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Export a standalone choropleth map for each year
    Maps(MapsCommand),
    /// Write the dashboard as a static HTML page
    Dashboard(DashboardCommand),
    /// List the largest emitters of a year
    Top(TopCommand),
    /// Print the yearly emissions of a set of countries
    Series(SeriesCommand),
    /// List the years present in the data
    Years(YearsCommand),
    /// List the countries present in the data
    Countries(CountriesCommand),
    /// Output the world geometry joined with one year of emissions
    Joined(JoinedCommand),
    /// Run the interactive dashboard in the browser
    Serve(ServeCommand),
}
