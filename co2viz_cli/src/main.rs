mod cli;
mod display;
mod error;
mod server;

use std::path::{Path, PathBuf};

use clap::Parser;
use cli::{Cli, RunCommand};
use co2viz::config::{Config, OWID_CO2_URL};
use error::{Co2VizCliError, Co2VizCliResult};
use log::debug;

const DEFAULT_LOGGING_LEVEL: &str = "warn";

#[tokio::main]
async fn main() {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");

    let result = match read_config_from_toml(args.config.as_deref()) {
        Ok(config) => {
            debug!("config: {config:?}");
            match args.command {
                Some(command) => command.run(config).await,
                None => Ok(()),
            }
        }
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        debug!("{err:?}");
        eprintln!("{}", error_message(&err));
        std::process::exit(1);
    }
}

/// Message shown when a command fails, with download instructions when the dataset is missing.
fn error_message(err: &Co2VizCliError) -> String {
    let mut message = format!("Error: {err}");
    if err.is_missing_data() {
        message.push_str(&format!(
            "\nDownload the dataset into the data/ directory, for example with:\n  \
             mkdir -p data && curl -L -o data/owid-co2-data.csv {OWID_CO2_URL}"
        ));
    }
    message
}

fn default_config_path() -> Option<PathBuf> {
    // Linux: ~/.config/co2viz/config.toml
    // macOS: ~/Library/Application Support/co2viz/config.toml
    dirs::config_dir().map(|dir| dir.join("co2viz").join("config.toml"))
}

/// Read the config file. A missing default file gives the default config, while a missing file
/// passed with `--config` is an error.
fn read_config_from_toml(path: Option<&Path>) -> Co2VizCliResult<Config> {
    let Some(file_path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
        return Ok(Config::default());
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && path.is_none() => {
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}
