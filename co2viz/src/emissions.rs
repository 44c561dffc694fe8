//! Loading and normalisation of the emissions CSV.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::anyhow;
use itertools::Itertools;
use log::{debug, info, warn};
use polars::prelude::*;
use regex::Regex;

use crate::error::{Co2VizError, Co2VizResult};
use crate::COL;

/// Read the emissions CSV at `path` and return a cleaned table with canonical columns.
pub fn load_emissions<P: AsRef<Path>>(path: P) -> Co2VizResult<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Co2VizError::MissingDataFile(path.to_path_buf()));
    }
    info!("Loading emissions from {}", path.display());
    // A full scan for the schema: many OWID columns are empty for the early years.
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("Raw emissions shape: {:?}", df.shape());
    let df = clean(normalize_columns(df)?)?;
    info!("Loaded emissions with shape: {:?}", df.shape());
    Ok(df)
}

fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

fn find_case_insensitive<'a>(names: &'a [String], target: &str) -> Option<&'a String> {
    names.iter().find(|name| name.eq_ignore_ascii_case(target))
}

/// Merge every known code alias present into a single `code` column, taking the first non-null
/// value per row in alias order.
fn normalize_code(mut df: DataFrame) -> Co2VizResult<DataFrame> {
    let names = column_names(&df);
    let present = COL::EMISSIONS_CODE_ALIASES
        .iter()
        .copied()
        .filter(|alias| names.iter().any(|name| name == alias))
        .collect_vec();
    match present.as_slice() {
        [] => Err(Co2VizError::MissingColumn(COL::CODE.into())),
        [only] if *only == COL::CODE => Ok(df),
        [only] => {
            df.rename(only, COL::CODE)?;
            Ok(df)
        }
        aliases => {
            debug!("Coalescing code columns: {aliases:?}");
            let exprs = aliases
                .iter()
                .map(|alias| col(alias).cast(DataType::String))
                .collect_vec();
            let coalesced = df
                .clone()
                .lazy()
                .select([coalesce(&exprs).alias(COL::CODE)])
                .collect()?;
            for alias in aliases {
                df = df.drop(alias)?;
            }
            df.with_column(coalesced.column(COL::CODE)?.clone())?;
            Ok(df)
        }
    }
}

fn normalize_country(mut df: DataFrame) -> Co2VizResult<DataFrame> {
    let names = column_names(&df);
    if names.iter().any(|name| name == COL::COUNTRY) {
        return Ok(df);
    }
    let alias = COL::EMISSIONS_COUNTRY_ALIASES
        .iter()
        .find(|alias| names.iter().any(|name| name == *alias))
        .ok_or_else(|| Co2VizError::MissingColumn(COL::COUNTRY.into()))?;
    df.rename(alias, COL::COUNTRY)?;
    Ok(df)
}

fn normalize_year(mut df: DataFrame) -> Co2VizResult<DataFrame> {
    let names = column_names(&df);
    if names.iter().any(|name| name == COL::YEAR) {
        return Ok(df);
    }
    let found = find_case_insensitive(&names, COL::YEAR)
        .ok_or_else(|| Co2VizError::MissingColumn(COL::YEAR.into()))?;
    df.rename(found, COL::YEAR)?;
    Ok(df)
}

/// Pick the column holding absolute CO2 values: an exact `co2` column, then the first column
/// mentioning CO2 that is not per capita, then the first numeric column that is not a key.
/// Per capita columns are only used when no other numeric column exists.
fn find_co2_column(df: &DataFrame) -> Option<String> {
    let names = column_names(df);
    if let Some(exact) = find_case_insensitive(&names, COL::CO2) {
        return Some(exact.clone());
    }
    let mentions_co2 = Regex::new(r"(?i)co2|co₂").ok()?;
    let per_capita = Regex::new(r"(?i)per[ _]?capita").ok()?;
    if let Some(name) = names
        .iter()
        .find(|name| mentions_co2.is_match(name) && !per_capita.is_match(name))
    {
        return Some(name.clone());
    }
    let numeric = df
        .get_columns()
        .iter()
        .filter(|series| {
            ![COL::COUNTRY, COL::CODE, COL::YEAR].contains(&series.name())
                && series.dtype().is_numeric()
        })
        .map(|series| series.name())
        .collect_vec();
    numeric
        .iter()
        .find(|name| !per_capita.is_match(name))
        .or_else(|| numeric.first())
        .map(|name| name.to_string())
}

fn normalize_co2(mut df: DataFrame) -> Co2VizResult<DataFrame> {
    let found = find_co2_column(&df)
        .ok_or_else(|| Co2VizError::NoCo2Column(column_names(&df).join(", ")))?;
    if found != COL::CO2 {
        debug!("Using '{found}' as the CO2 column");
        df.rename(&found, COL::CO2)?;
    }
    let names = column_names(&df);
    if let Some(per_capita) = find_case_insensitive(&names, COL::CO2_PER_CAPITA) {
        if per_capita != COL::CO2_PER_CAPITA {
            let per_capita = per_capita.clone();
            df.rename(&per_capita, COL::CO2_PER_CAPITA)?;
        }
    }
    Ok(df)
}

/// Rename known alias columns to their canonical names. A table that already uses the canonical
/// names comes back unchanged.
pub fn normalize_columns(df: DataFrame) -> Co2VizResult<DataFrame> {
    let df = normalize_code(df)?;
    let df = normalize_country(df)?;
    let df = normalize_year(df)?;
    normalize_co2(df)
}

/// Metric values as floats, with NaN read from the CSV treated as missing.
fn metric_expr(name: &str) -> Expr {
    col(name)
        .cast(DataType::Float64)
        .fill_nan(lit(NULL))
        .cast(DataType::Float64)
}

/// Uppercase codes, drop rows without a three character code, fix the column types and keep only
/// the canonical columns.
pub fn clean(df: DataFrame) -> Co2VizResult<DataFrame> {
    let names = column_names(&df);
    let has_per_capita = names.iter().any(|name| name == COL::CO2_PER_CAPITA);
    let mut casts = vec![
        col(COL::COUNTRY).cast(DataType::String),
        col(COL::CODE)
            .cast(DataType::String)
            .str()
            .to_uppercase(),
        col(COL::YEAR).cast(DataType::Int32),
        metric_expr(COL::CO2),
    ];
    if has_per_capita {
        casts.push(metric_expr(COL::CO2_PER_CAPITA));
    }
    let keep = COL::EMISSIONS_COLUMNS
        .iter()
        .filter(|name| names.iter().any(|present| present == *name))
        .map(|name| col(name))
        .collect_vec();
    let df = df
        .lazy()
        .with_columns(casts)
        .filter(
            col(COL::CODE)
                .str()
                .len_chars()
                .eq(lit(3u32))
                .and(col(COL::YEAR).is_not_null()),
        )
        .select(keep)
        .collect()?;
    Ok(df)
}

/// Sorted unique years in an emissions table.
pub fn available_years(df: &DataFrame) -> Co2VizResult<Vec<i32>> {
    let years: BTreeSet<i32> = df.column(COL::YEAR)?.i32()?.into_iter().flatten().collect();
    Ok(years.into_iter().collect())
}

/// Sorted unique country names in an emissions table.
pub fn available_countries(df: &DataFrame) -> Co2VizResult<Vec<String>> {
    let countries: BTreeSet<String> = df
        .column(COL::COUNTRY)?
        .str()?
        .into_iter()
        .flatten()
        .map(|country| country.to_string())
        .collect();
    Ok(countries.into_iter().collect())
}

struct CacheEntry {
    modified: Option<SystemTime>,
    df: Arc<DataFrame>,
}

/// Read-through cache of loaded emissions tables. An entry is reused while the file's
/// modification time is unchanged.
#[derive(Default)]
pub struct EmissionsCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl EmissionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<P: AsRef<Path>>(&self, path: P) -> Co2VizResult<Arc<DataFrame>> {
        let path = path.as_ref();
        let modified = std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .ok();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("Emissions cache lock poisoned"))?;
        if let Some(entry) = entries.get(path) {
            if modified.is_some() && entry.modified == modified {
                debug!("Emissions cache hit for {}", path.display());
                return Ok(Arc::clone(&entry.df));
            }
            warn!("{} changed on disk, reloading", path.display());
        }
        let df = Arc::new(load_emissions(path)?);
        entries.insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                df: Arc::clone(&df),
            },
        );
        Ok(df)
    }
}
