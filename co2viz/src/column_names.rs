//! This module stores the canonical column names used across the emissions, world and joined
//! tables, together with the alias names that are recognised when normalising input files. Every
//! table leaving the loaders is guaranteed to use the canonical names only.

pub const COUNTRY: &str = "country";
pub const CODE: &str = "code";
pub const YEAR: &str = "year";
pub const CO2: &str = "co2";
pub const CO2_PER_CAPITA: &str = "co2_per_capita";
pub const GEOMETRY: &str = "geometry";
pub const HAS_DATA: &str = "has_data";

/// Alias names for the ISO-3 code column of an emissions CSV, in order of preference.
pub const EMISSIONS_CODE_ALIASES: &[&str] = &[CODE, "iso_code", "Code"];

/// Alias names for the ISO-3 code property of a world geometry feature, in order of preference.
pub const WORLD_CODE_ALIASES: &[&str] = &[CODE, "iso_a3", "ISO_A3", "ISO3166-1-Alpha-3", "iso"];

/// Alias names for the country name property of a world geometry feature.
pub const WORLD_NAME_ALIASES: &[&str] = &["name", "ADMIN", COUNTRY];

/// Alias names for the country column of an emissions CSV.
pub const EMISSIONS_COUNTRY_ALIASES: &[&str] = &[COUNTRY, "Entity", "Country"];

/// Columns kept after an emissions table has been cleaned.
pub const EMISSIONS_COLUMNS: &[&str] = &[COUNTRY, CODE, YEAR, CO2, CO2_PER_CAPITA];
