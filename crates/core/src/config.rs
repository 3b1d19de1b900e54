//! Environment variable helpers shared by the SDK crates.
//!
//! Configuration is read from the process environment after an optional
//! `.env` file has been loaded with [`load_dotenv`]. Missing values fall
//! back to defaults; malformed values are reported as
//! [`CoreError::Validation`] instead of panicking.

use std::str::FromStr;

use crate::error::CoreError;

/// Load a `.env` file from the working directory if one exists.
///
/// Absence of the file is not an error.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }
}

/// Read a string variable, falling back to `default` when unset.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional string variable. Empty values count as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable, falling back to `default` when unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| CoreError::Validation(format!("{key} has invalid value '{raw}': {e}")))
}
