use serde::{Deserialize, Serialize};

use crate::coords::LocationCoordinates;

/// A validated US postal code: exactly five ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.len() == 5 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::PostalCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PostalCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for PostalCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for PostalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved location of a postal code, as stored in the ZIP cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipCacheEntry {
    pub postal_code: PostalCode,
    pub location: LocationCoordinates,
    /// Place name and subdivision, e.g. "Holtsville, NY"
    pub city_label: String,
}

/// A climate station returned by a nearby-station search
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub station_id: String,
    pub name: String,
    pub location: LocationCoordinates,
}

/// Input rejected before any I/O takes place
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Postal code must be exactly 5 digits, got {0:?}")]
    PostalCode(String),
    #[error("Unit must be either miles or km, got {0:?}")]
    Unit(String),
    #[error("Invalid coordinate value {0:?}")]
    Coordinate(String),
    #[error("Unknown frost date kind {0:?}")]
    FrostKind(String),
}

/// Remote lookup errors, delivered through the async outcome channel
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Webservice exception ({code}): {message}")]
    Service { code: i64, message: String },
    #[error("Postal code {0} not found")]
    NotFound(PostalCode),
    #[error("No results found")]
    NoResults,
    #[error("Unable to parse JSON: {0}")]
    Parse(String),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// ZIP cache file errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unexpected cache data format: {0}")]
    Format(String),
}

impl From<csv::Error> for CacheError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => CacheError::Io(io),
                other => CacheError::Format(format!("{:?}", other)),
            }
        } else {
            CacheError::Format(e.to_string())
        }
    }
}
