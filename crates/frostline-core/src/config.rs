use anyhow::{Context, Result};
pub use frostline_weather::DistanceUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no GeoNames username is configured.
pub const GEONAMES_USERNAME_ENV: &str = "GEONAMES_USERNAME";
/// Environment variable consulted when no NCEI token is configured.
pub const NCDC_TOKEN_ENV: &str = "NCDC_TOKEN";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (also holds the ZIP cache)
    pub config_dir: PathBuf,

    /// GeoNames postal code lookup
    #[serde(default)]
    pub geonames: GeoNamesConfig,

    /// NCEI Climate Data Online lookups
    #[serde(default)]
    pub ncdc: NcdcConfig,

    /// Default station search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Request orchestration settings
    #[serde(default)]
    pub requests: RequestConfig,

    /// ZIP code cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoNamesConfig {
    /// GeoNames account name; falls back to `GEONAMES_USERNAME`
    pub username: Option<String>,

    #[serde(default = "default_geonames_url")]
    pub base_url: String,
}

fn default_geonames_url() -> String {
    "https://secure.geonames.org".to_string()
}

impl Default for GeoNamesConfig {
    fn default() -> Self {
        Self {
            username: None,
            base_url: default_geonames_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcdcConfig {
    /// CDO web service token; falls back to `NCDC_TOKEN`
    pub token: Option<String>,

    #[serde(default = "default_ncdc_url")]
    pub base_url: String,
}

fn default_ncdc_url() -> String {
    "https://www.ncei.noaa.gov/cdo-web/api/v2".to_string()
}

impl Default for NcdcConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_ncdc_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Distance from the search center to the middle of any bounding box edge
    pub radius: f64,

    pub unit: DistanceUnit,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius: 15.0,
            unit: DistanceUnit::Miles,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-request timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// File name of the ZIP code cache inside `config_dir`
    pub file_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file_name: "zip_data.csv".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("frostline");

        Self {
            config_dir,
            geonames: GeoNamesConfig::default(),
            ncdc: NcdcConfig::default(),
            search: SearchConfig::default(),
            requests: RequestConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.geonames.base_url, "geonames.base_url", &mut result);
        self.validate_url(&self.ncdc.base_url, "ncdc.base_url", &mut result);

        if self.geonames_username().is_none() {
            result.add_warning(
                "geonames.username",
                format!("Not configured and {} is unset - ZIP lookups will fail", GEONAMES_USERNAME_ENV),
            );
        }

        if self.ncdc_token().is_none() {
            result.add_warning(
                "ncdc.token",
                format!("Not configured and {} is unset - station lookups will fail", NCDC_TOKEN_ENV),
            );
        }

        if !self.search.radius.is_finite() || self.search.radius <= 0.0 {
            result.add_error("search.radius", "Search radius must be a positive number");
        } else if self.search.radius > 100.0 {
            result.add_warning("search.radius", "Search radius is unusually large (>100)");
        }

        if self.requests.timeout_secs == 0 {
            result.add_warning("requests.timeout_secs", "Request timeout disabled (0 seconds)");
        }

        if self.cache.file_name.trim().is_empty() {
            result.add_error("cache.file_name", "Cache file name must not be empty");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// GeoNames username from config, else from the environment
    pub fn geonames_username(&self) -> Option<String> {
        self.geonames
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| std::env::var(GEONAMES_USERNAME_ENV).ok().filter(|v| !v.trim().is_empty()))
    }

    /// NCEI token from config, else from the environment
    pub fn ncdc_token(&self) -> Option<String> {
        self.ncdc
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var(NCDC_TOKEN_ENV).ok().filter(|v| !v.trim().is_empty()))
    }

    /// GeoNames username, or `MissingSetting` when neither config nor env has one
    pub fn require_geonames_username(&self) -> std::result::Result<String, ConfigError> {
        self.geonames_username()
            .ok_or_else(|| ConfigError::MissingSetting("geonames.username".to_string()))
    }

    /// NCEI token, or `MissingSetting` when neither config nor env has one
    pub fn require_ncdc_token(&self) -> std::result::Result<String, ConfigError> {
        self.ncdc_token()
            .ok_or_else(|| ConfigError::MissingSetting("ncdc.token".to_string()))
    }

    /// Full path of the ZIP code cache file
    pub fn cache_path(&self) -> PathBuf {
        self.config_dir.join(&self.cache.file_name)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("frostline");

        Ok(config_dir.join("config.toml"))
    }
}
