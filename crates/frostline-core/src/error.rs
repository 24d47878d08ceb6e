//! Centralized error types for the Frostline application.
//!
//! This module provides a typed error hierarchy that:
//! - Enables precise error handling throughout the codebase
//! - Provides user-friendly messages suitable for terminal display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Service and client errors are mapped into this type at the edge of the
/// application. Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Lookup(e) => e.user_message(),
            AppError::Cache(e) => e.user_message(),
            AppError::InvalidInput(_) => "The input is not valid. Check it and try again.",
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// Remote lookup errors (geocoding, station search, frost dates).
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Postal code not found: {0}")]
    PostalCodeNotFound(String),

    #[error("No results for the requested area")]
    NoResults,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl LookupError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LookupError::PostalCodeNotFound(_) => "ZIP code not found. Check and try again.",
            LookupError::NoResults => "Nothing found nearby. Try a larger search radius.",
            LookupError::ServiceError(_) => "The lookup service reported an error.",
            LookupError::Cancelled => "The request was cancelled.",
        }
    }
}

/// Local cache file errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache file is malformed: {0}")]
    Malformed(String),
}

impl CacheError {
    pub fn user_message(&self) -> &'static str {
        match self {
            CacheError::Malformed(_) => "The ZIP code cache is corrupted. Delete it and retry.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let lookup = LookupError::NoResults;
        let app_err: AppError = lookup.into();
        assert!(matches!(app_err, AppError::Lookup(LookupError::NoResults)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Lookup(LookupError::PostalCodeNotFound("00000".into()));
        assert_eq!(app_err.user_message(), "ZIP code not found. Check and try again.");
    }

    #[test]
    fn test_server_error_message_depends_on_status() {
        let e = NetworkError::ServerError {
            status: 503,
            message: "down".into(),
        };
        assert!(e.user_message().contains("later"));

        let e = NetworkError::ServerError {
            status: 400,
            message: "bad".into(),
        };
        assert_eq!(e.user_message(), "The request failed. Please try again.");
    }

    #[test]
    fn test_missing_setting_names_the_setting() {
        let err: AppError = ConfigError::MissingSetting("ncdc.token".into()).into();
        assert!(err.to_string().contains("ncdc.token"));
        assert_eq!(err.user_message(), "A required setting is missing. Check your settings.");
    }

    #[test]
    fn test_display_keeps_detail() {
        let err = AppError::Cache(CacheError::Malformed("row 3: missing city".into()));
        assert!(err.to_string().contains("row 3"));
    }
}
