//! Centralized error types for Skyward.
//!
//! Every failure a front end might show ends up as an [`AppError`], and
//! `user_message()` gives the short text meant for display while the
//! `Display` impl keeps the detail for logs.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a UI-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Location error: {0}")]
    Location(#[from] LocationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Location(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { status: 401, .. } => {
                "Weather API key is invalid. Check settings."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Weather and place lookup errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Could not read weather data: {0}")]
    Decode(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::LocationNotFound(_) => "Location not found. Check and try again.",
            WeatherError::InvalidRequest(_) => "That location can't be looked up.",
            WeatherError::Decode(_) => "Weather data could not be read. Please try again.",
        }
    }
}

/// Device location errors.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission unavailable")]
    PermissionUnavailable,
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionUnavailable => {
                "Location access is off. Enable it or pick a city."
            }
        }
    }
}

/// Persistence errors (favorites).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to save: {0}")]
    WriteFailed(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::WriteFailed(_) => "Favorites could not be saved.",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors = vec![
            AppError::from(NetworkError::ConnectionFailed("refused".into())),
            AppError::from(ConfigError::Invalid("test".into())),
            AppError::from(WeatherError::Decode("missing temp".into())),
            AppError::from(LocationError::PermissionUnavailable),
            AppError::from(StorageError::WriteFailed("disk full".into())),
        ];

        for err in errors {
            assert!(!err.user_message().is_empty(), "{err} has no user message");
        }
    }

    #[test]
    fn test_app_error_conversion() {
        let err = LocationError::PermissionUnavailable;
        let app_err: AppError = err.into();
        assert!(matches!(
            app_err,
            AppError::Location(LocationError::PermissionUnavailable)
        ));
    }

    #[test]
    fn test_server_error_messages_by_status() {
        let outage = NetworkError::ServerError {
            status: 503,
            message: "down".into(),
        };
        let bad_key = NetworkError::ServerError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(
            outage.user_message(),
            "The server is experiencing issues. Please try again later."
        );
        assert_eq!(
            bad_key.user_message(),
            "Weather API key is invalid. Check settings."
        );
    }

    #[test]
    fn test_display_keeps_detail() {
        let app_err = AppError::Storage(StorageError::WriteFailed("read-only fs".into()));
        assert!(app_err.to_string().contains("read-only fs"));
        assert_eq!(app_err.user_message(), "Favorites could not be saved.");
    }
}
