//! Maps controller errors to skyward_core::AppError for consistent user-facing messages.

use crate::error::{ControllerError, ErrorKind};
use skyward_core::{AppError, LocationError, NetworkError, StorageError, WeatherError};

impl From<ControllerError> for AppError {
    fn from(e: ControllerError) -> Self {
        match e.kind {
            ErrorKind::PermissionUnavailable => {
                AppError::Location(LocationError::PermissionUnavailable)
            }
            ErrorKind::GeocodeFailure => AppError::Weather(WeatherError::LocationNotFound(e.message)),
            ErrorKind::InvalidRequest => AppError::Weather(WeatherError::InvalidRequest(e.message)),
            ErrorKind::TransportFailure => {
                AppError::Network(NetworkError::ConnectionFailed(e.message))
            }
            ErrorKind::UnexpectedResponse => AppError::Network(NetworkError::ServerError {
                status: e.status.unwrap_or(0),
                message: e.message,
            }),
            ErrorKind::DecodeFailure => AppError::Weather(WeatherError::Decode(e.message)),
            ErrorKind::StorageFailure => AppError::Storage(StorageError::WriteFailed(e.message)),
        }
    }
}
