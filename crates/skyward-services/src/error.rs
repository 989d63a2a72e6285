use skyward_weather::{FetchError, GeocodeError, StoreError};
use std::fmt;

/// What went wrong, kept distinct for logging and tests even though the
/// user-facing surface may stay generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PermissionUnavailable,
    GeocodeFailure,
    InvalidRequest,
    TransportFailure,
    UnexpectedResponse,
    DecodeFailure,
    StorageFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PermissionUnavailable => "permission unavailable",
            ErrorKind::GeocodeFailure => "geocode failure",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::TransportFailure => "transport failure",
            ErrorKind::UnexpectedResponse => "unexpected response",
            ErrorKind::DecodeFailure => "decode failure",
            ErrorKind::StorageFailure => "storage failure",
        };
        f.write_str(name)
    }
}

/// Structured error flag held in the application state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ControllerError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status, for `UnexpectedResponse`
    pub status: Option<u16>,
}

impl ControllerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Generic text for display
    pub fn user_message(&self) -> &'static str {
        skyward_core::AppError::from(self.clone()).user_message()
    }
}

impl From<FetchError> for ControllerError {
    fn from(e: FetchError) -> Self {
        let (kind, status) = match &e {
            FetchError::InvalidRequest(_) => (ErrorKind::InvalidRequest, None),
            FetchError::Transport(_) => (ErrorKind::TransportFailure, None),
            FetchError::UnexpectedResponse { status, .. } => {
                (ErrorKind::UnexpectedResponse, Some(*status))
            }
            FetchError::Decode(_) => (ErrorKind::DecodeFailure, None),
        };
        Self {
            status,
            ..Self::new(kind, e.to_string())
        }
    }
}

impl From<GeocodeError> for ControllerError {
    fn from(e: GeocodeError) -> Self {
        Self::new(ErrorKind::GeocodeFailure, e.to_string())
    }
}

impl From<StoreError> for ControllerError {
    fn from(e: StoreError) -> Self {
        Self::new(ErrorKind::StorageFailure, e.to_string())
    }
}

/// Errors returned by `ControllerHandle` commands
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("controller has shut down")]
    Closed,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn fetch_errors_keep_their_kind() {
        let cases = [
            (FetchError::InvalidRequest("x".into()), ErrorKind::InvalidRequest),
            (FetchError::Transport("timeout".into()), ErrorKind::TransportFailure),
            (
                FetchError::UnexpectedResponse {
                    status: 500,
                    body: String::new(),
                },
                ErrorKind::UnexpectedResponse,
            ),
            (FetchError::Decode("missing temp".into()), ErrorKind::DecodeFailure),
        ];

        for (err, kind) in cases {
            assert_eq!(ControllerError::from(err).kind, kind);
        }
    }

    #[test]
    fn unexpected_response_keeps_structured_status() {
        let err = ControllerError::from(FetchError::UnexpectedResponse {
            status: 429,
            body: "slow down, 60 calls per minute".into(),
        });
        assert_eq!(err.status, Some(429));
        assert_eq!(ControllerError::from(FetchError::Decode("x".into())).status, None);
    }

    #[test]
    fn geocode_errors_are_geocode_failures() {
        let err = ControllerError::from(GeocodeError::NotFound("Nowhere".into()));
        assert_eq!(err.kind, ErrorKind::GeocodeFailure);
        assert!(err.message.contains("Nowhere"));
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = ControllerError::new(ErrorKind::StorageFailure, "disk full");
        assert_eq!(err.to_string(), "storage failure: disk full");
    }
}
