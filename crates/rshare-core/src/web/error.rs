//! HTTP error handling for the web API.
//!
//! Core errors are converted to JSON bodies carrying the stable error code,
//! with the HTTP status derived from that code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Error code (e.g., "E003" for code not found)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Create a new API error with code and message.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Create an internal server error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.code.as_deref() {
            Some("E001") => StatusCode::BAD_REQUEST,
            Some("E003") => StatusCode::NOT_FOUND,
            Some("E004" | "E005") => StatusCode::GONE,
            Some("E006") => StatusCode::PAYLOAD_TOO_LARGE,
            Some("E007") => StatusCode::TOO_EARLY,
            Some("E008") => StatusCode::SERVICE_UNAVAILABLE,
            Some("E009") => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self.message);
        }
        (status, Json(self)).into_response()
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        let message = err.to_string();
        let api = match err.code() {
            Some(code) => Self::with_code(code, message),
            None => Self::internal(message),
        };
        match err.suggestion() {
            Some(suggestion) => api.with_details(suggestion),
            None => api,
        }
    }
}

/// Result type for web handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            ("E001", StatusCode::BAD_REQUEST),
            ("E003", StatusCode::NOT_FOUND),
            ("E004", StatusCode::GONE),
            ("E005", StatusCode::GONE),
            ("E006", StatusCode::PAYLOAD_TOO_LARGE),
            ("E007", StatusCode::TOO_EARLY),
            ("E008", StatusCode::SERVICE_UNAVAILABLE),
            ("E009", StatusCode::CONFLICT),
        ];
        for (code, status) in cases {
            assert_eq!(ApiError::with_code(code, "").status_code(), status);
        }
        assert_eq!(
            ApiError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_core_error() {
        let api_err: ApiError = Error::CodeNotFound("123456".into()).into();
        assert_eq!(api_err.code.as_deref(), Some("E003"));
        assert!(api_err.message.contains("123456"));
        assert!(api_err.details.as_deref().unwrap().contains("new code"));

        let api_err: ApiError = Error::Internal("boom".into()).into();
        assert_eq!(api_err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(api_err.details.is_none());

        let api_err: ApiError = Error::FileNotReady {
            file: "a.txt".into(),
            transferred: 1,
            total: 2,
        }
        .into();
        assert_eq!(api_err.status_code(), StatusCode::TOO_EARLY);
    }

    #[test]
    fn test_serialization() {
        let err = ApiError::with_code("E003", "Code not found");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"E003\""));
        assert!(json.contains("\"message\":\"Code not found\""));
        assert!(!json.contains("details"));

        let json = serde_json::to_string(&err.with_details("Check the code")).unwrap();
        assert!(json.contains("\"details\":\"Check the code\""));
    }
}
