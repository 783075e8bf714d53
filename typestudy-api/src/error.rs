//! Error types for typestudy-api
//!
//! Every failure leaves the service as `{"error": <message>, "code": <CODE>}`
//! with a matching status: 400 for bad input, 404 for missing counter data,
//! 500 for everything else.

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::drive::DriveError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),

    /// Storage failure
    #[error(transparent)]
    Drive(#[from] DriveError),

    /// typestudy-common error
    #[error(transparent)]
    Common(#[from] typestudy_common::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        use typestudy_common::Error as CommonError;

        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Drive(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Common(CommonError::InvalidInput(_)) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Common(CommonError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Text sent to the client; client-side errors from the common crate
    /// go out without their category prefix
    fn client_message(&self) -> String {
        use typestudy_common::Error as CommonError;

        match self {
            ApiError::Common(CommonError::InvalidInput(msg))
            | ApiError::Common(CommonError::NotFound(msg)) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.client_message();

        if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
        } else {
            tracing::debug!(code, error = %message, "Request rejected");
        }

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use typestudy_common::Error as CommonError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Common(CommonError::InvalidInput("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::Common(CommonError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (ApiError::Common(CommonError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Drive(DriveError::Api(503, "x".into())), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_client_errors_from_common_have_no_prefix() {
        let invalid = ApiError::Common(CommonError::InvalidInput("person 3 is locked".into()));
        assert_eq!(invalid.client_message(), "person 3 is locked");

        let missing = ApiError::Common(CommonError::NotFound("device x not found".into()));
        assert_eq!(missing.client_message(), "device x not found");

        let internal = ApiError::Common(CommonError::Internal("boom".into()));
        assert_eq!(internal.client_message(), internal.to_string());
    }

    #[test]
    fn test_message_carries_underlying_error() {
        let err = ApiError::Drive(DriveError::Api(500, "backend exploded".into()));
        assert_eq!(err.to_string(), "Drive API error 500: backend exploded");
    }
}
