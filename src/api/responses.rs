//! # Response Envelope
//!
//! Every handler returns the same shape: `{success, data|error, timestamp}`.
//! Errors are rendered from [`crate::error::AppError`] so a handler never
//! needs to know its own HTTP status code — that mapping lives in one
//! place ([`AppError::status_code`]).

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Serialize, PartialEq)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// The uniform response envelope. `T` is only present on success.
#[derive(Debug, Serialize, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, timestamp: Utc::now() }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Wraps an [`AppError`] so it can be returned directly from a handler
/// (`Result<Json<T>, ApiErrorResponse>`) and renders through the same
/// envelope as a success response, just with `data` absent.
pub struct ApiErrorResponse(pub AppError);

impl From<AppError> for ApiErrorResponse {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ApiErrorBody { code: self.0.code(), message: self.0.to_string() }),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiErrorResponse>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_no_error() {
        let response = ApiResponse::ok(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.error.is_none());
    }

    #[test]
    fn app_error_maps_to_its_status_code() {
        let err = ApiErrorResponse(AppError::NotFound("widget".to_string()));
        assert_eq!(err.0.status_code(), StatusCode::NOT_FOUND);
    }
}
