use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_valid::{ValidRejection, ValidationRejection};
use serde::{Deserialize, Serialize};

use crate::predictors::PredictorError;

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

/// Error information in OpenAI's error schema:
/// `{"error": {"type": "...", "message": "...", "param": ..., "code": ...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error type classification (e.g. "invalid_request_error", "server_error")
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Parameter that caused the error (null if not applicable)
    pub param: Option<String>,
    /// Machine-readable error code
    pub code: Option<String>,
    /// Request ID for correlating the error with logs, filled in by the
    /// request ID middleware
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error response for API requests.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    param: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            param: None,
        }
    }

    /// Attach the request parameter that caused the error.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_server_error() {
            "server_error"
        } else {
            "invalid_request_error"
        };
        let body = ErrorResponse {
            error: ErrorInfo {
                error_type: error_type.to_string(),
                message: self.message,
                param: self.param,
                code: Some(self.code.to_string()),
                request_id: None,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PredictorError> for ApiError {
    fn from(err: PredictorError) -> Self {
        tracing::error!(error = %err, "Forecast model failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "prediction_failed",
            format!("Forecast model failed: {err}"),
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_json", rejection.body_text())
    }
}

impl From<ValidRejection<JsonRejection>> for ApiError {
    fn from(rejection: ValidRejection<JsonRejection>) -> Self {
        match rejection {
            ValidationRejection::Valid(errors) => {
                let param = errors.field_errors().keys().min().map(|k| k.to_string());
                let err = Self::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "validation_error",
                    errors.to_string(),
                );
                match param {
                    Some(param) => err.with_param(param),
                    None => err,
                }
            }
            ValidationRejection::Inner(rejection) => rejection.into(),
        }
    }
}
