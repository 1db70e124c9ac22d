//! JSON envelope and error mapping for the page API.

use crate::phases::PhaseError;
use crate::upload::ImageError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Wire response: `{ "ok", "payload" or "error", "rateLimited"? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rate_limited: bool,
}

impl ApiResponse {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
            rate_limited: false,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(error.into()),
            rate_limited: false,
        }
    }
}

/// Handler failure: status code plus the message the page shows inline.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub rate_limited: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn unknown_session(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("unknown session: {}", id))
    }
}

impl From<PhaseError> for ApiError {
    fn from(e: PhaseError) -> Self {
        let status = match &e {
            PhaseError::Gateway(g) if g.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
            PhaseError::Gateway(_) => StatusCode::BAD_GATEWAY,
            PhaseError::Impact(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PhaseError::DiagnosisRequired => StatusCode::CONFLICT,
        };
        Self {
            status,
            message: e.user_message(),
            rate_limited: e.is_rate_limited(),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            rate_limited: self.rate_limited,
            ..ApiResponse::err(self.message)
        };
        (self.status, Json(body)).into_response()
    }
}
