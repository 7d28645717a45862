//! JSON response helpers and error-to-status mapping

use crate::core::error::{Error, ExecutionErrorPattern};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

pub type ApiResponse = Response<Full<Bytes>>;

/// Body of every non-2xx API response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

pub fn bytes(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> ApiResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json<T: Serialize>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_vec(body) {
        Ok(encoded) => bytes(status, "application/json", encoded),
        Err(e) => {
            error!("Failed to encode response body: {e}");
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response")
        }
    }
}

pub fn ok<T: Serialize>(body: &T) -> ApiResponse {
    json(StatusCode::OK, body)
}

pub fn error_message(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    let body = ErrorBody {
        error: message.into(),
        hint: None,
        suggestions: Vec::new(),
    };
    // ErrorBody always encodes
    bytes(
        status,
        "application/json",
        serde_json::to_vec(&body).unwrap_or_default(),
    )
}

pub fn method_not_allowed(allow: &'static str) -> ApiResponse {
    let mut response = error_message(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Execution { .. } | Error::Elevation(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps a core error onto its HTTP response.
///
/// Validation errors show only their message; execution errors gain a hint
/// when the program's stderr matches a known failure.
pub fn from_error(err: &Error) -> ApiResponse {
    let status = status_for(err);
    let message = match err {
        Error::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    };

    let translation = match err {
        Error::Execution { message, stderr, .. } => {
            ExecutionErrorPattern::match_error(stderr.as_deref().unwrap_or(message))
        }
        Error::Elevation(e) => ExecutionErrorPattern::match_error(&e.to_string()),
        _ => None,
    };

    if status.is_server_error() {
        error!("Request failed: {err}");
    }

    let body = ErrorBody {
        error: message,
        hint: translation.as_ref().map(|t| t.user_message.clone()),
        suggestions: translation.map(|t| t.suggestions).unwrap_or_default(),
    };
    json(status, &body)
}
