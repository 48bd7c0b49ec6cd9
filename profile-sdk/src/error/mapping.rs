//! Error mapping for directory service responses
//!
//! Converts non-success HTTP responses from the directory endpoint into
//! normalized `ServiceError` values.

use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, ServiceError};

/// Map a directory error body of the form `{"error": {"code", "message"}}`
pub fn map_directory_error(
    status: StatusCode,
    json: &Value,
    context: &mut ErrorContext,
) -> Option<ServiceError> {
    let error = json.get("error")?;

    if let Some(code) = error.get("code").and_then(|c| c.as_str()) {
        context.error_code = Some(code.to_string());
    }

    if let Some(request_id) = error
        .get("innerError")
        .and_then(|inner| inner.get("request-id"))
        .and_then(|id| id.as_str())
    {
        context.add("server_request_id", request_id);
    }

    let message = error.get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown directory error");

    Some(map_status(status, message))
}

/// Map a generic HTTP error to a ServiceError
pub fn map_http_error(
    status: StatusCode,
    body: &str,
    context: &mut ErrorContext,
) -> ServiceError {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(error) = map_directory_error(status, &json, context) {
            return error;
        }

        if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
            return map_status(status, message);
        }
    }

    let message = if body.is_empty() {
        status.to_string()
    } else if body.len() > 100 {
        format!("{}: {:.100}...", status, body)
    } else {
        format!("{}: {}", status, body)
    };

    map_status(status, message)
}

fn map_status(status: StatusCode, message: impl Into<String>) -> ServiceError {
    let message = message.into();
    match status {
        StatusCode::UNAUTHORIZED => ServiceError::authentication(message),
        StatusCode::FORBIDDEN => ServiceError::authorization(message),
        StatusCode::NOT_FOUND => ServiceError::not_found(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ServiceError::timeout(message),
        StatusCode::TOO_MANY_REQUESTS => ServiceError::rate_limit(message),
        StatusCode::BAD_REQUEST => ServiceError::validation(message),
        // 502/503 are transient on the directory endpoint
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ServiceError::network(message),
        _ => ServiceError::service(message),
    }
}

/// Helper function to classify HTTP errors by category
pub fn classify_http_error(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "validation",
        401 => "authentication",
        403 => "authorization",
        404 => "not_found",
        408 | 504 => "timeout",
        429 => "rate_limit",
        500..=599 => "server",
        _ => "unknown",
    }
}
