//! HTTP response building helpers
//!
//! Consistent JSON bodies for every handler: `{"error": "..."}` for plain
//! failures and `{"errors": {"field": ["..."]}}` for validation.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::StorageError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": message }))
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// Convert a StorageError to an appropriate HTTP response
pub fn error_response(error: StorageError) -> Response<Full<Bytes>> {
    let (status, message) = match &error {
        StorageError::Validation(errors) => {
            return json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "errors": errors }));
        }
        StorageError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        StorageError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        StorageError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        StorageError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        StorageError::Parse(msg) => (StatusCode::BAD_REQUEST, format!("Parse error: {}", msg)),
        StorageError::Json(e) => (StatusCode::BAD_REQUEST, format!("JSON error: {}", e)),
        StorageError::Pool(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        _ => {
            error!(error = %error, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        }
    };

    json_response(status, &serde_json::json!({ "error": message }))
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_response_status_mapping() {
        assert_eq!(error_response(StorageError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(error_response(StorageError::InvalidInput("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_response(StorageError::Unauthorized("x".into())).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_response(StorageError::Forbidden("x".into())).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            error_response(StorageError::Internal("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_error_body_has_field_map() {
        let resp = error_response(StorageError::field("title", "This field is required."));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["errors"]["title"][0], "This field is required.");
    }
}
