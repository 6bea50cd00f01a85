// Input validation helpers.
//
// - `ValidatedJson<T>` extractor: content-type check + serde, mapped to VALIDATION_FAILED.
// - Frame and body size limits shared by the REST and WebSocket surfaces.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ErrorCode, RelayError};

/// Maximum WebSocket text frame in bytes (64 KiB).
pub const MAX_WS_FRAME_BYTES: usize = 64 * 1024;

/// Maximum REST request body in bytes (1 MiB).
pub const MAX_REST_BODY_BYTES: usize = 1024 * 1024;

/// A JSON body extractor that returns structured `RelayError` on failure.
///
/// Axum answers a body that is not JSON, or lacks a required field, with a
/// plain-text 400/415/422. Here every such rejection becomes a
/// VALIDATION_FAILED (400) envelope instead.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (message, details) = classify_json_rejection(&rejection);
                Err(RelayError::new(ErrorCode::ValidationFailed, message)
                    .with_details(details)
                    .into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            format!("invalid JSON payload: {e}"),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => {
            (format!("malformed JSON: {e}"), serde_json::json!({ "kind": "syntax_error" }))
        }
        JsonRejection::MissingJsonContentType(_) => (
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) => {
            (format!("request body error: {e}"), serde_json::json!({ "kind": "body_error" }))
        }
        other => (format!("request body error: {other}"), serde_json::json!({ "kind": "unknown" })),
    }
}

/// Check a WebSocket text frame against the size limit.
/// Returns a reason suitable for an ERROR frame.
pub fn check_ws_frame_size(payload: &str) -> Result<(), String> {
    if payload.len() > MAX_WS_FRAME_BYTES {
        Err(format!(
            "frame size {} bytes exceeds limit of {} bytes",
            payload.len(),
            MAX_WS_FRAME_BYTES
        ))
    } else {
        Ok(())
    }
}
