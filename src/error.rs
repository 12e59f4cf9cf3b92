//! Error taxonomy for calls against the platform backend and media hosts.
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or transport failure before a response was read.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx response carrying an application message.
    #[error("request failed ({status}): {message}")]
    Status { status: StatusCode, message: String },
    /// Moderation rejection (HTTP 403). The reason is the server's text, verbatim.
    #[error("{0}")]
    Forbidden(String),
    /// Rejected client-side; nothing was sent.
    #[error("{0}")]
    Validation(String),
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("not signed in")]
    Unauthenticated,
}

impl ApiError {
    /// Map a non-success status and its raw body to the matching error class.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        // Moderation rejections carry the reason under `error`.
        let keys = if status == StatusCode::FORBIDDEN {
            ["error", "message"]
        } else {
            ["message", "error"]
        };
        let message = message_from_body(body, keys).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        if status == StatusCode::FORBIDDEN {
            ApiError::Forbidden(message)
        } else {
            ApiError::Status { status, message }
        }
    }
}

/// Pull a human-readable message from an error body: the first of `keys`
/// present, then the raw text.
fn message_from_body(body: &str, keys: [&str; 2]) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        for key in keys {
            match map.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(other) if !other.is_null() && !other.is_string() => {
                    return Some(other.to_string())
                }
                _ => {}
            }
        }
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_keeps_server_reason_exactly() {
        let err = ApiError::from_response(StatusCode::FORBIDDEN, r#"{"error":"banned"}"#);
        match err {
            ApiError::Forbidden(reason) => assert_eq!(reason, "banned"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn message_field_wins_over_error() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message":"price required","error":"Bad Request"}"#,
        );
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "price required");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn forbidden_prefers_error_over_message() {
        let err = ApiError::from_response(
            StatusCode::FORBIDDEN,
            r#"{"message":"Forbidden","error":"You are muted in this room"}"#,
        );
        match err {
            ApiError::Forbidden(reason) => assert_eq!(reason, "You are muted in this room"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_raw_text_then_reason() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.to_string(), "request failed (502 Bad Gateway): upstream down");

        let err = ApiError::from_response(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "request failed (404 Not Found): Not Found");
    }
}
