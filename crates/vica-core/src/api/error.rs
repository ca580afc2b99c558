use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session expired - sign in again")]
    SessionExpired,

    #[error("Request rejected ({status}): {}", .message.as_deref().unwrap_or(.body.as_str()))]
    Rejected {
        status: StatusCode,
        message: Option<String>,
        body: String,
    },

    #[error("Server error ({status}): {}", .message.as_deref().unwrap_or(.body.as_str()))]
    ServerError {
        status: StatusCode,
        message: Option<String>,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
            None => body.to_string(),
            Some((cut, _)) => format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            ),
        }
    }

    /// Pull the human-readable message out of a JSON error body.
    ///
    /// The backend reports `{"detail": "..."}` (or a list of validation
    /// entries with a `msg` each); a top-level `message` wins when present.
    pub fn extract_message(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;

        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }

        match value.get("detail")? {
            Value::String(detail) => Some(detail.clone()),
            Value::Array(entries) => {
                let messages: Vec<&str> = entries
                    .iter()
                    .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = Self::extract_message(body);
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::SessionExpired,
            400..=499 => ApiError::Rejected {
                status,
                message,
                body: truncated,
            },
            500..=599 => ApiError::ServerError {
                status,
                message,
                body: truncated,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// HTTP status the backend answered with, if a response arrived at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::SessionExpired => Some(StatusCode::UNAUTHORIZED),
            ApiError::Rejected { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::NetworkError(e) => e.status(),
            _ => None,
        }
    }

    /// Message supplied by the backend, if it sent one
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { message, .. } | ApiError::ServerError { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }
}
