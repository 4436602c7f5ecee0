use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized { payload: Option<Value> },

    #[error("Access denied: {message}")]
    AccessDenied {
        message: String,
        payload: Option<Value>,
    },

    #[error("Resource not found: {message}")]
    NotFound {
        message: String,
        payload: Option<Value>,
    },

    #[error("Request rejected ({status}): {message}")]
    Rejected {
        status: StatusCode,
        message: String,
        payload: Option<Value>,
    },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    ServerError { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Keys the ledger and payment service use for a single human-readable message
const MESSAGE_KEYS: [&str; 4] = ["detail", "error", "message", "non_field_errors"];

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let payload = serde_json::from_str::<Value>(body).ok();
        let message = payload
            .as_ref()
            .and_then(first_message)
            .unwrap_or_else(|| Self::truncate_body(body));

        match status.as_u16() {
            401 => ApiError::Unauthorized { payload },
            403 => ApiError::AccessDenied { message, payload },
            404 => ApiError::NotFound { message, payload },
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError { status, message },
            _ => ApiError::Rejected {
                status,
                message,
                payload,
            },
        }
    }

    /// HTTP status the server answered with, if the call got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::AccessDenied { .. } => Some(StatusCode::FORBIDDEN),
            ApiError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            ApiError::Rejected { status, .. } | ApiError::ServerError { status, .. } => {
                Some(*status)
            }
            ApiError::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::NetworkError(e) => e.status(),
            ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) | ApiError::Storage(_) => {
                None
            }
        }
    }

    /// Structured error body, passed through untouched for the caller to render
    pub fn payload(&self) -> Option<&Value> {
        match self {
            ApiError::Unauthorized { payload }
            | ApiError::AccessDenied { payload, .. }
            | ApiError::NotFound { payload, .. }
            | ApiError::Rejected { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// First human-readable message in the server's error body, if any
    pub fn server_message(&self) -> Option<String> {
        self.payload().and_then(first_message)
    }

    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { .. } => self
                .server_message()
                .unwrap_or_else(|| "Your session has expired. Please sign in again.".to_string()),
            ApiError::AccessDenied { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Rejected { message, .. } => message.clone(),
            ApiError::NetworkError(e) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Pull the first readable message out of a DRF/FastAPI error body.
///
/// Handles `{"detail": "..."}`, `{"error": "..."}` and field maps like
/// `{"amount": ["Amount must be greater than zero."]}`.
fn first_message(payload: &Value) -> Option<String> {
    let obj = payload.as_object()?;

    for key in MESSAGE_KEYS {
        if let Some(text) = obj.get(key).and_then(text_of) {
            return Some(text);
        }
    }

    obj.iter()
        .find_map(|(field, value)| text_of(value).map(|text| format!("{}: {}", field, text)))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(text_of),
        _ => None,
    }
}
