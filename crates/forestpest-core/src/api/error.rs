use thiserror::Error;

use super::codes::{self, DEFAULT_MESSAGE};
use super::Envelope;

/// Coarse classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    Timeout,
    ConnectionRefused,
    NetworkUnreachable,
    ServerError,
    Application,
    AuthExpired,
    RefreshFailed,
    Unknown,
}

/// Every way a call through the gateway can fail.
///
/// The type is `Clone` because a failed token refresh is reported to every
/// request that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Application error {code}: {message}")]
    Application { code: i64, message: String },

    #[error("Session expired: {0}")]
    AuthExpired(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    Unknown(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Classify a non-2xx HTTP response.
    ///
    /// The message is looked up by the envelope code (or the status when the
    /// body carries no envelope), then taken from the body, then defaulted.
    pub fn from_status(status: u16, body: &str) -> Self {
        let envelope = serde_json::from_str::<Envelope>(body).ok();
        let code = envelope.as_ref().map_or(i64::from(status), |e| e.code);

        let message = codes::message_for(code)
            .map(str::to_string)
            .or_else(|| envelope.and_then(|e| e.message).filter(|m| !m.is_empty()))
            .or_else(|| (!body.trim().is_empty()).then(|| Self::truncate_body(body)));

        if status == 401 || codes::is_auth_code(code) {
            return ApiError::AuthExpired(message.unwrap_or_else(|| "Unauthorized".to_string()));
        }

        match status {
            400 => ApiError::BadRequest(message.unwrap_or_else(|| "Invalid request".to_string())),
            403 => ApiError::Forbidden(message.unwrap_or_else(|| "Access denied".to_string())),
            404 => ApiError::NotFound(message.unwrap_or_else(|| "Resource not found".to_string())),
            408 => ApiError::Timeout(message.unwrap_or_else(|| "Request timed out".to_string())),
            500..=599 => {
                ApiError::ServerError(message.unwrap_or_else(|| "Internal server error".to_string()))
            }
            _ => ApiError::Unknown(
                message.unwrap_or_else(|| format!("Connection error {status}")),
            ),
        }
    }

    /// Classify a 2xx response whose envelope carries a failure code.
    pub fn from_envelope(code: i64, message: Option<String>) -> Self {
        let message = codes::message_for(code)
            .map(str::to_string)
            .or(message.filter(|m| !m.is_empty()))
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        if codes::is_auth_code(code) {
            ApiError::AuthExpired(message)
        } else {
            ApiError::Application { code, message }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::BadRequest,
            ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Timeout(_) => ErrorKind::Timeout,
            ApiError::ConnectionRefused(_) => ErrorKind::ConnectionRefused,
            ApiError::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            ApiError::ServerError(_) => ErrorKind::ServerError,
            ApiError::Application { .. } => ErrorKind::Application,
            ApiError::AuthExpired(_) => ErrorKind::AuthExpired,
            ApiError::RefreshFailed(_) => ErrorKind::RefreshFailed,
            ApiError::InvalidResponse(_) | ApiError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Text suitable for showing to the user as a transient notification.
    pub fn user_message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Timeout(m)
            | ApiError::ConnectionRefused(m)
            | ApiError::NetworkUnreachable(m)
            | ApiError::ServerError(m)
            | ApiError::AuthExpired(m)
            | ApiError::RefreshFailed(m)
            | ApiError::InvalidResponse(m)
            | ApiError::Unknown(m) => m,
            ApiError::Application { message, .. } => message,
        }
    }

    /// Whether the failure ended the session and a new login is needed.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::AuthExpired(_) | ApiError::RefreshFailed(_))
    }
}
