use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the user switcher
#[derive(Debug, thiserror::Error)]
pub enum SwitcherError {
    /// An identifier was rejected or could not be resolved to a user.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Error body returned to clients.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl SwitcherError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a recoverable validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// The message without the variant prefix, suitable for end users.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Internal(msg) => msg.clone(),
            Self::Anyhow(err) => err.to_string(),
        }
    }

    /// Convert error to a JSON response
    ///
    /// # Security
    ///
    /// Internal error details are only exposed when `dev_mode` is `true`.
    /// Validation messages are always shown since they only describe the
    /// identifier the client sent.
    pub fn into_response_with_info(self, dev_mode: bool) -> Response {
        let status = self.status_code();

        let error = if dev_mode {
            self.to_string()
        } else {
            self.safe_message()
        };
        let error_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "Request failed"
        );

        (status, Json(ErrorResponse { error, error_id })).into_response()
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn safe_message(&self) -> String {
        match self {
            Self::Validation(_) => self.to_string(),
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for SwitcherError {
    fn into_response(self) -> Response {
        self.into_response_with_info(false)
    }
}

/// Result type alias for the user switcher
pub type Result<T> = std::result::Result<T, SwitcherError>;

impl From<serde_json::Error> for SwitcherError {
    fn from(err: serde_json::Error) -> Self {
        SwitcherError::Internal(format!("Session value serialization error: {}", err))
    }
}
