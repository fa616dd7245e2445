use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced to HTTP clients. Bodies are plain text because the share
/// page shows them to the user verbatim.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or out-of-range creation input.
    #[error("{0}")]
    InvalidInput(String),

    /// Create request with a body encoding we do not accept.
    #[error("unsupported content type: expected a form or multipart body")]
    UnsupportedMediaType,

    /// Unknown key, or the secret ran out its time budget and is gone.
    #[error("secret not found or expired")]
    NotFound,

    /// The view budget is spent; the payload no longer exists anywhere.
    #[error("secret already viewed and destroyed")]
    Spent,
}

impl ApiError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Spent => StatusCode::GONE,
        }
    }
}

/// Result type alias for handler fallible paths.
pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
