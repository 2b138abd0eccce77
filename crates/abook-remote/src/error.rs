use crate::response::StatusCode;

/// Outcome of a rejected `RateLimitedStore` operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Quota exhausted until {reset_at}")]
    QuotaExceeded { reset_at: i64 },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Tag already exists: {0}")]
    AlreadyExists(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The caller's change token still matches; nothing was spent.
    #[error("Not modified")]
    NotModified,
}

impl StoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StoreError::NotModified => StatusCode::NOT_MODIFIED,
        }
    }
}

/// Error view of a non-successful remote response, as seen by commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("Remote request failed with status {status}: {message}")]
    Failed { status: u16, message: String },

    #[error("Remote quota exceeded, resets at {reset_at}")]
    QuotaExceeded { reset_at: i64 },

    #[error("Not found on remote: {0}")]
    NotFound(String),

    #[error("Already exists on remote: {0}")]
    AlreadyExists(String),

    #[error("Rejected by remote: {0}")]
    BadRequest(String),

    #[error("Not modified")]
    NotModified,
}

impl RemoteError {
    /// Build the error for a response status. `message` is the response body.
    pub fn from_status(status: StatusCode, message: impl Into<String>, reset_at: i64) -> Self {
        let message = message.into();
        match status {
            StatusCode::FORBIDDEN => RemoteError::QuotaExceeded { reset_at },
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            StatusCode::CONFLICT => RemoteError::AlreadyExists(message),
            StatusCode::BAD_REQUEST => RemoteError::BadRequest(message),
            StatusCode::NOT_MODIFIED => RemoteError::NotModified,
            other => RemoteError::Failed {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Returns true if a later attempt may succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Failed { .. } | RemoteError::QuotaExceeded { .. }
        )
    }
}
