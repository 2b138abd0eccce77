/// Malformed user input, caught before anything is sent to the remote.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Name '{0}' may only contain letters, digits, spaces and . ' -")]
    InvalidName(String),

    #[error("Phone '{0}' needs at least 3 digits and may only contain digits, spaces, + and -")]
    InvalidPhone(String),

    #[error("Email '{0}' must look like local-part@domain")]
    InvalidEmail(String),

    #[error("Address must not be blank when given")]
    BlankAddress,

    #[error("Tag '{0}' must be a single alphanumeric word")]
    InvalidTag(String),
}

/// Errors raised by a persistence collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Other(String),
}
