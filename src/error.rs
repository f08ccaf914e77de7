use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Server-side signing credential unusable. Non-retryable configuration
    /// error.
    #[error("invalid signing key: expected keyName:keySecret")]
    SigningKeyMalformed,

    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("channel name requires a non-empty {0} identifier")]
    EmptyIdentifier(&'static str),

    /// No persisted identity; the caller redirects to the login surface.
    #[error("not logged in")]
    NotLoggedIn,

    /// A session operation was attempted out of phase, e.g. publishing
    /// before the channel attached.
    #[error("session is {actual}, operation requires {required}")]
    OutOfPhase {
        required: &'static str,
        actual: &'static str,
    },

    #[error("profile storage error: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
