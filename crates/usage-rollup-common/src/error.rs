use thiserror::Error;

use crate::types::UserId;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed store failure carried through the pipeline without tying callers to a backend.
pub type StoreFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed request fields. Rejected with no side effect.
    #[error("Invalid input: {0}")]
    Input(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to read usage for user {user}: {source}")]
    StoreRead {
        user: UserId,
        #[source]
        source: StoreFailure,
    },

    #[error("Failed to write summary for user {user}: {source}")]
    StoreWrite {
        user: UserId,
        #[source]
        source: StoreFailure,
    },

    /// The record store cannot be reached at all.
    #[error("Record store unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }

    /// The user a per-user store failure is attributed to.
    pub fn user(&self) -> Option<&UserId> {
        match self {
            Error::StoreRead { user, .. } | Error::StoreWrite { user, .. } => Some(user),
            _ => None,
        }
    }
}

/// Credential failures. Messages never reveal whether an account exists.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Forbidden")]
    Forbidden,
}
