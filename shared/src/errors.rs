/// Unified error types for Lectern.
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for Lectern.
#[derive(Debug, Error)]
pub enum LecternError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Harvest error: {0}")]
    Harvest(#[from] HarvestError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while establishing an authenticated portal session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credentials rejected by the portal")]
    Rejected,

    #[error("Portal unreachable: {0}")]
    Unreachable(String),

    #[error("Login page is missing the '{0}' form field")]
    MissingFormField(&'static str),

    #[error("Could not read credentials: {0}")]
    Credentials(String),

    #[error("Login failed after {0} attempts")]
    AttemptsExhausted(u32),
}

impl AuthError {
    /// Whether another login attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AuthError::Rejected | AuthError::Unreachable(_) | AuthError::MissingFormField(_)
        )
    }
}

/// A single course or session whose metadata could not be extracted.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Request for {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Missing {field} in {context}")]
    MissingField { field: &'static str, context: String },

    #[error("Invalid reference '{0}'")]
    InvalidReference(String),
}

/// A single download that did not complete.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid download link '{0}'")]
    InvalidLink(String),

    #[error("Request for {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Stream from {url} dropped after {received} bytes: {message}")]
    Interrupted {
        url: String,
        received: u64,
        message: String,
    },

    #[error("Incomplete download of {path:?}: expected {expected} bytes, have {received}")]
    Incomplete {
        path: PathBuf,
        expected: u64,
        received: u64,
    },

    #[error("IO error writing {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Wrap an IO error with the file it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransferError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the portal refused the request because the session is no
    /// longer valid.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, TransferError::Status { status: 401 | 403, .. })
    }
}

/// Errors reading or writing the register document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to read register {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Register {path:?} is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize register: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write register {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Lectern operations.
pub type LecternResult<T> = Result<T, LecternError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_retriable() {
        assert!(AuthError::Rejected.is_retriable());
        assert!(AuthError::Unreachable("timeout".into()).is_retriable());
        assert!(!AuthError::Credentials("closed stdin".into()).is_retriable());
        assert!(!AuthError::AttemptsExhausted(3).is_retriable());
    }

    #[test]
    fn test_expired_session_detection() {
        let err = TransferError::Status { url: "http://x/a".into(), status: 403 };
        assert!(err.is_auth_rejected());
        let err = TransferError::Status { url: "http://x/a".into(), status: 404 };
        assert!(!err.is_auth_rejected());
    }
}
