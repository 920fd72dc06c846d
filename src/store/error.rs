//! Storage error types.

use std::fmt;

/// Errors surfaced by the storage collaborator.
#[derive(Debug)]
pub enum StoreError {
    /// IO error
    Io(std::io::Error),
    /// Store is unreachable or the connection was lost
    Unavailable(String),
    /// A read or write was rejected by the store
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Unavailable(e) => write!(f, "store unavailable: {}", e),
            Self::Query(e) => write!(f, "query error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
