use std::fmt;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The storage backend cannot be reached (no `localStorage`, missing directory, ...).
    Unavailable(String),
    Io(String),
    Serialization(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Unavailable(message) => write!(f, "Cache storage unavailable: {message}"),
            CacheError::Io(message) => write!(f, "Cache I/O error: {message}"),
            CacheError::Serialization(message) => write!(f, "Cache serialization error: {message}"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(error.to_string())
    }
}
