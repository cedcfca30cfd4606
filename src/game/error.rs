use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Rejected game input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameError {
    /// Difficulties start at 1.
    InvalidDifficulty(i64),
    /// A stored document does not decode into the expected record.
    InvalidRecord(String),
    /// Unknown weekday code or filter key.
    UnknownCode(String),
}

impl Display for GameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GameError::InvalidDifficulty(difficulty) => {
                write!(f, "difficulty must be at least 1, got {difficulty}")
            }
            GameError::InvalidRecord(message) => write!(f, "invalid record: {message}"),
            GameError::UnknownCode(code) => write!(f, "unknown code `{code}`"),
        }
    }
}

impl Error for GameError {}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        GameError::InvalidRecord(err.to_string())
    }
}

pub type GameResult<T> = Result<T, GameError>;
