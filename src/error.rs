//! Error types for autoquant

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Structural mismatch in scope '{scope}' at op {index}: expected {expected}, got {found}"
    )]
    StructuralMismatch {
        scope: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("Unknown observer: {0}")]
    UnknownObserver(String),

    #[error("Unknown qscheme: {0}")]
    UnknownQScheme(String),

    #[error("Unknown dtype: {0}")]
    UnknownDtype(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// True for failures to resolve a name against a fixed vocabulary
    /// (observer class, qscheme, dtype).
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::UnknownObserver(_) | Error::UnknownQScheme(_) | Error::UnknownDtype(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
