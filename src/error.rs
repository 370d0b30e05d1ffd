//! Error types for the port query engine

use pyo3::exceptions::{PyOSError, PyRuntimeError, PyValueError};
use pyo3::PyErr;
use thiserror::Error;

/// Misuse of the prepare / run / finalize protocol
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("Previous query has not been finalized")]
    AlreadyPrepared,

    #[error("No query prepared")]
    NotPrepared,
}

/// Main error type for the port query engine
#[derive(Error, Debug)]
pub enum PortQueryError {
    #[error("Malformed lexeme: '{0}'")]
    Lex(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    State(#[from] StateError),

    #[error("Scan of port {port} failed: {message}")]
    Scan { port: u16, message: String },

    #[error("Job failed: {0}")]
    Job(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortQueryError {
    /// Shorthand for building a [`PortQueryError::Parse`]
    pub fn parse(message: impl Into<String>) -> Self {
        PortQueryError::Parse(message.into())
    }
}

impl From<PortQueryError> for PyErr {
    fn from(err: PortQueryError) -> PyErr {
        match err {
            PortQueryError::Lex(_) | PortQueryError::Parse(_) | PortQueryError::Config(_) => {
                PyValueError::new_err(err.to_string())
            }
            PortQueryError::Io(_) => PyOSError::new_err(err.to_string()),
            PortQueryError::State(_) | PortQueryError::Scan { .. } | PortQueryError::Job(_) => {
                PyRuntimeError::new_err(err.to_string())
            }
        }
    }
}

/// Result type alias for the port query engine
pub type Result<T> = std::result::Result<T, PortQueryError>;
