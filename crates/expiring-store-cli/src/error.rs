//! Error types for the estore CLI

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Store(expiring_store::StoreError),
    Io(Box<std::io::Error>),
    Config(String),
    Json(String),
    InvalidId(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Store(err) => write!(f, "Store error: {}", err),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Json(msg) => write!(f, "JSON error: {}", msg),
            CliError::InvalidId(id) => write!(f, "Invalid note id: {:?}", id),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Store(err) => Some(err),
            CliError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<expiring_store::StoreError> for CliError {
    fn from(err: expiring_store::StoreError) -> Self {
        CliError::Store(err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Json(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
