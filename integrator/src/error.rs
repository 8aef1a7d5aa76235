//! error.rs - error type shared by the mapping, enrichment and pairing code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Incompatible species: '{left}' cannot be combined with '{right}'")]
    IncompatibleSpecies { left: String, right: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Unsupported serialization version {0}")]
    UnsupportedVersion(u32),
}

impl IntegratorError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        IntegratorError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IntegratorError>;
