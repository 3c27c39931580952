//! Error types for SDC models

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid FHIR resource: {0}")]
    InvalidResource(String),

    #[error("Invalid field value: {0}")]
    InvalidFieldValue(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
