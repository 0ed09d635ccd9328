//! Extraction error taxonomy.
//!
//! `ExtractError` is what the pipeline stages return. Anything that happens
//! inside a batch is turned into a [`RecordedError`] and kept on the
//! document's result instead of being propagated.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("malformed XML: {0}")]
    FileParse(String),

    #[error("data source: {0}")]
    DataSource(String),

    #[error("data set: {0}")]
    DataSet(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl ExtractError {
    /// The subkind this error is recorded under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedSchema(_) => ErrorKind::UnsupportedSchema,
            Self::DataSource(_) => ErrorKind::DataSourceError,
            Self::DataSet(_) => ErrorKind::DataSetError,
            Self::FileParse(_) | Self::Io(_) | Self::Config(_) | Self::Worker(_) => {
                ErrorKind::FileParseError
            }
        }
    }

    pub fn record(&self) -> RecordedError {
        RecordedError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Subkind attached to every recorded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedSchema,
    FileParseError,
    DataSourceError,
    DataSetError,
}

impl ErrorKind {
    /// Fatal kinds mean the file contributed nothing.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::UnsupportedSchema | Self::FileParseError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UnsupportedSchema => "UnsupportedSchema",
            Self::FileParseError => "FileParseError",
            Self::DataSourceError => "DataSourceError",
            Self::DataSetError => "DataSetError",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, ExtractError>;
