// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while interpreting an attribute query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("autocomplete attribute {attr} has no value to complete")]
    MissingAutocompleteValue { attr: String },
}

/// Errors that can occur when building, loading or saving an extraction
/// configuration.
#[derive(Debug, Error)]
pub enum ConfError {
    #[error("no atomStructure specified and the value cannot be inferred due to multiple involved structures")]
    AtomNotInferable,

    #[error("atom structure '{atom}' does not exist in corpus {corpus}")]
    UnknownAtom { atom: String, corpus: String },

    #[error("invalid mergeAttr format: {0}")]
    InvalidMergeAttr(String),

    #[error("extraction configuration not found for corpus {corpus}")]
    NotFound { corpus: String },

    #[error("IO error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed extraction configuration {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors reported by an extraction backend before its progress stream exists.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to start extraction: {0}")]
    SpawnFailed(String),

    #[error("failed to write extraction configuration: {0}")]
    ConfWrite(#[from] std::io::Error),

    #[error("failed to encode extraction configuration: {0}")]
    ConfEncode(#[from] serde_json::Error),
}

/// Errors that can occur when loading the application configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}
