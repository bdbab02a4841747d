//! Error types for the taxonomy builder.
//!
//! `TaxonomyError` is fatal and ends the run. `RecordError` describes why a single
//! label record was dropped; it is counted in the run statistics and never escapes
//! the loader.

use std::path::PathBuf;
use thiserror::Error;

pub type TaxonomyResult<T> = Result<T, TaxonomyError>;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no files matching '{pattern}' in {}", dir.display())]
    NoInputFiles { dir: PathBuf, pattern: String },

    #[error("invalid input in {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("no valid labels in input ({total} records read, {dropped} dropped)")]
    EmptyInput { total: usize, dropped: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to serialize taxonomy: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TaxonomyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaxonomyError::Io { path: path.into(), source }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            TaxonomyError::EmptyInput { .. } => 2,
            _ => 1,
        }
    }
}

/// Reason a label record was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("record is not an object")]
    NotAnObject,

    #[error("missing or mistyped field '{0}'")]
    MissingField(&'static str),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}
