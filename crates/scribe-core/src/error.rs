//! Error types for the synchronization core

use thiserror::Error;

use crate::store::StoreError;

/// Core error types
///
/// `VersionMismatch` and `InvalidStep` are protocol-level rejections: the
/// submitting client must resynchronize, while the instance itself stays
/// untouched and available to everyone else.
#[derive(Error, Debug)]
pub enum Error {
    #[error("base version {submitted} does not match instance version {current}")]
    VersionMismatch { submitted: u64, current: u64 },

    #[error("step cannot be applied: {0}")]
    InvalidStep(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("invalid scope key: {0}")]
    InvalidScopeKey(String),

    #[error("step log encoding: {0}")]
    Encoding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
