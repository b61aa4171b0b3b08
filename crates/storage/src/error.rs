//! Storage error types.

use needle_core::IndexError;
use thiserror::Error;

/// Errors from reading or writing index snapshots.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type StoreResult<T> = Result<T, StoreError>;
