//! Index error types.

use crate::types::Label;
use thiserror::Error;

/// Errors returned by index operations.
///
/// Every failure is reported to the immediate caller and never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Search index has not been initialized, call `init_index` in advance")]
    NotInitialized,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("The maximum number of elements has been reached in index, max_elements: {max_elements}")]
    CapacityExceeded { max_elements: usize },

    #[error("Label not found: {0}")]
    LabelNotFound(Label),

    #[error("Label already in use: {0}")]
    DuplicateLabel(Label),

    #[error("k = {k} exceeds the maximum number of elements ({max_elements})")]
    KTooLarge { k: usize, max_elements: usize },

    #[error("Corrupt index data: {0}")]
    CorruptData(String),

    #[error("Filter predicate failed: {0}")]
    PredicateFailure(String),
}

/// Field-less discriminant of [`IndexError`], for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotInitialized,
    InvalidArgument,
    DimensionMismatch,
    CapacityExceeded,
    LabelNotFound,
    DuplicateLabel,
    KTooLarge,
    CorruptData,
    PredicateFailure,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::NotInitialized => ErrorKind::NotInitialized,
            IndexError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IndexError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            IndexError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            IndexError::LabelNotFound(_) => ErrorKind::LabelNotFound,
            IndexError::DuplicateLabel(_) => ErrorKind::DuplicateLabel,
            IndexError::KTooLarge { .. } => ErrorKind::KTooLarge,
            IndexError::CorruptData(_) => ErrorKind::CorruptData,
            IndexError::PredicateFailure(_) => ErrorKind::PredicateFailure,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
