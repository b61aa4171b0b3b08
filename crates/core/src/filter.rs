//! Label filters applied when a candidate is accepted into a result set.
//!
//! A filter is passed per call and consulted once per candidate label. It only
//! sees labels, never the index, so it cannot mutate index state. Results are
//! never cached across calls.

use crate::error::{IndexError, IndexResult};
use crate::types::Label;
use std::fmt::Display;

/// Decides whether a label may appear in a result set.
pub trait LabelFilter {
    fn accept(&mut self, label: Label) -> IndexResult<bool>;
}

/// Accepts every label.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl LabelFilter for AcceptAll {
    #[inline]
    fn accept(&mut self, _label: Label) -> IndexResult<bool> {
        Ok(true)
    }
}

/// Infallible predicate `label -> bool`.
pub struct Predicate<F>(pub F);

impl<F> LabelFilter for Predicate<F>
where
    F: Fn(Label) -> bool,
{
    #[inline]
    fn accept(&mut self, label: Label) -> IndexResult<bool> {
        Ok((self.0)(label))
    }
}

/// Fallible predicate. An `Err` aborts the search with
/// [`IndexError::PredicateFailure`].
pub struct FallibleFilter<F>(pub F);

impl<F, E> LabelFilter for FallibleFilter<F>
where
    F: FnMut(Label) -> Result<bool, E>,
    E: Display,
{
    #[inline]
    fn accept(&mut self, label: Label) -> IndexResult<bool> {
        (self.0)(label).map_err(|e| IndexError::PredicateFailure(e.to_string()))
    }
}
