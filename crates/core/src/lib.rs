//! Core vector operations, metric spaces and point storage shared by the
//! needle indexes.
//!
//! Every index in the workspace is built from the same pieces:
//! - [`MetricSpace`]: a tagged [`Metric`] plus a fixed dimensionality
//! - [`PointStore`]: dense slot storage with a label map and soft-delete state
//! - [`IndexError`]: the error kinds shared by all index operations
//!
//! # Threading
//! Nothing here locks. An index is owned by exactly one logical thread of
//! control at a time; callers that share an index across threads must wrap it
//! in their own mutex.

pub mod codec;
pub mod distance;
pub mod error;
pub mod filter;
pub mod metric;
pub mod space;
pub mod store;
pub mod types;

pub use distance::{
    cosine_distance, cosine_similarity, dot_product, inner_product_distance, l2_distance_squared,
    normalize, normalized,
};
pub use error::{ErrorKind, IndexError, IndexResult};
pub use filter::{AcceptAll, FallibleFilter, LabelFilter, Predicate};
pub use metric::Metric;
pub use space::MetricSpace;
pub use store::{Placement, PointStore};
pub use types::{InternalId, Label, Persist, SearchResult};
