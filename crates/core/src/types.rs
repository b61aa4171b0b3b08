//! Core type definitions.

use crate::error::IndexResult;
use serde::{Deserialize, Serialize};

/// Caller-visible point identifier.
pub type Label = u32;

/// Dense slot index inside a [`PointStore`](crate::PointStore).
pub type InternalId = u32;

/// Result of a k-nearest-neighbor query.
///
/// `neighbors[i]` and `distances[i]` describe the same point; entries are
/// sorted by ascending distance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub neighbors: Vec<Label>,
    pub distances: Vec<f32>,
}

impl SearchResult {
    /// Build from `(label, distance)` pairs already sorted by distance.
    pub fn from_sorted(pairs: impl IntoIterator<Item = (Label, f32)>) -> Self {
        let (neighbors, distances) = pairs.into_iter().unzip();
        Self {
            neighbors,
            distances,
        }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Iterate `(label, distance)` pairs in ascending distance order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, f32)> + '_ {
        self.neighbors
            .iter()
            .copied()
            .zip(self.distances.iter().copied())
    }
}

/// Indexes that round-trip through an opaque byte buffer.
pub trait Persist {
    /// Encode the complete index state.
    fn write_index_to_buffer(&self) -> IndexResult<Vec<u8>>;

    /// Replace the index state with the one encoded in `buffer`.
    fn read_index_from_buffer(&mut self, buffer: &[u8]) -> IndexResult<()>;
}
