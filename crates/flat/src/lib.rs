//! Exact nearest neighbor search by linear scan.
//!
//! [`BruteforceSearch`] computes the distance from the query to every stored
//! point and keeps the k smallest. It serves as ground truth for the graph
//! index and as the index of choice for small collections.

mod serialize;

use needle_core::{
    AcceptAll, FallibleFilter, IndexError, IndexResult, InternalId, Label, LabelFilter,
    MetricSpace, Persist, PointStore, Predicate, SearchResult,
};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Display;
use tracing::debug;

pub use needle_core::{ErrorKind, Metric};

/// A scanned point, ordered by distance then internal id.
#[derive(Debug, Clone, Copy)]
struct Hit {
    id: InternalId,
    distance: f32,
}

impl PartialEq for Hit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Hit {}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Linear-scan index with hard removal.
///
/// Removing a point moves the last stored point into its slot, so internal
/// ids are dense but not stable across removals.
#[derive(Debug, Clone)]
pub struct BruteforceSearch {
    space: MetricSpace,
    store: PointStore,
}

impl BruteforceSearch {
    pub fn new(space_name: &str, num_dimensions: usize) -> IndexResult<Self> {
        Ok(Self::with_space(MetricSpace::new(space_name, num_dimensions)?))
    }

    pub fn with_space(space: MetricSpace) -> Self {
        Self {
            store: PointStore::new(space.num_dimensions()),
            space,
        }
    }

    /// Allocate `max_elements` slots, discarding any previous contents.
    pub fn init_index(&mut self, max_elements: usize) {
        debug!(max_elements, "initializing brute-force index");
        self.store.reserve(max_elements);
    }

    pub fn is_index_initialized(&self) -> bool {
        self.store.is_reserved()
    }

    /// Store `point` under a label that is not in use yet.
    pub fn add_point(&mut self, point: &[f32], label: Label) -> IndexResult<()> {
        self.store.insert(label, point, false)?;
        Ok(())
    }

    /// Remove `label` for good, compacting storage.
    pub fn remove_point(&mut self, label: Label) -> IndexResult<()> {
        let (freed, moved_from) = self.store.swap_remove(label)?;
        if let Some(from) = moved_from {
            debug!(label, freed, from, "compacted brute-force slot");
        }
        Ok(())
    }

    /// k nearest points, optionally restricted by a label predicate.
    pub fn search_knn(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&dyn Fn(Label) -> bool>,
    ) -> IndexResult<SearchResult> {
        match filter {
            Some(f) => self.search_knn_with(query, k, &mut Predicate(f)),
            None => self.search_knn_with(query, k, &mut AcceptAll),
        }
    }

    /// Like [`search_knn`](Self::search_knn) with a fallible predicate.
    pub fn try_search_knn<F, E>(&self, query: &[f32], k: usize, filter: F) -> IndexResult<SearchResult>
    where
        F: FnMut(Label) -> Result<bool, E>,
        E: Display,
    {
        self.search_knn_with(query, k, &mut FallibleFilter(filter))
    }

    pub fn search_knn_with<F>(&self, query: &[f32], k: usize, filter: &mut F) -> IndexResult<SearchResult>
    where
        F: LabelFilter + ?Sized,
    {
        self.ensure_initialized()?;
        self.space.check_dimension(query)?;
        let capacity = self.store.capacity();
        if k > capacity {
            return Err(IndexError::KTooLarge {
                k,
                max_elements: capacity,
            });
        }
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "the number of neighbors must be a positive number".into(),
            ));
        }

        // Max-heap of the k best so far; the root is the worst kept hit.
        let mut heap: BinaryHeap<Hit> = BinaryHeap::with_capacity(k.min(self.store.len()) + 1);
        for (id, label, vector) in self.store.iter_live() {
            if !filter.accept(label)? {
                continue;
            }
            let hit = Hit {
                id,
                distance: self.space.dist(query, vector),
            };
            if heap.len() < k {
                heap.push(hit);
            } else if heap.peek().map_or(false, |worst| hit < *worst) {
                heap.pop();
                heap.push(hit);
            }
        }

        let hits = heap.into_sorted_vec();
        Ok(SearchResult::from_sorted(
            hits.into_iter()
                .map(|h| (self.store.label(h.id), h.distance)),
        ))
    }

    /// The stored vector of `label`.
    pub fn get_point(&self, label: Label) -> IndexResult<&[f32]> {
        self.store.get(label)
    }

    /// Stored labels, ascending. Empty before initialization.
    pub fn get_used_labels(&self) -> Vec<Label> {
        self.store.used_labels()
    }

    pub fn get_max_elements(&self) -> IndexResult<usize> {
        self.ensure_initialized()?;
        Ok(self.store.capacity())
    }

    pub fn get_current_count(&self) -> IndexResult<usize> {
        self.ensure_initialized()?;
        Ok(self.store.len())
    }

    pub fn get_num_dimensions(&self) -> usize {
        self.space.num_dimensions()
    }

    pub fn space(&self) -> &MetricSpace {
        &self.space
    }

    fn ensure_initialized(&self) -> IndexResult<()> {
        if self.store.is_reserved() {
            Ok(())
        } else {
            Err(IndexError::NotInitialized)
        }
    }
}

impl Persist for BruteforceSearch {
    fn write_index_to_buffer(&self) -> IndexResult<Vec<u8>> {
        self.ensure_initialized()?;
        let bytes = serialize::encode(&self.space, &self.store);
        debug!(bytes = bytes.len(), "encoded brute-force index");
        Ok(bytes)
    }

    /// Replace the contents with a decoded snapshot and mark the index
    /// initialized. On failure the index is left as it was.
    fn read_index_from_buffer(&mut self, buffer: &[u8]) -> IndexResult<()> {
        let store = serialize::decode(&self.space, buffer)?;
        debug!(
            count = store.len(),
            max_elements = store.capacity(),
            "decoded brute-force index"
        );
        self.store = store;
        Ok(())
    }
}
