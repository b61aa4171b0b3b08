//! HNSW search algorithms.
//!
//! Everything here reads the graph; insertion in [`crate::insert`] collects
//! candidates with these routines before it mutates any edge.

use crate::graph::HnswGraph;
use crate::visited::VisitedSet;
use needle_core::{IndexResult, InternalId, LabelFilter, MetricSpace, PointStore};
use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

thread_local! {
    /// Reused across queries on the same thread.
    static SEARCH_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::new(0));
}

/// A node paired with its distance to the current query.
///
/// Ordered by distance, then by id, so heaps and sorts are deterministic.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: InternalId,
    pub distance: f32,
}

impl Candidate {
    pub fn new(id: InternalId, distance: f32) -> Self {
        Self { id, distance }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Borrowed view of everything a traversal needs.
#[derive(Clone, Copy)]
pub struct Layers<'a> {
    pub space: &'a MetricSpace,
    pub store: &'a PointStore,
    pub graph: &'a HnswGraph,
}

impl<'a> Layers<'a> {
    #[inline]
    pub fn distance_to(&self, query: &[f32], id: InternalId) -> f32 {
        self.space.dist(query, self.store.vector(id))
    }

    #[inline]
    fn distance_between(&self, a: InternalId, b: InternalId) -> f32 {
        self.space.dist(self.store.vector(a), self.store.vector(b))
    }

    /// Move to the closest neighbor until no neighbor improves on the current
    /// node.
    pub fn greedy_closest(&self, query: &[f32], start: Candidate, layer: usize) -> Candidate {
        let mut best = start;
        let mut changed = true;
        while changed {
            changed = false;
            for &neighbor in self.graph.neighbors(best.id, layer) {
                let dist = self.distance_to(query, neighbor);
                if dist < best.distance {
                    best = Candidate::new(neighbor, dist);
                    changed = true;
                }
            }
        }
        best
    }

    /// Greedy descent from the entry point through layers `top..=bottom`,
    /// where `top` is the graph's current top layer.
    pub fn descend(&self, query: &[f32], bottom: usize) -> Option<Candidate> {
        let entry = self.graph.entry_point()?;
        let mut current = Candidate::new(entry, self.distance_to(query, entry));
        for layer in (bottom..=self.graph.max_layer()).rev() {
            current = self.greedy_closest(query, current, layer);
        }
        Some(current)
    }

    /// Beam search of width `ef` on one layer.
    ///
    /// Every reachable node is a traversal candidate; `accept` decides which
    /// of them may enter the result set and is asked at most once per node.
    /// Returns the accepted nodes sorted by ascending distance.
    pub fn search_layer<A>(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
        mut accept: A,
    ) -> IndexResult<Vec<Candidate>>
    where
        A: FnMut(InternalId) -> IndexResult<bool>,
    {
        visited.clear();
        visited.ensure_capacity(self.store.len());

        // The beam never holds more than the stored points.
        let bound = ef.min(self.store.len()).saturating_add(1);
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(bound);
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(bound);

        for &ep in entry_points {
            if visited.insert(ep.id) {
                candidates.push(Reverse(ep));
                if accept(ep.id)? {
                    results.push(ep);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= ef {
                if let Some(worst) = results.peek() {
                    if current.distance > worst.distance {
                        break;
                    }
                }
            }

            for &neighbor in self.graph.neighbors(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let dist = self.distance_to(query, neighbor);
                let should_add = results.len() < ef
                    || results.peek().map_or(true, |worst| dist < worst.distance);

                if should_add {
                    let next = Candidate::new(neighbor, dist);
                    candidates.push(Reverse(next));
                    if accept(neighbor)? {
                        results.push(next);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        Ok(results.into_sorted_vec())
    }

    /// Diversity-aware neighbor selection.
    ///
    /// A candidate is kept only if it is closer to the base point than to any
    /// neighbor already kept. With `keep_pruned`, discarded candidates fill
    /// the remaining slots in distance order.
    pub fn select_neighbors(
        &self,
        candidates: &[Candidate],
        m: usize,
        keep_pruned: bool,
    ) -> Vec<Candidate> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable();
        if sorted.len() <= m {
            return sorted;
        }

        let mut selected: Vec<Candidate> = Vec::with_capacity(m);
        let mut discarded: Vec<Candidate> = Vec::new();

        for candidate in sorted {
            if selected.len() >= m {
                break;
            }
            let diverse = selected
                .iter()
                .all(|kept| self.distance_between(candidate.id, kept.id) >= candidate.distance);
            if diverse {
                selected.push(candidate);
            } else {
                discarded.push(candidate);
            }
        }

        if keep_pruned && selected.len() < m {
            let missing = m - selected.len();
            selected.extend(discarded.into_iter().take(missing));
        }

        selected
    }

    /// k-nearest-neighbor query.
    ///
    /// Soft-deleted nodes are traversed but never returned. The filter is
    /// consulted only for live nodes that qualify for the result set.
    pub fn knn<F>(&self, query: &[f32], k: usize, ef: usize, filter: &mut F) -> IndexResult<Vec<Candidate>>
    where
        F: LabelFilter + ?Sized,
    {
        let Some(start) = self.descend(query, 1) else {
            return Ok(Vec::new());
        };

        let store = self.store;
        let accept = |id: InternalId| {
            if store.is_deleted(id) {
                Ok(false)
            } else {
                filter.accept(store.label(id))
            }
        };

        let mut found = with_visited(store.len(), |visited| {
            self.search_layer(query, &[start], ef.max(k), 0, visited, accept)
        })?;

        found.truncate(k);
        Ok(found)
    }
}

/// Run `f` with this thread's pooled visited set.
pub(crate) fn with_visited<R>(capacity: usize, f: impl FnOnce(&mut VisitedSet) -> R) -> R {
    SEARCH_VISITED.with(|cell| match cell.try_borrow_mut() {
        Ok(mut visited) => f(&mut visited),
        // Re-entered from a filter that queries another index on this thread.
        Err(_) => f(&mut VisitedSet::new(capacity)),
    })
}
