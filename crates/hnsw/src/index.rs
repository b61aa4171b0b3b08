//! The `HierarchicalNsw` index facade.

use crate::config::HnswConfig;
use crate::graph::{GraphStats, HnswGraph};
use crate::insert::{LevelGenerator, Linker};
use crate::search::Layers;
use crate::serialize;
use needle_core::{
    AcceptAll, FallibleFilter, IndexError, IndexResult, Label, LabelFilter, MetricSpace, Persist,
    Placement, PointStore, Predicate, SearchResult,
};
use std::fmt::Display;
use tracing::debug;

/// Everything created by `init_index`.
#[derive(Debug, Clone)]
pub(crate) struct HnswState {
    pub config: HnswConfig,
    pub store: PointStore,
    pub graph: HnswGraph,
    pub levels: LevelGenerator,
}

impl HnswState {
    fn new(dim: usize, max_elements: usize, config: HnswConfig) -> Self {
        let levels = LevelGenerator::new(config.seed, config.ml());
        Self {
            store: PointStore::with_capacity(dim, max_elements),
            graph: HnswGraph::with_capacity(max_elements.min(1 << 16)),
            levels,
            config,
        }
    }
}

/// Approximate k-nearest-neighbor index over a multi-layer proximity graph.
///
/// Construction fixes the metric space; `init_index` allocates capacity and
/// fixes the graph parameters. Every other operation fails with
/// [`IndexError::NotInitialized`] until then, except the label listings,
/// which are empty.
///
/// The index is not internally synchronized. It is `Send`, so it can be moved
/// to a worker or wrapped in a caller-owned mutex.
#[derive(Debug, Clone)]
pub struct HierarchicalNsw {
    space: MetricSpace,
    state: Option<HnswState>,
}

impl HierarchicalNsw {
    /// Create an uninitialized index for `space_name` (`"l2"`, `"ip"` or
    /// `"cosine"`).
    pub fn new(space_name: &str, num_dimensions: usize) -> IndexResult<Self> {
        Ok(Self::with_space(MetricSpace::new(space_name, num_dimensions)?))
    }

    pub fn with_space(space: MetricSpace) -> Self {
        Self { space, state: None }
    }

    /// Allocate `max_elements` slots with the given graph parameters.
    /// Any previous contents are discarded.
    pub fn init_index(
        &mut self,
        max_elements: usize,
        m: usize,
        ef_construction: usize,
        random_seed: u64,
    ) -> IndexResult<()> {
        let config = HnswConfig::new(m)
            .with_ef_construction(ef_construction)
            .with_seed(random_seed);
        self.init_with_config(max_elements, config)
    }

    pub fn init_with_config(&mut self, max_elements: usize, config: HnswConfig) -> IndexResult<()> {
        config.validate()?;
        debug!(
            max_elements,
            m = config.m,
            ef_construction = config.ef_construction,
            seed = config.seed,
            "initializing hnsw index"
        );
        self.state = Some(HnswState::new(
            self.space.num_dimensions(),
            max_elements,
            config,
        ));
        Ok(())
    }

    pub fn is_index_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Grow capacity. Ids, edges and the entry point are unchanged.
    pub fn resize_index(&mut self, new_max_elements: usize) -> IndexResult<()> {
        let state = self.state_mut()?;
        let old = state.store.capacity();
        state.store.resize(new_max_elements)?;
        debug!(old, new = new_max_elements, "resized hnsw index");
        Ok(())
    }

    /// Insert one point.
    ///
    /// With `replace_deleted`, a soft-deleted slot is reused before an unused
    /// one is consumed; see [`PointStore::insert`].
    pub fn add_point(&mut self, point: &[f32], label: Label, replace_deleted: bool) -> IndexResult<()> {
        let Self { space, state } = self;
        let state = state.as_mut().ok_or(IndexError::NotInitialized)?;

        let placement = state.store.insert(label, point, replace_deleted)?;
        let id = placement.id();
        if let Placement::Appended(_) = placement {
            let level = state.levels.draw();
            let node = state.graph.push_node(level);
            debug_assert_eq!(node, id, "graph and store out of step");
        }

        let mut linker = Linker {
            space: &*space,
            config: &state.config,
            store: &state.store,
            graph: &mut state.graph,
        };
        match placement {
            Placement::Appended(_) => linker.link_new(id),
            Placement::Replaced(_) => {
                debug!(label, id, "reusing deleted slot");
                linker.relink_replaced(id)
            }
        }
    }

    /// Insert `points[i]` under `labels[i]` in order. Stops at the first
    /// failure; points inserted before it stay in the index.
    pub fn add_points<P: AsRef<[f32]>>(
        &mut self,
        points: &[P],
        labels: &[Label],
        replace_deleted: bool,
    ) -> IndexResult<()> {
        self.state()?;
        if points.len() != labels.len() {
            return Err(IndexError::InvalidArgument(format!(
                "got {} points but {} labels",
                points.len(),
                labels.len()
            )));
        }
        if points.is_empty() {
            return Err(IndexError::InvalidArgument(
                "the number of points must be greater than 0".into(),
            ));
        }
        for (point, &label) in points.iter().zip(labels) {
            self.add_point(point.as_ref(), label, replace_deleted)?;
        }
        Ok(())
    }

    /// Insert points under generated labels and return them.
    ///
    /// With `replace_deleted`, labels of soft-deleted points are handed out
    /// first, ascending; the rest continue after the largest label in use.
    pub fn add_items<P: AsRef<[f32]>>(
        &mut self,
        points: &[P],
        replace_deleted: bool,
    ) -> IndexResult<Vec<Label>> {
        let labels = self
            .state()?
            .store
            .generate_labels(points.len(), replace_deleted)?;
        self.add_points(points, &labels, replace_deleted)?;
        Ok(labels)
    }

    /// Soft-delete a live label. It stays in the graph as a bridge but is
    /// never returned by a search.
    pub fn mark_delete(&mut self, label: Label) -> IndexResult<()> {
        self.state_mut()?.store.soft_delete(label)?;
        Ok(())
    }

    /// Soft-delete labels in order, stopping at the first failure.
    pub fn mark_delete_items(&mut self, labels: &[Label]) -> IndexResult<()> {
        let state = self.state_mut()?;
        for &label in labels {
            state.store.soft_delete(label)?;
        }
        Ok(())
    }

    /// Make a soft-deleted label searchable again.
    pub fn unmark_delete(&mut self, label: Label) -> IndexResult<()> {
        self.state_mut()?.store.undelete(label)?;
        Ok(())
    }

    /// k nearest live points, optionally restricted by a label predicate.
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

    /// Like [`search_knn`](Self::search_knn) with a fallible predicate. The
    /// first predicate error aborts the search with
    /// [`IndexError::PredicateFailure`].
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
        let state = self.state()?;
        self.space.check_dimension(query)?;
        if k > state.store.capacity() {
            return Err(IndexError::KTooLarge {
                k,
                max_elements: state.store.capacity(),
            });
        }
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "the number of neighbors must be a positive number".into(),
            ));
        }

        let layers = Layers {
            space: &self.space,
            store: &state.store,
            graph: &state.graph,
        };
        let found = layers.knn(query, k, state.config.ef_search, filter)?;
        Ok(SearchResult::from_sorted(
            found
                .into_iter()
                .map(|c| (state.store.label(c.id), c.distance)),
        ))
    }

    /// The stored vector of a live label.
    pub fn get_point(&self, label: Label) -> IndexResult<&[f32]> {
        self.state()?.store.get(label)
    }

    /// Live labels, ascending. Empty before initialization.
    pub fn get_used_labels(&self) -> Vec<Label> {
        self.state
            .as_ref()
            .map(|s| s.store.used_labels())
            .unwrap_or_default()
    }

    /// Soft-deleted labels, ascending. Empty before initialization.
    pub fn get_deleted_labels(&self) -> Vec<Label> {
        self.state
            .as_ref()
            .map(|s| s.store.deleted_labels())
            .unwrap_or_default()
    }

    /// Capacity set by `init_index` or `resize_index`.
    pub fn get_max_elements(&self) -> IndexResult<usize> {
        Ok(self.state()?.store.capacity())
    }

    /// Occupied slots, soft-deleted points included.
    pub fn get_current_count(&self) -> IndexResult<usize> {
        Ok(self.state()?.store.len())
    }

    pub fn get_num_dimensions(&self) -> usize {
        self.space.num_dimensions()
    }

    /// Current query beam width.
    pub fn get_ef_search(&self) -> IndexResult<usize> {
        Ok(self.state()?.config.ef_search)
    }

    /// Set the query beam width, `1..=MAX_EF`.
    pub fn set_ef_search(&mut self, ef: usize) -> IndexResult<()> {
        let state = self.state_mut()?;
        HnswConfig::check_ef_search(ef)?;
        state.config.ef_search = ef;
        Ok(())
    }

    pub fn space(&self) -> &MetricSpace {
        &self.space
    }

    pub fn config(&self) -> Option<&HnswConfig> {
        self.state.as_ref().map(|s| &s.config)
    }

    pub fn graph(&self) -> Option<&HnswGraph> {
        self.state.as_ref().map(|s| &s.graph)
    }

    pub fn stats(&self) -> IndexResult<GraphStats> {
        Ok(self.state()?.graph.stats())
    }

    fn state(&self) -> IndexResult<&HnswState> {
        self.state.as_ref().ok_or(IndexError::NotInitialized)
    }

    fn state_mut(&mut self) -> IndexResult<&mut HnswState> {
        self.state.as_mut().ok_or(IndexError::NotInitialized)
    }
}

impl Persist for HierarchicalNsw {
    fn write_index_to_buffer(&self) -> IndexResult<Vec<u8>> {
        let bytes = serialize::encode(&self.space, self.state()?);
        debug!(bytes = bytes.len(), "encoded hnsw index");
        Ok(bytes)
    }

    /// Replace the whole index with a decoded snapshot. On failure the index
    /// is left as it was.
    fn read_index_from_buffer(&mut self, buffer: &[u8]) -> IndexResult<()> {
        let state = serialize::decode(&self.space, buffer)?;
        debug!(
            count = state.store.len(),
            max_elements = state.store.capacity(),
            "decoded hnsw index"
        );
        self.state = Some(state);
        Ok(())
    }
}
