//! HNSW insertion: level assignment, linking and neighbor-list pruning.

use crate::config::HnswConfig;
use crate::graph::HnswGraph;
use crate::search::{with_visited, Candidate, Layers};
use needle_core::{IndexResult, InternalId, MetricSpace, PointStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Seeded source of node levels.
///
/// Counts its draws so a restored index can resume the exact sequence.
#[derive(Debug, Clone)]
pub struct LevelGenerator {
    rng: StdRng,
    seed: u64,
    ml: f64,
    draws: u64,
}

impl LevelGenerator {
    pub fn new(seed: u64, ml: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            ml,
            draws: 0,
        }
    }

    /// A generator positioned after `draws` levels have been taken.
    pub fn resume(seed: u64, ml: f64, draws: u64) -> Self {
        let mut generator = Self::new(seed, ml);
        for _ in 0..draws {
            generator.draw();
        }
        generator
    }

    /// `floor(-ln(U) * mL)` with `U` uniform in `(0, 1]`.
    pub fn draw(&mut self) -> usize {
        let u = 1.0 - self.rng.gen::<f64>();
        self.draws += 1;
        let level = (-u.ln() * self.ml).floor() as usize;
        trace!(level, draw = self.draws, "drew node level");
        level
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Mutable view used while linking one node into the graph.
pub(crate) struct Linker<'a> {
    pub space: &'a MetricSpace,
    pub config: &'a HnswConfig,
    pub store: &'a PointStore,
    pub graph: &'a mut HnswGraph,
}

impl<'a> Linker<'a> {
    fn layers(&self) -> Layers<'_> {
        Layers {
            space: self.space,
            store: self.store,
            graph: &*self.graph,
        }
    }

    /// Link a freshly pushed node into every layer up to its level.
    pub fn link_new(&mut self, id: InternalId) -> IndexResult<()> {
        let level = self.graph.level(id);
        let Some(entry) = self.graph.entry_point() else {
            self.graph.set_entry_point(id);
            return Ok(());
        };
        let top = self.graph.max_layer();

        self.link_from(id, entry, level)?;

        if level > top {
            self.graph.set_entry_point(id);
        }
        Ok(())
    }

    /// Re-link a soft-deleted slot that now holds a new vector.
    ///
    /// Former neighbors first get their lists rebuilt from the surrounding
    /// two-hop pool, then the node itself is linked as if newly inserted,
    /// keeping its level.
    pub fn relink_replaced(&mut self, id: InternalId) -> IndexResult<()> {
        let level = self.graph.level(id);
        for layer in 0..=level {
            self.repair_neighborhood(id, layer);
        }

        let Some(entry) = self.graph.entry_point() else {
            return Ok(());
        };
        if self.graph.len() == 1 {
            return Ok(());
        }
        self.link_from(id, entry, level)
    }

    fn link_from(&mut self, id: InternalId, entry: InternalId, level: usize) -> IndexResult<()> {
        let top = self.graph.max_layer();
        let store = self.store;
        let query = store.vector(id);
        let ef = self.config.ef_construction;

        let mut entry_points = {
            let layers = self.layers();
            let mut current = Candidate::new(entry, layers.distance_to(query, entry));
            for layer in (level + 1..=top).rev() {
                current = layers.greedy_closest(query, current, layer);
            }
            vec![current]
        };

        with_visited(store.len(), |visited| -> IndexResult<()> {
            for layer in (0..=level.min(top)).rev() {
                let found = self.layers().search_layer(
                    query,
                    &entry_points,
                    ef,
                    layer,
                    visited,
                    |n| Ok(n != id),
                )?;
                if found.is_empty() {
                    continue;
                }
                self.connect(id, layer, &found);
                entry_points = found;
            }
            Ok(())
        })
    }

    /// Give `id` up to `M` diverse neighbors from `candidates` on `layer`,
    /// add the reverse edges, and prune any neighbor pushed over its bound.
    pub fn connect(&mut self, id: InternalId, layer: usize, candidates: &[Candidate]) {
        let selected = self
            .layers()
            .select_neighbors(candidates, self.config.m, true);
        let bound = self.config.max_connections(layer);

        self.graph
            .set_neighbors(id, layer, selected.iter().map(|c| c.id).collect());

        for neighbor in selected {
            if self.graph.add_neighbor(neighbor.id, layer, id) > bound {
                self.prune(neighbor.id, layer);
            }
        }
    }

    /// Shrink the neighbor list of `node` on `layer` to its bound.
    pub fn prune(&mut self, node: InternalId, layer: usize) {
        let bound = self.config.max_connections(layer);
        let kept = {
            let layers = self.layers();
            let base = self.store.vector(node);
            let candidates: Vec<Candidate> = self
                .graph
                .neighbors(node, layer)
                .iter()
                .map(|&n| Candidate::new(n, self.space.dist(base, self.store.vector(n))))
                .collect();
            layers.select_neighbors(&candidates, bound, true)
        };
        self.graph
            .set_neighbors(node, layer, kept.into_iter().map(|c| c.id).collect());
    }

    /// Rebuild the lists of `id`'s neighbors on `layer` from the pool of
    /// `id` itself and its one- and two-hop neighbors.
    fn repair_neighborhood(&mut self, id: InternalId, layer: usize) {
        let direct: Vec<InternalId> = self.graph.neighbors(id, layer).to_vec();
        if direct.is_empty() {
            return;
        }

        let mut pool = direct.clone();
        pool.push(id);
        for &n in &direct {
            pool.extend_from_slice(self.graph.neighbors(n, layer));
        }
        pool.sort_unstable();
        pool.dedup();

        let bound = self.config.max_connections(layer);
        for &n in &direct {
            let kept = {
                let base = self.store.vector(n);
                let candidates: Vec<Candidate> = pool
                    .iter()
                    .filter(|&&c| c != n)
                    .map(|&c| Candidate::new(c, self.space.dist(base, self.store.vector(c))))
                    .collect();
                self.layers().select_neighbors(&candidates, bound, true)
            };
            self.graph
                .set_neighbors(n, layer, kept.into_iter().map(|c| c.id).collect());
        }
    }
}
