//! Binary snapshot format of a [`HierarchicalNsw`](crate::HierarchicalNsw).
//!
//! All integers are little-endian. `m`, `ef_constr` and `ef_search` fit in
//! `u32` because [`HnswConfig::validate`] bounds them.
//!
//! ```text
//! magic        8 bytes  "NDLHNSW\0"
//! version      u32
//! dim          u32
//! metric       u8       0 = l2, 1 = ip, 2 = cosine
//! m            u32
//! ef_constr    u32
//! ef_search    u32
//! seed         u64
//! level_draws  u64
//! max_elements u64
//! count        u64
//! entry_point  i64      -1 when empty
//! max_layer    u32
//! deleted      u64 n, then n x u32 label
//! count x node:
//!   label      u32
//!   level      u32
//!   vector     dim x f32
//!   (level + 1) x { u32 n, n x u32 neighbor id }
//! ```

use crate::config::HnswConfig;
use crate::graph::{HnswGraph, HnswNode};
use crate::index::HnswState;
use crate::insert::LevelGenerator;
use needle_core::codec::{ByteReader, ByteWriter};
use needle_core::{IndexError, IndexResult, InternalId, Label, MetricSpace, PointStore};
use std::collections::{HashMap, HashSet};

pub const MAGIC: &[u8; 8] = b"NDLHNSW\0";
pub const VERSION: u32 = 1;

/// Fixed-size part of the snapshot, through the deleted label count.
const HEADER_BYTES: usize = 8 + 4 + 5 + 3 * 4 + 4 * 8 + 8 + 4 + 8;

/// Levels above this cannot come from the level generator for any `M >= 2`.
const MAX_LEVEL: usize = 64;

fn corrupt(msg: impl Into<String>) -> IndexError {
    IndexError::CorruptData(msg.into())
}

pub(crate) fn encode(space: &MetricSpace, state: &HnswState) -> Vec<u8> {
    let store = &state.store;
    let graph = &state.graph;
    let dim = space.num_dimensions();

    let deleted = store.deleted_labels();
    let links: usize = graph
        .nodes()
        .iter()
        .flat_map(|node| &node.neighbors)
        .map(|list| 4 + list.len() * 4)
        .sum();
    let mut w = ByteWriter::with_capacity(
        HEADER_BYTES + deleted.len() * 4 + store.len() * (8 + dim * 4) + links,
    );
    w.put_bytes(MAGIC);
    w.put_u32(VERSION);
    w.put_space(space);
    w.put_u32(state.config.m as u32);
    w.put_u32(state.config.ef_construction as u32);
    w.put_u32(state.config.ef_search as u32);
    w.put_u64(state.config.seed);
    w.put_u64(state.levels.draws());
    w.put_u64(store.capacity() as u64);
    w.put_u64(store.len() as u64);
    w.put_i64(graph.entry_point().map_or(-1, i64::from));
    w.put_u32(graph.max_layer() as u32);

    w.put_u64(deleted.len() as u64);
    for label in deleted {
        w.put_u32(label);
    }

    for (id, node) in graph.nodes().iter().enumerate() {
        let id = id as InternalId;
        w.put_u32(store.label(id));
        w.put_u32(node.level as u32);
        w.put_f32s(store.vector(id));
        for list in &node.neighbors {
            w.put_u32(list.len() as u32);
            for &n in list {
                w.put_u32(n);
            }
        }
    }

    w.into_inner()
}

pub(crate) fn decode(space: &MetricSpace, bytes: &[u8]) -> IndexResult<HnswState> {
    let mut r = ByteReader::new(bytes);
    r.expect_magic(MAGIC)?;

    let version = r.u32("version")?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported format version {}", version)));
    }

    r.expect_space(space)?;
    let dim = space.num_dimensions();

    let config = HnswConfig {
        m: r.u32("M")? as usize,
        ef_construction: r.u32("ef_construction")? as usize,
        ef_search: r.u32("ef_search")? as usize,
        seed: r.u64("random seed")?,
    };
    config
        .validate()
        .map_err(|e| corrupt(format!("invalid parameters: {}", e)))?;
    let level_draws = r.u64("level draw count")?;

    let max_elements = r.len_u64("max elements")?;
    let count = r.len_u64("element count")?;
    if count > max_elements || count > u32::MAX as usize {
        return Err(corrupt(format!(
            "element count {} exceeds capacity {}",
            count, max_elements
        )));
    }
    // Every appended slot drew exactly one level.
    if level_draws != count as u64 {
        return Err(corrupt(format!(
            "level draw count {} does not match element count {}",
            level_draws, count
        )));
    }
    let entry_raw = r.i64("entry point")?;
    let max_layer = r.u32("max layer")? as usize;

    let deleted_count = r.len_u64("deleted count")?;
    if deleted_count > count || deleted_count > r.remaining() / 4 {
        return Err(corrupt("more deleted labels than elements"));
    }
    let mut deleted_labels = Vec::with_capacity(deleted_count);
    for _ in 0..deleted_count {
        deleted_labels.push(r.u32("deleted label")?);
    }

    // Never trust `count` for preallocation beyond what the buffer can hold.
    let min_node_bytes = 12 + dim * 4;
    let plausible = count.min(r.remaining() / min_node_bytes + 1);
    let mut labels: Vec<Label> = Vec::with_capacity(plausible);
    let mut data: Vec<f32> = Vec::with_capacity(plausible * dim);
    let mut nodes: Vec<HnswNode> = Vec::with_capacity(plausible);

    for id in 0..count {
        labels.push(r.u32("label")?);
        let level = r.u32("level")? as usize;
        if level > max_layer || level > MAX_LEVEL {
            return Err(corrupt(format!(
                "node {} has level {} above the top layer {}",
                id, level, max_layer
            )));
        }
        r.f32s_into(dim, &mut data, "vector")?;

        let mut node = HnswNode::new(level);
        for (layer, list) in node.neighbors.iter_mut().enumerate() {
            let n = r.u32("neighbor count")? as usize;
            if n > config.max_connections(layer) {
                return Err(corrupt(format!(
                    "node {} has {} neighbors on layer {}",
                    id, n, layer
                )));
            }
            if n > r.remaining() / 4 {
                return Err(corrupt(format!("node {} neighbor list is truncated", id)));
            }
            list.reserve(n);
            for _ in 0..n {
                let neighbor = r.u32("neighbor id")?;
                if neighbor as usize >= count || neighbor as usize == id {
                    return Err(corrupt(format!(
                        "node {} links to invalid id {}",
                        id, neighbor
                    )));
                }
                list.push(neighbor);
            }
        }
        nodes.push(node);
    }
    r.finish()?;

    // Neighbors on a layer must themselves reach that layer.
    for (id, node) in nodes.iter().enumerate() {
        for (layer, list) in node.neighbors.iter().enumerate() {
            if list.iter().any(|&n| nodes[n as usize].level < layer) {
                return Err(corrupt(format!(
                    "node {} links above a neighbor's level on layer {}",
                    id, layer
                )));
            }
        }
    }

    let entry_point = match entry_raw {
        -1 if count == 0 => None,
        e if e >= 0 && (e as usize) < count => {
            let e = e as usize;
            if nodes[e].level != max_layer {
                return Err(corrupt("entry point is not on the top layer"));
            }
            Some(e as InternalId)
        }
        e => return Err(corrupt(format!("invalid entry point {}", e))),
    };
    if entry_point.is_none() && max_layer != 0 {
        return Err(corrupt("empty index with a non-zero top layer"));
    }

    let mut deleted = vec![false; count];
    let positions: HashMap<Label, usize> =
        labels.iter().enumerate().map(|(i, &l)| (l, i)).collect();
    let mut seen = HashSet::with_capacity(deleted_labels.len());
    for label in deleted_labels {
        let id = *positions
            .get(&label)
            .ok_or_else(|| corrupt(format!("deleted label {} is not stored", label)))?;
        if !seen.insert(label) {
            return Err(corrupt(format!("deleted label {} listed twice", label)));
        }
        deleted[id] = true;
    }

    let store = PointStore::from_parts(dim, max_elements, labels, data, deleted)?;
    let graph = HnswGraph::from_parts(nodes, entry_point, max_layer);
    let levels = LevelGenerator::resume(config.seed, config.ml(), level_draws);

    Ok(HnswState {
        config,
        store,
        graph,
        levels,
    })
}
