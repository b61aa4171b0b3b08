//! Integration tests for the HNSW index.

use needle_core::{distance::distance, ErrorKind, IndexError, Label, Metric, Persist};
use needle_hnsw::{HierarchicalNsw, HnswConfig};
use rand::prelude::*;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn build(space: &str, vectors: &[Vec<f32>], config: HnswConfig) -> HierarchicalNsw {
    let mut index = HierarchicalNsw::new(space, vectors[0].len()).unwrap();
    index.init_with_config(vectors.len(), config).unwrap();
    let labels: Vec<Label> = (0..vectors.len() as Label).collect();
    index.add_points(vectors, &labels, false).unwrap();
    index
}

fn exact_top_k(vectors: &[Vec<f32>], query: &[f32], k: usize, metric: Metric) -> Vec<Label> {
    let mut scored: Vec<(Label, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i as Label, distance(query, v, metric)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.into_iter().take(k).map(|(l, _)| l).collect()
}

fn assert_graph_invariants(index: &HierarchicalNsw) {
    let config = index.config().unwrap().clone();
    let graph = index.graph().unwrap();
    for (id, node) in graph.nodes().iter().enumerate() {
        for (layer, list) in node.neighbors.iter().enumerate() {
            assert!(
                list.len() <= config.max_connections(layer),
                "node {} has {} neighbors on layer {}",
                id,
                list.len(),
                layer
            );
            for &n in list {
                assert_ne!(n as usize, id, "self loop on node {}", id);
                assert!(graph.level(n) >= layer);
            }
        }
    }
    if let Some(entry) = graph.entry_point() {
        assert_eq!(graph.level(entry), graph.max_layer());
        assert!(graph.nodes().iter().all(|n| n.level <= graph.max_layer()));
    }
}

#[test]
fn test_recall_l2() {
    let vectors = random_vectors(1000, 16, 42);
    let mut index = build("l2", &vectors, HnswConfig::new(16).with_ef_construction(200));
    index.set_ef_search(64).unwrap();
    assert_graph_invariants(&index);

    let k = 10;
    let queries = random_vectors(50, 16, 7);
    let mut total_recall = 0.0;
    for query in &queries {
        let exact = exact_top_k(&vectors, query, k, Metric::L2);
        let result = index.search_knn(query, k, None).unwrap();
        assert_eq!(result.len(), k);
        assert!(result.distances.windows(2).all(|w| w[0] <= w[1]));
        let hits = result.neighbors.iter().filter(|l| exact.contains(l)).count();
        total_recall += hits as f64 / k as f64;
    }
    let avg_recall = total_recall / queries.len() as f64;
    assert!(avg_recall > 0.9, "HNSW recall too low: {:.2}", avg_recall);
}

#[test]
fn test_recall_cosine_and_ip() {
    for (space, metric) in [("cosine", Metric::Cosine), ("ip", Metric::InnerProduct)] {
        let vectors = random_vectors(500, 8, 3);
        let mut index = build(space, &vectors, HnswConfig::new(12).with_ef_construction(100));
        index.set_ef_search(250).unwrap();

        let mut hits = 0;
        let queries = random_vectors(20, 8, 99);
        for query in &queries {
            let exact = exact_top_k(&vectors, query, 5, metric);
            let result = index.search_knn(query, 5, None).unwrap();
            hits += result.neighbors.iter().filter(|l| exact.contains(l)).count();
        }
        let recall = hits as f64 / (queries.len() * 5) as f64;
        assert!(recall > 0.85, "{} recall too low: {:.2}", space, recall);
    }
}

#[test]
fn test_self_query_finds_itself() {
    let vectors = random_vectors(300, 12, 11);
    let index = build("l2", &vectors, HnswConfig::new(8).with_ef_construction(100).with_ef_search(50));
    for (label, v) in vectors.iter().enumerate().step_by(17) {
        let result = index.search_knn(v, 1, None).unwrap();
        assert_eq!(result.neighbors, vec![label as Label]);
        assert!(result.distances[0] < 1e-6);
    }
}

#[test]
fn test_same_seed_builds_same_graph() {
    let vectors = random_vectors(200, 8, 5);
    let a = build("l2", &vectors, HnswConfig::new(8).with_seed(1234));
    let b = build("l2", &vectors, HnswConfig::new(8).with_seed(1234));
    assert_eq!(a.graph(), b.graph());
    assert_eq!(
        a.write_index_to_buffer().unwrap(),
        b.write_index_to_buffer().unwrap()
    );
}

#[test]
fn test_soft_delete_never_returned() {
    let vectors = random_vectors(400, 8, 21);
    let mut index = build("l2", &vectors, HnswConfig::new(8).with_ef_search(40));

    let deleted: Vec<Label> = (0..400).filter(|l| l % 3 == 0).collect();
    index.mark_delete_items(&deleted).unwrap();
    assert_eq!(index.get_deleted_labels(), deleted);
    assert_eq!(index.get_current_count().unwrap(), 400);

    for query in random_vectors(30, 8, 77).iter().chain(vectors.iter().take(10)) {
        let result = index.search_knn(query, 10, None).unwrap();
        assert_eq!(result.len(), 10);
        assert!(result.neighbors.iter().all(|l| l % 3 != 0));
    }
    assert_eq!(
        index.get_point(0).unwrap_err(),
        IndexError::LabelNotFound(0)
    );

    index.unmark_delete(0).unwrap();
    let result = index.search_knn(&vectors[0], 1, None).unwrap();
    assert_eq!(result.neighbors, vec![0]);
    index.mark_delete(1).unwrap();
    assert_eq!(index.mark_delete(1).unwrap_err(), IndexError::LabelNotFound(1));
}

#[test]
fn test_all_deleted_returns_empty() {
    let vectors = random_vectors(20, 4, 8);
    let mut index = build("l2", &vectors, HnswConfig::new(4));
    let labels: Vec<Label> = (0..20).collect();
    index.mark_delete_items(&labels).unwrap();
    assert!(index.search_knn(&vectors[3], 5, None).unwrap().is_empty());
    assert!(index.get_used_labels().is_empty());
}

#[test]
fn test_filter_excludes_and_returns_fewer() {
    let vectors = random_vectors(200, 6, 13);
    let mut index = build("l2", &vectors, HnswConfig::new(8));
    index.set_ef_search(200).unwrap();

    let allowed = |label: Label| label < 5;
    let result = index.search_knn(&vectors[100], 10, Some(&allowed)).unwrap();
    let mut got = result.neighbors.clone();
    got.sort_unstable();
    assert_eq!(got, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_replace_deleted_reuses_slots() {
    let vectors = random_vectors(100, 8, 31);
    let mut index = build("l2", &vectors, HnswConfig::new(8).with_ef_search(50));

    // Full index: plain insert fails, replace-deleted needs a deleted slot.
    let fresh = random_vectors(10, 8, 32);
    assert_eq!(
        index.add_point(&fresh[0], 500, false).unwrap_err().kind(),
        ErrorKind::CapacityExceeded
    );
    assert_eq!(
        index.add_point(&fresh[0], 500, true).unwrap_err().kind(),
        ErrorKind::CapacityExceeded
    );

    let victims: Vec<Label> = (10..20).collect();
    index.mark_delete_items(&victims).unwrap();
    for (i, v) in fresh.iter().enumerate() {
        index.add_point(v, 500 + i as Label, true).unwrap();
    }

    assert_eq!(index.get_current_count().unwrap(), 100);
    assert!(index.get_deleted_labels().is_empty());
    let used = index.get_used_labels();
    assert_eq!(used.len(), 100);
    assert!(victims.iter().all(|l| !used.contains(l)));
    assert_graph_invariants(&index);

    for (i, v) in fresh.iter().enumerate() {
        let result = index.search_knn(v, 1, None).unwrap();
        assert_eq!(result.neighbors, vec![500 + i as Label]);
        assert_eq!(index.get_point(500 + i as Label).unwrap(), v.as_slice());
    }
    // The survivors are still reachable.
    for label in [0usize, 25, 50, 99] {
        let result = index.search_knn(&vectors[label], 1, None).unwrap();
        assert_eq!(result.neighbors, vec![label as Label]);
    }
}

#[test]
fn test_replace_deleted_own_label() {
    let vectors = random_vectors(30, 4, 2);
    let mut index = build("l2", &vectors, HnswConfig::new(4));
    index.mark_delete(7).unwrap();

    let replacement = vec![5.0, 5.0, 5.0, 5.0];
    assert_eq!(
        index.add_point(&replacement, 7, false).unwrap_err(),
        IndexError::DuplicateLabel(7)
    );
    index.add_point(&replacement, 7, true).unwrap();
    assert_eq!(index.get_point(7).unwrap(), replacement.as_slice());
    let result = index.search_knn(&replacement, 1, None).unwrap();
    assert_eq!(result.neighbors, vec![7]);
}

#[test]
fn test_add_items_label_generation() {
    let mut index = HierarchicalNsw::new("l2", 2).unwrap();
    index.init_index(10, 16, 200, 100).unwrap();

    let labels = index
        .add_items(&[[0.0f32, 0.0], [1.0, 0.0], [2.0, 0.0]], false)
        .unwrap();
    assert_eq!(labels, vec![0, 1, 2]);

    index.mark_delete(1).unwrap();
    let labels = index.add_items(&[[3.0f32, 0.0]], false).unwrap();
    assert_eq!(labels, vec![3]);

    let labels = index
        .add_items(&[[4.0f32, 0.0], [5.0, 0.0]], true)
        .unwrap();
    assert_eq!(labels, vec![1, 4]);
    assert_eq!(index.get_point(1).unwrap(), &[4.0, 0.0]);
    assert_eq!(index.get_used_labels(), vec![0, 1, 2, 3, 4]);
    assert_eq!(index.get_current_count().unwrap(), 5);
}

#[test]
fn test_resize_keeps_results() {
    let vectors = random_vectors(50, 8, 17);
    let mut index = build("l2", &vectors, HnswConfig::new(8));
    let before = index.search_knn(&vectors[3], 5, None).unwrap();
    let graph_before = index.graph().unwrap().clone();

    index.resize_index(80).unwrap();
    assert_eq!(index.graph().unwrap(), &graph_before);
    assert_eq!(index.search_knn(&vectors[3], 5, None).unwrap(), before);

    for (i, v) in random_vectors(30, 8, 18).iter().enumerate() {
        index.add_point(v, 50 + i as Label, false).unwrap();
    }
    assert_eq!(index.get_current_count().unwrap(), 80);
    assert_graph_invariants(&index);
}

#[test]
fn test_round_trip_preserves_queries() {
    let vectors = random_vectors(300, 10, 55);
    let mut original = build("cosine", &vectors, HnswConfig::new(8).with_seed(9));
    original.resize_index(400).unwrap();
    original.mark_delete_items(&[3, 30, 300 - 1]).unwrap();
    original.set_ef_search(33).unwrap();

    let bytes = original.write_index_to_buffer().unwrap();
    let mut restored = HierarchicalNsw::new("cosine", 10).unwrap();
    restored.read_index_from_buffer(&bytes).unwrap();

    assert_eq!(restored.get_max_elements().unwrap(), 400);
    assert_eq!(restored.get_current_count().unwrap(), 300);
    assert_eq!(restored.get_ef_search().unwrap(), 33);
    assert_eq!(restored.get_used_labels(), original.get_used_labels());
    assert_eq!(restored.get_deleted_labels(), original.get_deleted_labels());
    assert_eq!(restored.write_index_to_buffer().unwrap(), bytes);

    for query in random_vectors(20, 10, 56) {
        assert_eq!(
            original.search_knn(&query, 10, None).unwrap(),
            restored.search_knn(&query, 10, None).unwrap()
        );
    }

    // Both continue with the same level sequence.
    for (i, v) in random_vectors(50, 10, 57).iter().enumerate() {
        original.add_point(v, 1000 + i as Label, false).unwrap();
        restored.add_point(v, 1000 + i as Label, false).unwrap();
    }
    assert_eq!(original.graph(), restored.graph());
}

#[test]
fn test_round_trip_empty_index() {
    let mut index = HierarchicalNsw::new("ip", 4).unwrap();
    index.init_index(8, 16, 200, 100).unwrap();
    let bytes = index.write_index_to_buffer().unwrap();

    let mut restored = HierarchicalNsw::new("ip", 4).unwrap();
    restored.read_index_from_buffer(&bytes).unwrap();
    assert!(restored.is_index_initialized());
    assert_eq!(restored.get_current_count().unwrap(), 0);
    assert!(restored.search_knn(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap().is_empty());
}

#[test]
fn test_corrupt_buffers_rejected() {
    let vectors = random_vectors(40, 4, 61);
    let index = build("l2", &vectors, HnswConfig::new(4));
    let bytes = index.write_index_to_buffer().unwrap();

    let mut target = HierarchicalNsw::new("l2", 4).unwrap();
    for len in [0, 4, 8, 20, 60, bytes.len() / 2, bytes.len() - 1] {
        let err = target.read_index_from_buffer(&bytes[..len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData, "prefix of {} bytes", len);
    }
    assert!(!target.is_index_initialized());

    let mut bad_magic = bytes.clone();
    bad_magic[0] ^= 0xFF;
    assert_eq!(
        target.read_index_from_buffer(&bad_magic).unwrap_err().kind(),
        ErrorKind::CorruptData
    );

    let mut bad_version = bytes.clone();
    bad_version[8] = 99;
    assert_eq!(
        target.read_index_from_buffer(&bad_version).unwrap_err().kind(),
        ErrorKind::CorruptData
    );

    let mut bad_space = bytes.clone();
    bad_space[16] = 7;
    assert_eq!(
        target.read_index_from_buffer(&bad_space).unwrap_err().kind(),
        ErrorKind::CorruptData
    );

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert_eq!(
        target.read_index_from_buffer(&trailing).unwrap_err().kind(),
        ErrorKind::CorruptData
    );

    let mut wrong_dim = HierarchicalNsw::new("l2", 5).unwrap();
    assert_eq!(
        wrong_dim.read_index_from_buffer(&bytes).unwrap_err().kind(),
        ErrorKind::CorruptData
    );
    let mut wrong_metric = HierarchicalNsw::new("ip", 4).unwrap();
    assert_eq!(
        wrong_metric.read_index_from_buffer(&bytes).unwrap_err().kind(),
        ErrorKind::CorruptData
    );
}

#[test]
fn test_failed_read_keeps_previous_state() {
    let vectors = random_vectors(20, 4, 71);
    let mut index = build("l2", &vectors, HnswConfig::new(4));
    let before = index.get_used_labels();

    assert!(index.read_index_from_buffer(b"garbage").is_err());
    assert_eq!(index.get_used_labels(), before);
    assert_eq!(index.search_knn(&vectors[0], 1, None).unwrap().neighbors, vec![0]);
}

#[test]
fn test_reinit_discards_contents() {
    let vectors = random_vectors(10, 4, 81);
    let mut index = build("l2", &vectors, HnswConfig::new(4));
    index.init_index(5, 16, 200, 100).unwrap();
    assert_eq!(index.get_current_count().unwrap(), 0);
    assert_eq!(index.get_max_elements().unwrap(), 5);
    assert!(index.get_used_labels().is_empty());
    index.add_point(&vectors[0], 0, false).unwrap();
}
