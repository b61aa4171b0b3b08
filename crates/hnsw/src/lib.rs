//! Hierarchical Navigable Small World graph index.
//!
//! Reference: "Efficient and robust approximate nearest neighbor search using
//! Hierarchical Navigable Small World graphs" by Malkov & Yashunin, 2016
//!
//! # Features
//! - Multi-layer graph with exponentially decaying level distribution
//! - Diversity-aware neighbor selection with bounded degree per layer
//! - Soft delete, undelete and reuse of deleted slots
//! - Per-query label filters, infallible or fallible
//! - Capacity growth without rebuilding
//! - Versioned binary snapshots that resume the level sequence exactly
//!
//! # Example
//! ```
//! use needle_hnsw::HierarchicalNsw;
//!
//! let mut index = HierarchicalNsw::new("l2", 3)?;
//! index.init_index(100, 16, 200, 100)?;
//! index.add_point(&[1.0, 2.0, 3.0], 0, false)?;
//! index.add_point(&[2.0, 3.0, 4.0], 1, false)?;
//!
//! let result = index.search_knn(&[1.0, 2.0, 5.0], 1, None)?;
//! assert_eq!(result.neighbors, vec![1]);
//! # Ok::<(), needle_core::IndexError>(())
//! ```

pub mod config;
pub mod graph;
pub mod index;
pub mod insert;
pub mod search;
pub mod serialize;
pub mod visited;

pub use config::{HnswConfig, MAX_EF, MAX_M};
pub use graph::{GraphStats, HnswGraph, HnswNode};
pub use index::HierarchicalNsw;
pub use insert::LevelGenerator;
pub use search::Candidate;

pub use needle_core::{ErrorKind, IndexError, IndexResult, Label, MetricSpace, Persist, SearchResult};
