//! HNSW configuration.

use needle_core::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 10;
pub const DEFAULT_SEED: u64 = 100;

/// Largest `m`. Keeps the layer-0 bound `2 * m` within `u32`.
pub const MAX_M: usize = (u32::MAX / 2) as usize;
/// Largest `ef_construction` or `ef_search` a snapshot can record.
pub const MAX_EF: usize = u32::MAX as usize;

/// Construction and search parameters of a [`HierarchicalNsw`](crate::HierarchicalNsw).
///
/// `m`, `ef_construction` and `seed` are fixed when the index is initialized.
/// `ef_search` can be changed at any time afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Neighbors selected per node per layer. Layer 0 may hold up to `2 * m`.
    /// Typical range: 8-48, default: 16
    pub m: usize,

    /// Beam width while inserting.
    /// Higher values = better graph quality but slower construction.
    /// Typical range: 100-500, default: 200
    pub ef_construction: usize,

    /// Beam width at query time; raised to `k` when smaller.
    /// Default: 10
    pub ef_search: usize,

    /// Seed of the level generator.
    pub seed: u64,
}

impl HnswConfig {
    /// Defaults with the given `m`.
    pub fn new(m: usize) -> Self {
        Self {
            m,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            seed: DEFAULT_SEED,
        }
    }

    /// Set ef_construction.
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set ef_search.
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set the level generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> IndexResult<()> {
        if self.m < 2 {
            return Err(IndexError::InvalidArgument("M must be >= 2".into()));
        }
        if self.m > MAX_M {
            return Err(IndexError::InvalidArgument(format!(
                "M must be <= {}",
                MAX_M
            )));
        }
        if self.ef_construction == 0 || self.ef_construction > MAX_EF {
            return Err(IndexError::InvalidArgument(format!(
                "ef_construction must be in 1..={}",
                MAX_EF
            )));
        }
        Self::check_ef_search(self.ef_search)
    }

    /// Check a query beam width.
    pub fn check_ef_search(ef: usize) -> IndexResult<()> {
        if ef == 0 || ef > MAX_EF {
            return Err(IndexError::InvalidArgument(format!(
                "ef_search must be in 1..={}",
                MAX_EF
            )));
        }
        Ok(())
    }

    /// Level multiplier `1 / ln(M)`.
    pub fn ml(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }

    /// Neighbor-list bound for a layer.
    pub fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self::new(DEFAULT_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HnswConfig::default();
        assert_eq!(config.m, 16);
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.ef_search, 10);
        assert_eq!(config.seed, 100);
        assert_eq!(config.max_connections(0), 32);
        assert_eq!(config.max_connections(3), 16);
        assert!((config.ml() - 1.0 / 16f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_serde_fills_missing_fields() {
        let config = HnswConfig::new(24).with_ef_construction(300).with_seed(42);
        let json = serde_json::to_string(&config).unwrap();
        let restored: HnswConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);

        let partial: HnswConfig = serde_json::from_str(r#"{"m": 8}"#).unwrap();
        assert_eq!(partial.m, 8);
        assert_eq!(partial.ef_search, DEFAULT_EF_SEARCH);
    }

    #[test]
    fn test_validation() {
        assert!(HnswConfig::new(16).validate().is_ok());

        let bad = HnswConfig {
            m: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(HnswConfig::new(8).with_ef_search(0).validate().is_err());
        assert!(HnswConfig::new(8).with_ef_construction(0).validate().is_err());
    }

    #[test]
    fn test_upper_bounds() {
        let widest = HnswConfig::new(MAX_M)
            .with_ef_construction(MAX_EF)
            .with_ef_search(MAX_EF);
        assert!(widest.validate().is_ok());
        assert_eq!(widest.max_connections(0), (u32::MAX - 1) as usize);

        assert!(HnswConfig::new(MAX_M + 1).validate().is_err());
        assert!(HnswConfig::new(usize::MAX).validate().is_err());
        assert!(HnswConfig::new(8).with_ef_search(usize::MAX).validate().is_err());
        assert!(HnswConfig::new(8)
            .with_ef_construction(usize::MAX)
            .validate()
            .is_err());
    }
}
