//! Metric space: a metric bound to a fixed dimensionality.

use crate::distance::distance;
use crate::error::{IndexError, IndexResult};
use crate::metric::Metric;
use serde::{Deserialize, Serialize};

/// A [`Metric`] over vectors of exactly `dim` components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpace {
    metric: Metric,
    dim: usize,
}

impl MetricSpace {
    /// Create a space from its name (`"l2"`, `"ip"` or `"cosine"`).
    pub fn new(space_name: &str, dim: usize) -> IndexResult<Self> {
        Self::with_metric(space_name.parse()?, dim)
    }

    pub fn with_metric(metric: Metric, dim: usize) -> IndexResult<Self> {
        if dim == 0 {
            return Err(IndexError::InvalidArgument(
                "the number of dimensions must be greater than 0".into(),
            ));
        }
        Ok(Self { metric, dim })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn num_dimensions(&self) -> usize {
        self.dim
    }

    /// Fail with `DimensionMismatch` unless `v` has exactly `dim` components.
    #[inline]
    pub fn check_dimension(&self, v: &[f32]) -> IndexResult<()> {
        if v.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: v.len(),
            });
        }
        Ok(())
    }

    /// Checked distance between two caller-supplied vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> IndexResult<f64> {
        self.check_dimension(a)?;
        self.check_dimension(b)?;
        Ok(self.dist(a, b) as f64)
    }

    /// Unchecked distance for the search hot path.
    #[inline]
    pub fn dist(&self, a: &[f32], b: &[f32]) -> f32 {
        distance(a, b, self.metric)
    }
}
