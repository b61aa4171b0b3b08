//! Distance metric definitions.

use crate::error::IndexError;
use serde::{Deserialize, Serialize};

/// Supported distance metrics. Lower distances are always more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance.
    L2,
    /// One minus the inner product.
    #[serde(rename = "ip")]
    InnerProduct,
    /// One minus the cosine similarity.
    Cosine,
}

impl Metric {
    /// Convert metric to byte representation for storage.
    pub fn to_byte(self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::InnerProduct => 1,
            Metric::Cosine => 2,
        }
    }

    /// Parse metric from byte representation.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Metric::L2),
            1 => Some(Metric::InnerProduct),
            2 => Some(Metric::Cosine),
            _ => None,
        }
    }

    /// The space name accepted by [`str::parse`].
    pub fn name(self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::InnerProduct => "ip",
            Metric::Cosine => "cosine",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(Metric::L2),
            "ip" => Ok(Metric::InnerProduct),
            "cosine" => Ok(Metric::Cosine),
            _ => Err(IndexError::InvalidArgument(format!(
                "invalid space should be expected l2, ip, or cosine, name: {}",
                s
            ))),
        }
    }
}
