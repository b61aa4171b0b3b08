//! Distance kernels.
//!
//! Inputs are processed in fixed-width lanes with independent accumulators,
//! which lets the compiler vectorize the loops without explicit SIMD. All
//! kernels assume equal-length inputs; the dimension is checked once at the
//! [`MetricSpace`](crate::MetricSpace) boundary.

use crate::metric::Metric;

const LANES: usize = 8;

/// Sum `term(a[i], b[i])` over all components using `LANES` accumulators.
#[inline(always)]
fn lane_sum(a: &[f32], b: &[f32], term: impl Fn(f32, f32) -> f32) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut acc = [0.0f32; LANES];
    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let tail: f32 = a_chunks
        .remainder()
        .iter()
        .zip(b_chunks.remainder())
        .map(|(&x, &y)| term(x, y))
        .sum();

    for (xa, xb) in a_chunks.zip(b_chunks) {
        for lane in 0..LANES {
            acc[lane] += term(xa[lane], xb[lane]);
        }
    }

    acc.iter().sum::<f32>() + tail
}

/// Squared Euclidean distance.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    lane_sum(a, b, |x, y| {
        let d = x - y;
        d * d
    })
}

#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    lane_sum(a, b, |x, y| x * y)
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// `1 - <a, b>`. Can be negative; not a true metric.
#[inline]
pub fn inner_product_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_product(a, b)
}

/// Cosine similarity in `[-1, 1]`, or `0` when either vector is all zeros.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norms = l2_norm(a) * l2_norm(b);
    if norms == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / norms
}

/// `1 - cosine_similarity`, in `[0, 2]`. Exactly `1` for a zero vector.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Distance between two vectors under `metric`.
#[inline]
pub fn distance(a: &[f32], b: &[f32], metric: Metric) -> f32 {
    match metric {
        Metric::L2 => l2_distance_squared(a, b),
        Metric::InnerProduct => inner_product_distance(a, b),
        Metric::Cosine => cosine_distance(a, b),
    }
}

/// Scale `v` to unit length in place. A zero vector is left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Unit-length copy of `v`.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize(&mut out);
    out
}
