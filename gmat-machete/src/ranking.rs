//! Magnitude ranking helpers.
//!
//! Selection uses `select_nth_unstable_by` keyed on `(score, index)`, which
//! returns exactly the set a stable ascending argsort would put first.

use graph_storage::ParamTensor;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Filter importance criterion for structured pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Sum of absolute values.
    #[default]
    L1Norm,
    /// Euclidean norm.
    L2Norm,
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "l1" | "l1_norm" => Ok(Criterion::L1Norm),
            "l2" | "l2_norm" => Ok(Criterion::L2Norm),
            _ => Err(format!("Unknown criterion: {}. Valid criteria: l1_norm, l2_norm", s)),
        }
    }
}

/// Number of elements to zero: `min(len - 1, floor(ratio * len))`.
///
/// The clamp guarantees at least one element survives; an empty tensor yields 0.
pub fn zero_count(len: usize, ratio: f64) -> usize {
    if len == 0 {
        return 0;
    }
    ((ratio * len as f64).floor() as usize).min(len - 1)
}

/// Number of filters to remove: `min(filters - 1, round(ratio * filters))`.
pub fn filter_prune_count(filters: usize, ratio: f64) -> usize {
    if filters == 0 {
        return 0;
    }
    ((ratio * filters as f64).round() as usize).min(filters - 1)
}

/// Indices of the `k` smallest keys, ties broken by lower index. Sorted ascending.
pub fn lowest_k(keys: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(keys.len());
    if k == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..keys.len()).collect();
    let by_key = |a: &usize, b: &usize| keys[*a].total_cmp(&keys[*b]).then(a.cmp(b));
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, by_key);
        order.truncate(k);
    }
    order.sort_unstable();
    order
}

/// Flattened indices of the `k` smallest-magnitude values.
pub fn lowest_k_by_magnitude(values: &[f32], k: usize) -> Vec<usize> {
    let magnitudes: Vec<f32> = values.iter().map(|v| v.abs()).collect();
    lowest_k(&magnitudes, k)
}

/// Per-filter (axis 0) norm of a weight tensor.
pub fn filter_norms(tensor: &ParamTensor, criterion: Criterion) -> Vec<f32> {
    tensor
        .outer_slices()
        .map(|filter| match criterion {
            Criterion::L1Norm => filter.iter().map(|v| v.abs()).sum(),
            Criterion::L2Norm => filter.iter().map(|v| v * v).sum::<f32>().sqrt(),
        })
        .collect()
}
