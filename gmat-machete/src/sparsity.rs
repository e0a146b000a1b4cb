//! Unstructured (element-wise) sparsification of pointwise convolution weights.
//!
//! Two phases over a caller-owned scope:
//! 1. [`plan_sparsity`] ranks each eligible tensor and records the flattened
//!    positions to zero (read-only, ranked in parallel).
//! 2. [`apply_sparsity`] checks the resulting sparsity of every tensor against
//!    the requested ratio, then zeroes the positions. Nothing is written unless
//!    every tensor passes.
//!
//! Running the pass twice is not guaranteed to be idempotent: the second
//! ranking sees the zeros written by the first.

use graph_storage::{Graph, ParamScope};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{check_ratio, PruneError, Result};
use crate::ranking::{lowest_k_by_magnitude, zero_count};
use crate::selection::SelectionRules;

/// Maximum allowed absolute difference between achieved and requested sparsity.
pub const SPARSITY_TOLERANCE: f64 = 0.01;

/// Positions to zero in one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub name: String,
    /// Sorted flattened indices.
    pub indices: Vec<usize>,
}

/// Per-tensor zero sets, in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsityPlan {
    pub ratio: f64,
    pub entries: Vec<PlanEntry>,
}

impl SparsityPlan {
    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.indices.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome for one sparsified tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSparsity {
    pub name: String,
    pub shape: Vec<usize>,
    pub numel: usize,
    pub zeros: usize,
    pub sparsity: f64,
}

/// Outcome of a sparsification pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparsityReport {
    pub tensors: Vec<TensorSparsity>,
}

impl SparsityReport {
    /// Zero fraction across all sparsified tensors.
    pub fn overall_sparsity(&self) -> f64 {
        let numel: usize = self.tensors.iter().map(|t| t.numel).sum();
        if numel == 0 {
            return 0.0;
        }
        self.tensors.iter().map(|t| t.zeros).sum::<usize>() as f64 / numel as f64
    }
}

/// Rank every eligible tensor and record its zero set.
pub fn plan_sparsity(
    graph: &Graph,
    scope: &ParamScope,
    ratio: f64,
    rules: &SelectionRules,
) -> Result<SparsityPlan> {
    check_ratio(ratio)?;

    let candidates = rules.candidates(graph, |var| rules.is_sparsifiable(var));
    let tensors = candidates
        .iter()
        .map(|var| {
            scope
                .require(&var.name)
                .map(|tensor| (var.name.as_str(), tensor))
                .map_err(PruneError::from)
        })
        .collect::<Result<Vec<_>>>()?;

    let entries: Vec<PlanEntry> = tensors
        .par_iter()
        .filter(|(name, tensor)| {
            if tensor.is_empty() {
                debug!(param = %name, "skipping empty tensor");
            }
            !tensor.is_empty()
        })
        .map(|(name, tensor)| {
            let k = zero_count(tensor.numel(), ratio);
            PlanEntry {
                name: name.to_string(),
                indices: lowest_k_by_magnitude(tensor.values(), k),
            }
        })
        .collect();

    debug!(tensors = entries.len(), ratio, "planned sparsification");
    Ok(SparsityPlan { ratio, entries })
}

/// Zero the planned positions after checking every tensor's resulting sparsity.
///
/// A tensor whose sparsity would differ from the plan ratio by
/// [`SPARSITY_TOLERANCE`] or more fails the whole pass with
/// [`PruneError::SparsityMismatch`] and leaves the scope untouched.
pub fn apply_sparsity(scope: &mut ParamScope, plan: &SparsityPlan) -> Result<SparsityReport> {
    let mut report = SparsityReport::default();

    for entry in &plan.entries {
        let tensor = scope.require(&entry.name)?;
        let values = tensor.values();
        let newly_zeroed = entry.indices.iter().filter(|&&i| values[i] != 0.0).count();
        let zeros = tensor.numel() - tensor.nnz() + newly_zeroed;
        let sparsity = zeros as f64 / tensor.numel() as f64;

        if (sparsity - plan.ratio).abs() >= SPARSITY_TOLERANCE {
            return Err(PruneError::SparsityMismatch {
                name: entry.name.clone(),
                expected: plan.ratio,
                actual: sparsity,
            });
        }

        report.tensors.push(TensorSparsity {
            name: entry.name.clone(),
            shape: tensor.shape().to_vec(),
            numel: tensor.numel(),
            zeros,
            sparsity,
        });
    }

    for entry in &plan.entries {
        let values = scope.require_mut(&entry.name)?.values_mut();
        for &i in &entry.indices {
            values[i] = 0.0;
        }
    }

    Ok(report)
}

/// Plan and apply element-wise sparsification in one call.
pub fn sparsify(
    graph: &Graph,
    scope: &mut ParamScope,
    ratio: f64,
    rules: &SelectionRules,
) -> Result<SparsityReport> {
    let plan = plan_sparsity(graph, scope, ratio, rules)?;
    let report = apply_sparsity(scope, &plan)?;

    info!(
        tensors = report.tensors.len(),
        sparsity = report.overall_sparsity(),
        "sparsified pointwise convolutions"
    );
    Ok(report)
}
