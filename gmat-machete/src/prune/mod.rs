//! Structured (filter) pruning.
//!
//! Candidate selection and ratio assignment live here. Removing filters and
//! rewriting the graph is delegated to a [`FilterPruner`]; the built-in
//! [`NormFilterPruner`] removes the lowest-norm filters and propagates the
//! channel change to downstream consumers.

mod filter;
mod propagate;

pub use filter::NormFilterPruner;
pub use propagate::validate_channels;

use graph_storage::{Graph, ParamScope};
use tracing::{debug, info};

use crate::error::{check_ratio, PruneError, Result};
use crate::selection::SelectionRules;

/// Parameters to prune and the ratio for each.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredPlan {
    pub params: Vec<String>,
    pub ratios: Vec<f64>,
}

impl StructuredPlan {
    /// Same ratio for every parameter.
    pub fn uniform(params: Vec<String>, ratio: f64) -> Self {
        let ratios = vec![ratio; params.len()];
        Self { params, ratios }
    }

    /// Pairs of (parameter, ratio), checking the two lists line up.
    pub fn iter(&self) -> Result<impl Iterator<Item = (&str, f64)>> {
        if self.params.len() != self.ratios.len() {
            return Err(PruneError::RatioCountMismatch {
                params: self.params.len(),
                ratios: self.ratios.len(),
            });
        }
        Ok(self
            .params
            .iter()
            .map(String::as_str)
            .zip(self.ratios.iter().copied()))
    }
}

/// Filters removed from one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct PrunedParam {
    pub name: String,
    pub original_filters: usize,
    /// Removed filter indices, sorted.
    pub removed: Vec<usize>,
}

/// Outcome of a structured pruning pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    pub pruned: Vec<PrunedParam>,
    pub params_before: usize,
    pub params_after: usize,
}

impl PruneReport {
    pub fn removed_filters(&self) -> usize {
        self.pruned.iter().map(|p| p.removed.len()).sum()
    }
}

/// Engine that removes filters from the planned parameters and rewrites the graph.
pub trait FilterPruner {
    fn prune(&self, graph: &mut Graph, scope: &mut ParamScope, plan: &StructuredPlan) -> Result<PruneReport>;
}

/// Convolution weights eligible for filter pruning, minus the last one.
///
/// The last candidate in traversal order feeds the network output and keeps
/// its channel count. Fewer than two candidates is an error.
pub fn select_prune_params(graph: &Graph, rules: &SelectionRules) -> Result<Vec<String>> {
    let mut params: Vec<String> = rules
        .candidates(graph, |var| rules.is_conv_weight(var))
        .into_iter()
        .map(|var| var.name.clone())
        .collect();

    if params.len() < 2 {
        return Err(PruneError::NotEnoughCandidates { found: params.len() });
    }

    if let Some(last) = params.pop() {
        debug!(param = %last, "keeping last convolution unpruned");
    }
    Ok(params)
}

/// Select candidates and assign every one the same ratio.
pub fn plan_structured(graph: &Graph, ratio: f64, rules: &SelectionRules) -> Result<StructuredPlan> {
    check_ratio(ratio)?;
    let params = select_prune_params(graph, rules)?;
    Ok(StructuredPlan::uniform(params, ratio))
}

/// Plan and run structured pruning with the given engine.
pub fn structured_prune(
    graph: &mut Graph,
    scope: &mut ParamScope,
    ratio: f64,
    rules: &SelectionRules,
    pruner: &dyn FilterPruner,
) -> Result<PruneReport> {
    let plan = plan_structured(graph, ratio, rules)?;
    debug!(params = plan.params.len(), ratio, "planned structured pruning");

    let report = pruner.prune(graph, scope, &plan)?;

    info!(
        params = report.pruned.len(),
        filters = report.removed_filters(),
        before = report.params_before,
        after = report.params_after,
        "pruned convolution filters"
    );
    Ok(report)
}
