//! Norm-based filter removal.

use graph_storage::{Graph, ParamScope};
use tracing::{debug, warn};

use super::propagate::{validate_channels, ChannelTracker};
use super::{FilterPruner, PruneReport, PrunedParam, StructuredPlan};
use crate::error::{PruneError, Result};
use crate::ranking::{filter_norms, filter_prune_count, lowest_k, Criterion};

/// Removes the output filters with the smallest norm from each planned weight.
///
/// Per weight `[out, in, kh, kw]`, `min(out - 1, round(out * ratio))` filters
/// are removed (ties go to the lower filter index). The channel change is
/// carried to every downstream consumer of the convolution output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormFilterPruner {
    pub criterion: Criterion,
}

impl NormFilterPruner {
    pub fn new(criterion: Criterion) -> Self {
        Self { criterion }
    }
}

impl FilterPruner for NormFilterPruner {
    fn prune(&self, graph: &mut Graph, scope: &mut ParamScope, plan: &StructuredPlan) -> Result<PruneReport> {
        let mut report = PruneReport {
            params_before: scope.total_params(),
            ..Default::default()
        };
        let mut tracker = ChannelTracker::default();

        for (name, ratio) in plan.iter()? {
            let tensor = scope.require(name)?;
            if tensor.rank() != 4 {
                return Err(PruneError::NotAFilter {
                    name: name.to_string(),
                    shape: tensor.shape().to_vec(),
                });
            }
            if tracker.is_pruned(name, 0) {
                warn!(param = %name, "filters already removed by an earlier parameter, skipping");
                continue;
            }

            let filters = tensor.shape()[0];
            let count = filter_prune_count(filters, ratio);
            if count == 0 {
                debug!(param = %name, filters, ratio, "nothing to prune");
                continue;
            }

            let scores = filter_norms(tensor, self.criterion);
            let removed = lowest_k(&scores, count);
            debug!(param = %name, filters, removed = removed.len(), "removing filters");

            tracker.prune_filters(graph, scope, name, &removed)?;
            report.pruned.push(PrunedParam {
                name: name.to_string(),
                original_filters: filters,
                removed,
            });
        }

        validate_channels(graph)?;
        report.params_after = scope.total_params();
        Ok(report)
    }
}
