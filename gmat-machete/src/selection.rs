//! Candidate selection: which graph inputs a pruning pass may touch.

use graph_storage::{Graph, VarDesc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Boundary tensors that are never pruned unless the config says otherwise.
pub const DEFAULT_SKIP: &[&str] = &["image", "feed", "pool2d_0.tmp_0"];

/// Name filters and eligibility switches shared by both pruning modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRules {
    /// Exact names never touched (graph feed names are always added).
    pub skip: Vec<String>,
    /// Substring marking transient/intermediate tensors.
    pub transient_marker: String,
    /// Substring identifying convolution weights for structured pruning.
    pub conv_marker: String,
    /// Also sparsify rank-2 (fully connected) weights. Off by default.
    pub include_fc: bool,
    /// When non-empty, only these names are candidates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub only: Vec<String>,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            skip: DEFAULT_SKIP.iter().map(|s| s.to_string()).collect(),
            transient_marker: "tmp".to_string(),
            conv_marker: "conv".to_string(),
            include_fc: false,
            only: Vec::new(),
        }
    }
}

impl SelectionRules {
    /// Boundary or transient names are never candidates, nor names outside `only`.
    pub fn is_excluded(&self, graph: &Graph, name: &str) -> bool {
        (!self.only.is_empty() && !self.only.iter().any(|o| o == name))
            || self.skip.iter().any(|s| s == name)
            || graph.feed_names.iter().any(|f| f == name)
            || (!self.transient_marker.is_empty() && name.contains(self.transient_marker.as_str()))
    }

    /// Eligibility for element-wise sparsification (shape based).
    pub fn is_sparsifiable(&self, var: &VarDesc) -> bool {
        is_pointwise_conv(&var.shape) || (self.include_fc && is_fc_weight(&var.shape))
    }

    /// Eligibility for filter pruning (rank plus name tag).
    pub fn is_conv_weight(&self, var: &VarDesc) -> bool {
        var.rank() == 4 && var.name.contains(self.conv_marker.as_str())
    }

    /// Walk every op input in graph order and collect eligible parameters.
    ///
    /// Each name appears once, at its first use. Eligible but non-persistable
    /// variables are skipped since they have no stored weights.
    pub fn candidates<'g, F>(&self, graph: &'g Graph, eligible: F) -> Vec<&'g VarDesc>
    where
        F: Fn(&VarDesc) -> bool,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for input in graph.op_inputs() {
            if self.is_excluded(graph, input.name) {
                continue;
            }
            let Some(var) = input.var else { continue };
            if !eligible(var) {
                continue;
            }
            if !var.persistable {
                debug!(var = %var.name, "skipping eligible non-parameter input");
                continue;
            }
            if seen.insert(var.name.as_str()) {
                out.push(var);
            }
        }

        out
    }
}

/// Rank-4 kernel whose spatial dims are both 1.
pub fn is_pointwise_conv(shape: &[i64]) -> bool {
    shape.len() == 4 && shape[2] == 1 && shape[3] == 1
}

/// Rank-2 weight of a fully connected layer.
pub fn is_fc_weight(shape: &[i64]) -> bool {
    shape.len() == 2
}
