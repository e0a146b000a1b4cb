//! Pruning configuration shared by `sparsify` and `prune`.

use gmat_machete::{Criterion, SelectionRules};
use serde::{Deserialize, Serialize};

/// File name written by `--generate-config`.
pub const PRUNE_CONFIG_FILE: &str = "prune_config.json";

/// Configuration for a sparsify or prune run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Fraction of weights (sparsify) or filters (prune) to remove, in [0, 1]
    pub ratio: f64,

    /// Which tensors are candidates
    pub rules: SelectionRules,

    /// Filter ranking for structured pruning; ignored by sparsify
    pub criterion: Criterion,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            ratio: 0.5,
            rules: SelectionRules::default(),
            criterion: Criterion::default(),
        }
    }
}
