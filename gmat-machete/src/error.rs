//! Pruning error types.

use graph_storage::StorageError;
use thiserror::Error;

/// Errors raised by sparsification and structured pruning.
#[derive(Debug, Error)]
pub enum PruneError {
    #[error("Invalid ratio {0}: must be a finite value in [0, 1]")]
    InvalidRatio(f64),

    #[error("The model sparsity is abnormal: '{name}' has sparsity {actual:.4}, expected {expected:.4}")]
    SparsityMismatch {
        name: String,
        expected: f64,
        actual: f64,
    },

    #[error("Structured pruning needs at least 2 convolution candidates, found {found}")]
    NotEnoughCandidates { found: usize },

    #[error("Plan has {params} parameters but {ratios} ratios")]
    RatioCountMismatch { params: usize, ratios: usize },

    #[error("Parameter '{name}' must be rank 4 to prune filters, got shape {shape:?}")]
    NotAFilter { name: String, shape: Vec<usize> },

    #[error("Cannot propagate pruned channels of '{tensor}' through op '{op_type}'")]
    UnsupportedOp { op_type: String, tensor: String },

    #[error("'{name}' axis {axis} was already pruned with a different channel set")]
    ConflictingPrune { name: String, axis: usize },

    #[error("Op '{op_type}' has inputs with mismatched channel counts: {channels:?}")]
    ChannelMismatch { op_type: String, channels: Vec<usize> },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for pruning operations.
pub type Result<T> = std::result::Result<T, PruneError>;

/// Check that `ratio` lies in `[0, 1]`.
pub fn check_ratio(ratio: f64) -> Result<()> {
    if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(PruneError::InvalidRatio(ratio))
    }
}
