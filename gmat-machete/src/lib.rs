//! gmat-machete - Magnitude-based pruning for inference graphs.
//!
//! Two passes over a [`Graph`](graph_storage::Graph) and its
//! [`ParamScope`](graph_storage::ParamScope):
//! - [`sparsity`]: zero the smallest-magnitude weights of 1x1 convolutions
//! - [`prune`]: remove whole convolution filters and rewrite consumers
//!
//! [`job`] wraps either pass with model loading and saving.
//!
//! # Example
//!
//! ```ignore
//! use gmat_machete::{sparsify_model, SelectionRules};
//!
//! let outcome = sparsify_model(
//!     Path::new("model/model.json"),
//!     Some(Path::new("model/params.safetensors")),
//!     0.5,
//!     Path::new("output"),
//!     &SelectionRules::default(),
//! )?;
//! println!("sparsity: {:.3}", outcome.report.overall_sparsity());
//! ```

pub mod error;
pub mod job;
pub mod prune;
pub mod ranking;
pub mod selection;
pub mod sparsity;


pub use error::{check_ratio, PruneError, Result};
pub use job::{prune_model, sparsify_model, JobOutcome};
pub use prune::{
    plan_structured, select_prune_params, structured_prune, validate_channels, FilterPruner, NormFilterPruner,
    PruneReport, PrunedParam, StructuredPlan,
};
pub use ranking::Criterion;
pub use selection::SelectionRules;
pub use sparsity::{
    apply_sparsity, plan_sparsity, sparsify, SparsityPlan, SparsityReport, TensorSparsity, SPARSITY_TOLERANCE,
};
