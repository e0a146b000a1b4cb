//! End-to-end jobs: load a saved model, prune it, save it under a new directory.
//!
//! The save step runs last, so a failed job writes nothing. The saved model
//! keeps the original feed/fetch names and file names.

use graph_storage::{load_inference_model, save_inference_model, InferenceModel};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{check_ratio, Result};
use crate::prune::{structured_prune, FilterPruner, PruneReport};
use crate::selection::SelectionRules;
use crate::sparsity::{sparsify, SparsityReport};

/// Report of a finished job plus where the model was written.
#[derive(Debug, Clone)]
pub struct JobOutcome<R> {
    pub report: R,
    pub model_path: PathBuf,
}

/// Sparsify every eligible pointwise convolution and save the model.
pub fn sparsify_model(
    model_file: &Path,
    param_file: Option<&Path>,
    ratio: f64,
    save_path: &Path,
    rules: &SelectionRules,
) -> Result<JobOutcome<SparsityReport>> {
    check_ratio(ratio)?;
    let mut model = load_inference_model(model_file, param_file)?;

    let report = sparsify(&model.graph, &mut model.scope, ratio, rules)?;
    let model_path = save(&model, save_path)?;

    info!(path = %model_path.display(), ratio, "sparse model saved");
    Ok(JobOutcome { report, model_path })
}

/// Remove convolution filters with `pruner` and save the model.
pub fn prune_model(
    model_file: &Path,
    param_file: Option<&Path>,
    ratio: f64,
    save_path: &Path,
    rules: &SelectionRules,
    pruner: &dyn FilterPruner,
) -> Result<JobOutcome<PruneReport>> {
    check_ratio(ratio)?;
    let mut model = load_inference_model(model_file, param_file)?;

    let report = structured_prune(&mut model.graph, &mut model.scope, ratio, rules, pruner)?;
    let model_path = save(&model, save_path)?;

    info!(path = %model_path.display(), ratio, "pruned model saved");
    Ok(JobOutcome { report, model_path })
}

fn save(model: &InferenceModel, save_path: &Path) -> Result<PathBuf> {
    Ok(save_inference_model(
        save_path,
        &model.graph,
        &model.scope,
        &model.graph.feed_names,
        &model.graph.fetch_names,
        &model.model_filename,
        model.params_filename.as_deref(),
    )?)
}
