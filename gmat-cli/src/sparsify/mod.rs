//! Sparsify command - zero the smallest weights of pointwise convolutions.

use anyhow::{Context, Result};
use gmat_machete::{sparsify_model, SelectionRules};
use graph_storage::load_inference_model;
use std::path::Path;

use crate::common::{print_candidates, resolve_config, write_config};
use crate::config::prune_config::{PruneConfig, PRUNE_CONFIG_FILE};

/// List the tensors a sparsify run would touch and write a config template.
pub fn generate_config_template(model_path: &str, params_path: Option<&str>) -> Result<()> {
    let model = load_inference_model(Path::new(model_path), params_path.map(Path::new))
        .with_context(|| format!("Failed to load model: {}", model_path))?;

    let mut rules = SelectionRules::default();
    let candidates = rules.candidates(&model.graph, |var| rules.is_sparsifiable(var));

    println!("Found {} sparsifiable tensor(s)", candidates.len());
    print_candidates(&candidates);

    let only = candidates.iter().map(|var| var.name.clone()).collect();
    rules.only = only;
    let config = PruneConfig {
        rules,
        ..Default::default()
    };
    write_config(&config, Path::new("."))?;

    println!("\n=== Generated {} ===", PRUNE_CONFIG_FILE);
    println!("Ratio: {}", config.ratio);
    println!("Remove names from rules.only to leave them dense.");
    println!("\nEdit the config, then run:");
    println!("  gmat sparsify --model {} --config {}", model_path, PRUNE_CONFIG_FILE);

    Ok(())
}

/// Sparsify a saved model and write it under `output_path` (default `output`).
pub fn run(
    model_path: &str,
    params_path: Option<&str>,
    ratio: Option<f64>,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<()> {
    let config = resolve_config(config_path, ratio)?;
    let output_dir = Path::new(output_path.unwrap_or("output"));

    println!("Output: {}", output_dir.display());
    println!("Ratio: {}", config.ratio);

    let outcome = sparsify_model(
        Path::new(model_path),
        params_path.map(Path::new),
        config.ratio,
        output_dir,
        &config.rules,
    )
    .with_context(|| format!("Failed to sparsify model: {}", model_path))?;

    let total = outcome.report.tensors.len();
    for (i, tensor) in outcome.report.tensors.iter().enumerate() {
        println!(
            "[{}/{}] {} {:?} -> {}/{} zeros ({:.4})",
            i + 1,
            total,
            tensor.name,
            tensor.shape,
            tensor.zeros,
            tensor.numel,
            tensor.sparsity
        );
    }

    println!("\n=== Sparsification complete ===");
    println!("Tensors: {}", total);
    println!("Overall sparsity: {:.4}", outcome.report.overall_sparsity());
    println!("Saved: {}", outcome.model_path.display());

    Ok(())
}
