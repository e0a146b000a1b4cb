//! Prune command - remove whole convolution filters.

use anyhow::{Context, Result};
use gmat_machete::{prune_model, Criterion, NormFilterPruner, SelectionRules};
use graph_storage::load_inference_model;
use std::path::Path;

use crate::common::{print_candidates, resolve_config, write_config};
use crate::config::prune_config::{PruneConfig, PRUNE_CONFIG_FILE};

/// List the convolution weights a prune run would touch and write a config template.
pub fn generate_config_template(model_path: &str, params_path: Option<&str>) -> Result<()> {
    let model = load_inference_model(Path::new(model_path), params_path.map(Path::new))
        .with_context(|| format!("Failed to load model: {}", model_path))?;

    let mut rules = SelectionRules::default();
    let candidates = rules.candidates(&model.graph, |var| rules.is_conv_weight(var));

    println!("Found {} convolution(s), the last listed one is kept", candidates.len());
    print_candidates(&candidates);

    let only = candidates.iter().map(|var| var.name.clone()).collect();
    rules.only = only;
    let config = PruneConfig {
        rules,
        ..Default::default()
    };
    write_config(&config, Path::new("."))?;

    println!("\n=== Generated {} ===", PRUNE_CONFIG_FILE);
    println!("Ratio: {}, criterion: {:?}", config.ratio, config.criterion);
    println!("\nEdit the config, then run:");
    println!("  gmat prune --model {} --config {}", model_path, PRUNE_CONFIG_FILE);

    Ok(())
}

/// Prune a saved model and write it under `output_path` (default `output`).
pub fn run(
    model_path: &str,
    params_path: Option<&str>,
    ratio: Option<f64>,
    criterion: Option<Criterion>,
    config_path: Option<&str>,
    output_path: Option<&str>,
) -> Result<()> {
    let mut config = resolve_config(config_path, ratio)?;
    if let Some(criterion) = criterion {
        config.criterion = criterion;
    }
    let output_dir = Path::new(output_path.unwrap_or("output"));

    println!("Output: {}", output_dir.display());
    println!("Ratio: {}, criterion: {:?}", config.ratio, config.criterion);

    let pruner = NormFilterPruner::new(config.criterion);
    let outcome = prune_model(
        Path::new(model_path),
        params_path.map(Path::new),
        config.ratio,
        output_dir,
        &config.rules,
        &pruner,
    )
    .with_context(|| format!("Failed to prune model: {}", model_path))?;

    let report = &outcome.report;
    let total = report.pruned.len();
    for (i, param) in report.pruned.iter().enumerate() {
        println!(
            "[{}/{}] {} -> removed {}/{} filters",
            i + 1,
            total,
            param.name,
            param.removed.len(),
            param.original_filters
        );
    }

    println!("\n=== Pruning complete ===");
    println!("Filters removed: {}", report.removed_filters());
    println!("Parameters: {} -> {}", report.params_before, report.params_after);
    println!("Saved: {}", outcome.model_path.display());

    Ok(())
}
