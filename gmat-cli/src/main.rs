//! GMAT CLI - Sparsify and prune saved inference models.

use clap::{Parser, Subcommand};
use gmat_machete::Criterion;

mod common;
mod config;
mod prune;
mod sparsify;

#[derive(Parser)]
#[command(name = "gmat")]
#[command(about = "CLI tool for magnitude-based pruning of inference models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Zero the smallest-magnitude weights of 1x1 convolutions
    Sparsify {
        /// Path to the model file
        #[arg(short, long)]
        model: String,

        /// Combined parameter file (omit for one file per parameter)
        #[arg(short, long)]
        params: Option<String>,

        /// Fraction of weights to zero, overrides the config
        #[arg(short, long)]
        ratio: Option<f64>,

        /// Path to prune config JSON (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory for the sparse model
        #[arg(short, long)]
        output: Option<String>,

        /// Generate a template config instead of sparsifying
        #[arg(long)]
        generate_config: bool,
    },

    /// Remove the lowest-norm convolution filters
    Prune {
        /// Path to the model file
        #[arg(short, long)]
        model: String,

        /// Combined parameter file (omit for one file per parameter)
        #[arg(short, long)]
        params: Option<String>,

        /// Fraction of filters to remove, overrides the config
        #[arg(short, long)]
        ratio: Option<f64>,

        /// Filter ranking: l1_norm or l2_norm, overrides the config
        #[arg(long)]
        criterion: Option<Criterion>,

        /// Path to prune config JSON (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory for the pruned model
        #[arg(short, long)]
        output: Option<String>,

        /// Generate a template config instead of pruning
        #[arg(long)]
        generate_config: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    common::init_logging();

    match cli.command {
        Commands::Sparsify {
            model,
            params,
            ratio,
            config,
            output,
            generate_config,
        } => {
            if generate_config {
                sparsify::generate_config_template(&model, params.as_deref())?;
            } else {
                sparsify::run(&model, params.as_deref(), ratio, config.as_deref(), output.as_deref())?;
            }
        }
        Commands::Prune {
            model,
            params,
            ratio,
            criterion,
            config,
            output,
            generate_config,
        } => {
            if generate_config {
                prune::generate_config_template(&model, params.as_deref())?;
            } else {
                prune::run(
                    &model,
                    params.as_deref(),
                    ratio,
                    criterion,
                    config.as_deref(),
                    output.as_deref(),
                )?;
            }
        }
    }

    Ok(())
}
