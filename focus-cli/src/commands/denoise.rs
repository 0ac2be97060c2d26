//! Implementation of the 'denoise' subcommand.
//!
//! Builds the run configuration from an optional JSON file, environment
//! defaults and command-line overrides, then runs the reconstruction.

use crate::cli::DenoiseArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::progress::{CliProgress, format_duration};

use focus_core::config::{CoreConfig, CoreConfigBuilder};
use focus_core::{ArtifactStore, ProgressCallback, RunSummary, run_denoise};

use log::info;

/// Resolves the configuration of a denoise run.
pub fn build_config(args: &DenoiseArgs) -> CliResult<CoreConfig> {
    let base = match &args.config {
        Some(path) => CoreConfig::load_from_file(path)
            .cli_with_context(|| format!("reading configuration {}", path.display()))?,
        None => CoreConfig::default(),
    };

    let mut builder = CoreConfigBuilder::from_config(base).input_name(args.name.clone());
    if let Some(dir) = &args.data_dir {
        builder = builder.data_dir(dir);
    }
    if let Some(dir) = &args.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(nside) = args.nside {
        builder = builder.nside(nside);
    }
    if args.statistic.cov {
        builder = builder.variant(args.statistic.variant());
    }
    if let Some(size) = args.statistic.kernel_size {
        builder = builder.kernel_size(size);
    }
    if args.statistic.p00 {
        builder = builder.zeroth_order_only(true);
    }
    if let Some(iterations) = args.iterations {
        builder = builder.outer_iterations(iterations);
    }
    if let Some(realizations) = args.realizations {
        builder = builder.noise_realizations(realizations);
    }
    if let Some(steps) = args.steps {
        builder = builder.production_epochs(steps);
    }
    if let Some(masks) = &args.masks {
        builder = builder.mask_files(masks.clone());
    }
    if let Some(template) = &args.template {
        builder = builder.template_file(template.clone());
    }
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    builder.build().cli_context("invalid denoise configuration")
}

fn report(config: &CoreConfig, summary: &RunSummary) {
    let store = ArtifactStore::new(&config.output_dir, summary.run_name.clone());
    info!("Run {} finished in {}", summary.run_name, format_duration(summary.duration));
    for iteration in &summary.iterations {
        let loss = iteration
            .final_loss
            .map_or_else(|| "-".to_string(), |l| format!("{l:.4e}"));
        info!(
            "  iteration {}: {} + {} epochs, final loss {loss}, {}",
            iteration.iteration,
            iteration.calibration_epochs,
            iteration.production_epochs,
            format_duration(iteration.duration)
        );
    }
    if let Some(last) = summary.iterations.last() {
        info!("Result: {}", store.result_path(last.iteration).display());
    }
}

/// Runs the 'denoise' subcommand.
pub fn run(args: DenoiseArgs, show_progress: bool) -> CliResult<RunSummary> {
    let config = build_config(&args)?;
    info!(
        "Denoising {} from {} into {}",
        config.input_name,
        config.data_dir.display(),
        config.output_dir.display()
    );

    let progress = if show_progress { CliProgress::new() } else { CliProgress::hidden() };
    let summary = run_denoise(&config, &progress as &dyn ProgressCallback)?;
    report(&config, &summary);
    Ok(summary)
}
