//! Implementation of the 'synthesize' subcommand.
//!
//! Reads one map, degrades it to the working resolution and synthesizes a
//! new map with matching statistics. The loss history is written next to the
//! output as `<output>.log.json`.

use crate::cli::SynthesizeArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::progress::CliProgress;

use focus_core::artifacts::{read_map, write_map, write_values};
use focus_core::config::{DEFAULT_DECAY_RATE, DEFAULT_EPSILON, DEFAULT_EVAL_FREQUENCY, DEFAULT_KERNEL_SIZE, DEFAULT_LEARNING_RATE};
use focus_core::sphere::degrade;
use focus_core::{DemoConfig, Nside, OptimizerConfig, synthesize_matching};

use log::info;
use std::path::PathBuf;

pub fn demo_config(args: &SynthesizeArgs) -> DemoConfig {
    DemoConfig {
        variant: args.statistic.variant(),
        kernel_size: args.statistic.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE),
        cross: args.xstat,
        zeroth_order_only: args.statistic.p00,
        seed: args.seed,
        optimizer: OptimizerConfig {
            decay_rate: DEFAULT_DECAY_RATE,
            epoch_count: args.steps,
            learning_rate: DEFAULT_LEARNING_RATE,
            epsilon: DEFAULT_EPSILON,
            eval_frequency: DEFAULT_EVAL_FREQUENCY,
        },
    }
}

fn history_path(output: &std::path::Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".log.json");
    PathBuf::from(name)
}

/// Runs the 'synthesize' subcommand.
pub fn run(args: SynthesizeArgs, show_progress: bool) -> CliResult<()> {
    let nside = Nside::working(args.nside)?;
    let input = read_map(&args.input).cli_with_context(|| format!("reading input map {}", args.input.display()))?;
    let target = degrade(&input, nside).cli_context("degrading the input map")?;
    info!(
        "Synthesizing from {} at nside {nside} ({} statistic, {} epochs)",
        args.input.display(),
        args.statistic.variant(),
        args.steps
    );

    let progress = if show_progress { CliProgress::new() } else { CliProgress::hidden() };
    let outcome = synthesize_matching(&target, &demo_config(&args), &progress)?;

    write_map(&args.output, &outcome.map)?;
    write_values(&history_path(&args.output), &outcome.history)?;
    if let (Some(first), Some(last)) = (outcome.history.first(), outcome.history.last()) {
        info!("Loss {first:.4e} -> {last:.4e}");
    }
    info!("Synthesized map written to {}", args.output.display());
    Ok(())
}
