//! Implementation of the 'simulate' subcommand.

use crate::cli::SimulateArgs;
use crate::error::CliResult;

use focus_core::{SimulatedDataset, SimulationConfig, simulate_dataset};

use log::info;

/// Runs the 'simulate' subcommand.
pub fn run(args: SimulateArgs) -> CliResult<SimulatedDataset> {
    let dataset = simulate_dataset(&SimulationConfig {
        output_dir: args.output_dir.clone(),
        name: args.name.clone(),
        nside: args.input_nside,
        realizations: args.realizations,
        noise_level: args.noise_level,
        seed: args.seed,
    })?;

    info!("Dataset {} written to {}", args.name, args.output_dir.display());
    info!(
        "Reconstruct it with: focus denoise {} --data-dir {} --output-dir <DIR> --nside <NSIDE> --realizations {} --masks {}",
        args.name,
        args.output_dir.display(),
        args.realizations,
        dataset.mask_files.join(",")
    );
    Ok(dataset)
}
