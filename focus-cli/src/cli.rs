// ============================================================================
// focus-cli/src/cli.rs
// ============================================================================
//
// COMMAND-LINE ARGUMENTS: clap definitions for every subcommand
//
// KEY COMPONENTS:
// - Cli: global flags plus the selected subcommand
// - DenoiseArgs: full reconstruction run
// - SynthesizeArgs: single-map statistic synthesis
// - SimulateArgs: synthetic dataset generation

use clap::{Args, Parser, Subcommand};
use focus_core::config::DEFAULT_SEED;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "FOCUS: noise-debiased reconstruction of spherical maps",
    long_about = "Reconstructs clean sky maps from noisy half-split observations by matching \
                  noise-debiased multiscale statistics."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG takes precedence when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a timestamped file in this directory instead of the console
    #[arg(long, global = true, value_name = "LOG_DIR", env = "FOCUS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconstructs the clean signal behind a noisy dataset
    Denoise(DenoiseArgs),
    /// Synthesizes a map matching the statistics of an input map
    Synthesize(SynthesizeArgs),
    /// Writes a synthetic dataset in the layout read by `denoise`
    Simulate(SimulateArgs),
}

/// Statistic options shared by `denoise` and `synthesize`.
#[derive(Args, Debug, Clone)]
pub struct StatisticArgs {
    /// Use the covariance statistic instead of the scattering statistic
    #[arg(long)]
    pub cov: bool,

    /// Operator kernel size
    #[arg(long, value_name = "SIZE", value_parser = clap::value_parser!(u32).range(3..=5))]
    pub kernel_size: Option<u32>,

    /// Match only the zeroth-order channel
    #[arg(long)]
    pub p00: bool,
}

#[derive(Args, Debug)]
pub struct DenoiseArgs {
    /// Base name of the input data files
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Directory holding data maps, template, masks and noise realizations
    #[arg(long, value_name = "DIR", env = "FOCUS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Directory receiving cached inputs and per-iteration artifacts
    #[arg(long, value_name = "DIR", env = "FOCUS_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Working resolution
    #[arg(long, value_name = "NSIDE")]
    pub nside: Option<u32>,

    #[command(flatten)]
    pub statistic: StatisticArgs,

    /// Number of outer iterations
    #[arg(long, value_name = "COUNT")]
    pub iterations: Option<usize>,

    /// Number of noise realizations
    #[arg(long, value_name = "COUNT")]
    pub realizations: Option<usize>,

    /// Phase 2 epochs of the first outer iteration
    #[arg(long, value_name = "EPOCHS")]
    pub steps: Option<usize>,

    /// Mask files inside the data directory, comma separated
    #[arg(long, value_delimiter = ',', value_name = "FILES")]
    pub masks: Option<Vec<String>>,

    /// Template file inside the data directory
    #[arg(long, value_name = "FILE")]
    pub template: Option<String>,

    /// Number of workers sharing the loss terms
    #[arg(long, value_name = "N", env = "FOCUS_WORKERS")]
    pub workers: Option<usize>,

    /// JSON configuration file; command-line flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SynthesizeArgs {
    /// Input map (flat JSON array in nested order)
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Where to write the synthesized map
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Working resolution
    #[arg(long, value_name = "NSIDE", default_value_t = 16)]
    pub nside: u32,

    #[command(flatten)]
    pub statistic: StatisticArgs,

    /// Number of epochs
    #[arg(long, value_name = "EPOCHS", default_value_t = 300)]
    pub steps: usize,

    /// Seed of the start map
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Match the cross statistic with the input instead of the auto statistic
    #[arg(long)]
    pub xstat: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Directory receiving the dataset
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Base name of the generated files
    #[arg(long, value_name = "NAME", default_value = "SIMMAP")]
    pub name: String,

    /// Resolution of the generated maps
    #[arg(long, value_name = "NSIDE", default_value_t = 32)]
    pub input_nside: u32,

    /// Number of noise realizations per ensemble
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub realizations: usize,

    /// Spread of the full-data noise
    #[arg(long, value_name = "SIGMA", default_value_t = 0.3)]
    pub noise_level: f64,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_denoise_args() {
        let cli = Cli::parse_from([
            "focus",
            "denoise",
            "EE0256",
            "--data-dir",
            "/data",
            "--output-dir",
            "/out",
            "--nside",
            "32",
            "--cov",
            "--kernel-size",
            "5",
            "--masks",
            "MASK_A.json,MASK_B.json",
            "--workers",
            "3",
        ]);
        match cli.command {
            Commands::Denoise(args) => {
                assert_eq!(args.name, "EE0256");
                assert_eq!(args.data_dir, Some(PathBuf::from("/data")));
                assert_eq!(args.nside, Some(32));
                assert!(args.statistic.cov);
                assert_eq!(args.statistic.kernel_size, Some(5));
                assert_eq!(
                    args.masks,
                    Some(vec!["MASK_A.json".to_string(), "MASK_B.json".to_string()])
                );
                assert_eq!(args.workers, Some(3));
                assert!(args.config.is_none());
            }
            other => panic!("expected denoise, got {other:?}"),
        }
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_synthesize_defaults() {
        let cli = Cli::parse_from(["focus", "synthesize", "-i", "in.json", "-o", "out.json", "--xstat"]);
        match cli.command {
            Commands::Synthesize(args) => {
                assert_eq!(args.nside, 16);
                assert_eq!(args.steps, 300);
                assert!(args.xstat);
                assert!(!args.statistic.p00);
            }
            other => panic!("expected synthesize, got {other:?}"),
        }
    }

    #[test]
    fn test_kernel_size_is_bounded() {
        assert!(Cli::try_parse_from(["focus", "synthesize", "-i", "a", "-o", "b", "--kernel-size", "7"]).is_err());
    }
}
