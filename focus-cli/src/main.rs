// ============================================================================
// focus-cli/src/main.rs
// ============================================================================
//
// MAIN ENTRY POINT: FOCUS command-line application
//
// Parses arguments, sets up console or file logging, dispatches the selected
// subcommand and maps failures to a non-zero exit code.

use clap::Parser;
use console::style;
use focus_cli::logging::{default_level, init_console, init_file};
use focus_cli::{Cli, CliResult, Commands, commands};
use log::{debug, error};
use std::process;

fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Denoise(_) => "focus_denoise",
        Commands::Synthesize(_) => "focus_synthesize",
        Commands::Simulate(_) => "focus_simulate",
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let level = default_level(cli.verbose);
    // Progress bars only make sense while logs go to the console
    let show_progress = match &cli.log_dir {
        Some(dir) => {
            let path = init_file(dir, command_label(&cli.command), level)?;
            eprintln!("Logging to {}", path.display());
            false
        }
        None => {
            init_console(level);
            console::user_attended_stderr()
        }
    };
    debug!("Parsed arguments: {cli:?}");

    match cli.command {
        Commands::Denoise(args) => commands::denoise::run(args, show_progress).map(|_| ()),
        Commands::Synthesize(args) => commands::synthesize::run(args, show_progress),
        Commands::Simulate(args) => commands::simulate::run(args).map(|_| ()),
    }
}

fn main() {
    let cli = Cli::parse();
    let logs_to_file = cli.log_dir.is_some();
    if let Err(e) = run(cli) {
        if logs_to_file {
            error!("{e}");
        }
        eprintln!("{} {e}", style("Error:").red().bold());
        process::exit(1);
    }
}
