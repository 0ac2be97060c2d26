// focus-cli/src/lib.rs
//
// Library portion of the FOCUS CLI application.
// Contains argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod progress;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, DenoiseArgs, SimulateArgs, SynthesizeArgs};
pub use error::{CliErrorContext, CliResult};
