// ============================================================================
// focus-cli/src/logging.rs
// ============================================================================
//
// LOGGING SETUP: Console or file logging for the CLI
//
// Console output goes through env_logger with a compact, coloured format.
// With `--log-dir` the records go to a timestamped log4rs file instead.
// On the console RUST_LOG takes precedence over the level chosen by `--verbose`.

use console::style;
use focus_core::CoreError;
use focus_core::file_logging::setup_file_logging;
use log::LevelFilter;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CliResult;

/// Level used when RUST_LOG is not set.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { LevelFilter::Info }
}

fn level_label(level: log::Level) -> console::StyledObject<&'static str> {
    match level {
        log::Level::Error => style("ERROR").red().bold(),
        log::Level::Warn => style("WARN ").yellow(),
        log::Level::Info => style("INFO ").green(),
        log::Level::Debug => style("DEBUG").blue(),
        log::Level::Trace => style("TRACE").magenta(),
    }
}

/// Initializes console logging.
pub fn init_console(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                style(buf.timestamp_seconds()).dim(),
                level_label(record.level()),
                record.args()
            )
        })
        .init();
}

/// Initializes file logging in `log_dir` and returns the log file path.
pub fn init_file(log_dir: &Path, run_name: &str, level: LevelFilter) -> CliResult<PathBuf> {
    setup_file_logging(log_dir, run_name, level).map_err(|e| CoreError::Logging(format!("{e:#}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(false), LevelFilter::Info);
        assert_eq!(default_level(true), LevelFilter::Debug);
    }
}
