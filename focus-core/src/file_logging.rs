//! Run log files written through log4rs.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::LevelFilter;
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use std::path::{Path, PathBuf};

/// Name of a run log file: `{run}_{YYYYmmdd_HHMMSS}.log`.
pub fn log_file_name(run_name: &str, timestamp: DateTime<Local>) -> String {
    format!("{run_name}_{}.log", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Routes every record at or above `log_level` to a new timestamped file in
/// `log_dir` and returns its path.
pub fn setup_file_logging(log_dir: &Path, run_name: &str, log_level: LevelFilter) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_file = log_dir.join(log_file_name(run_name, Local::now()));

    let appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} [{l}] {m}{n}")))
        .build(&log_file)
        .with_context(|| format!("opening log file {}", log_file.display()))?;

    let config = Config::builder()
        .appender(Appender::builder().build("run", Box::new(appender)))
        .build(Root::builder().appender("run").build(log_level))?;
    log4rs::init_config(config)?;

    Ok(log_file)
}
