//! Configuration structures and constants for the focus-core library.
//!
//! A [`CoreConfig`] describes one reconstruction run: where the inputs live,
//! the working resolution, which statistics to match and how long to optimize.
//! Defaults may be overridden through `FOCUS_*` environment variables, and a
//! configuration can be stored as JSON next to the run's artifacts.

mod builder;
mod schedule;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use builder::CoreConfigBuilder;
pub use schedule::{
    DEFAULT_CALIBRATION_EPOCHS, DEFAULT_COV_PRODUCTION_EPOCHS, DEFAULT_DECAY_RATE, DEFAULT_EPSILON,
    DEFAULT_EVAL_FREQUENCY, DEFAULT_LEARNING_RATE, DEFAULT_PRODUCTION_STEP, DEFAULT_SCAT_PRODUCTION_EPOCHS,
    ScheduleConfig,
};

use crate::error::{CoreError, CoreResult, artifact_error};
use crate::sphere::Nside;
use crate::statistics::{StatisticVariant, scale_weight};
use utils::*;

// Default constants

/// Default working resolution.
pub const DEFAULT_NSIDE: u32 = 64;

/// Default operator kernel size (3 or 5).
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

/// Default number of outer bias/optimization iterations.
pub const DEFAULT_OUTER_ITERATIONS: usize = 5;

/// Default number of Monte-Carlo noise realizations.
pub const DEFAULT_NOISE_REALIZATIONS: usize = 100;

/// Default template file name inside the data directory.
pub const DEFAULT_TEMPLATE_FILE: &str = "TT857.json";

/// Default seed of generated maps.
pub const DEFAULT_SEED: u64 = 1234;

/// Main configuration structure for a reconstruction run.
///
/// # Examples
///
/// ```rust,no_run
/// use focus_core::config::CoreConfigBuilder;
/// use focus_core::statistics::StatisticVariant;
///
/// let config = CoreConfigBuilder::new()
///     .data_dir("/data/planck")
///     .output_dir("/scratch/focus")
///     .input_name("EE0256")
///     .nside(64)
///     .variant(StatisticVariant::Cov)
///     .build()
///     .unwrap();
/// assert_eq!(config.run_name(), "FOCUSEE025664");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding data maps, template, masks and noise realizations
    pub data_dir: PathBuf,

    /// Directory receiving cached inputs and per-iteration artifacts
    pub output_dir: PathBuf,

    /// Base name of the input data files
    pub input_name: String,

    /// Working resolution (power of two in 2..=256)
    pub nside: u32,

    pub variant: StatisticVariant,

    /// Operator kernel size (3 or 5)
    pub kernel_size: u32,

    pub outer_iterations: usize,

    pub noise_realizations: usize,

    /// Template file inside `data_dir`
    pub template_file: String,

    /// Mask files inside `data_dir`; the first one is replaced by a uniform mask
    pub mask_files: Vec<String>,

    /// Number of workers sharing the loss terms
    pub workers: usize,

    pub schedule: ScheduleConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: get_env_path("FOCUS_DATA_DIR", PathBuf::from(".")),
            output_dir: get_env_path("FOCUS_OUTPUT_DIR", PathBuf::from(".")),
            input_name: get_env_string("FOCUS_INPUT_NAME", String::new()),
            nside: get_env_u32("FOCUS_NSIDE", DEFAULT_NSIDE),
            variant: get_env_parsed("FOCUS_VARIANT", StatisticVariant::Scat),
            kernel_size: get_env_u32("FOCUS_KERNEL_SIZE", DEFAULT_KERNEL_SIZE),
            outer_iterations: get_env_usize("FOCUS_ITERATIONS", DEFAULT_OUTER_ITERATIONS),
            noise_realizations: get_env_usize("FOCUS_REALIZATIONS", DEFAULT_NOISE_REALIZATIONS),
            template_file: get_env_string("FOCUS_TEMPLATE_FILE", DEFAULT_TEMPLATE_FILE.to_string()),
            mask_files: get_env_list("FOCUS_MASK_FILES", Vec::new()),
            workers: get_env_usize("FOCUS_WORKERS", 1),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default settings for the given run.
    pub fn new(data_dir: PathBuf, output_dir: PathBuf, input_name: impl Into<String>) -> Self {
        Self {
            data_dir,
            output_dir,
            input_name: input_name.into(),
            ..Self::default()
        }
    }

    /// Validates the configuration parameters.
    ///
    /// Every configuration error is reported here, before any computation.
    pub fn validate(&self) -> CoreResult<()> {
        if self.input_name.trim().is_empty() {
            return Err(CoreError::Config("input name must not be empty".to_string()));
        }
        Nside::working(self.nside)?;
        scale_weight(self.kernel_size)?;
        if self.outer_iterations == 0 {
            return Err(CoreError::Config("at least one outer iteration is required".to_string()));
        }
        if self.noise_realizations == 0 {
            return Err(CoreError::Config("at least one noise realization is required".to_string()));
        }
        if self.workers == 0 {
            return Err(CoreError::Config("at least one worker is required".to_string()));
        }
        self.schedule.validate()
    }

    /// Working resolution as a checked value.
    pub fn working_nside(&self) -> CoreResult<Nside> {
        Nside::working(self.nside)
    }

    /// Prefix of every artifact written by this run.
    pub fn run_name(&self) -> String {
        if self.kernel_size == 5 {
            format!("FOCUS_5x5{}{}", self.input_name, self.nside)
        } else {
            format!("FOCUS{}{}", self.input_name, self.nside)
        }
    }

    /// Phase 2 epochs of outer iteration `iteration`.
    pub fn production_epochs(&self, iteration: usize) -> usize {
        self.schedule.production_epochs(self.variant, iteration)
    }

    /// Loads a configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| artifact_error(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Saves the configuration as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> CoreResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|e| artifact_error(path, e))
    }
}
