//! Optimization schedule configuration
//!
//! Epoch budgets and descent parameters of the two optimization phases.

use serde::{Deserialize, Serialize};

use super::utils::*;
use crate::error::{CoreError, CoreResult};
use crate::statistics::StatisticVariant;

/// Epochs of the zeroth-order calibration pass.
pub const DEFAULT_CALIBRATION_EPOCHS: usize = 100;

/// Production epochs of the first iteration with scattering statistics.
pub const DEFAULT_SCAT_PRODUCTION_EPOCHS: usize = 2000;

/// Production epochs of the first iteration with covariance statistics.
pub const DEFAULT_COV_PRODUCTION_EPOCHS: usize = 1000;

/// Extra production epochs per outer iteration.
pub const DEFAULT_PRODUCTION_STEP: usize = 500;

pub const DEFAULT_LEARNING_RATE: f64 = 0.3;
pub const DEFAULT_DECAY_RATE: f64 = 0.999;
pub const DEFAULT_EPSILON: f64 = 1e-16;
pub const DEFAULT_EVAL_FREQUENCY: usize = 100;

/// Epoch budgets and descent parameters shared by every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Epochs of phase 1 (zeroth-order losses)
    pub calibration_epochs: usize,

    /// Phase 2 epochs at iteration 0; `None` picks the variant's default
    pub production_base: Option<usize>,

    /// Phase 2 epochs added per outer iteration
    pub production_step: usize,

    pub learning_rate: f64,

    /// Learning-rate multiplier applied every `eval_frequency` epochs
    pub decay_rate: f64,

    pub epsilon: f64,

    pub eval_frequency: usize,

    /// Restrict phase 2 to the zeroth-order channel as well
    pub zeroth_order_only: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            calibration_epochs: get_env_usize("FOCUS_CALIBRATION_EPOCHS", DEFAULT_CALIBRATION_EPOCHS),
            production_base: get_env_opt_usize("FOCUS_PRODUCTION_EPOCHS"),
            production_step: get_env_usize("FOCUS_PRODUCTION_STEP", DEFAULT_PRODUCTION_STEP),
            learning_rate: get_env_f64("FOCUS_LEARNING_RATE", DEFAULT_LEARNING_RATE),
            decay_rate: get_env_f64("FOCUS_DECAY_RATE", DEFAULT_DECAY_RATE),
            epsilon: DEFAULT_EPSILON,
            eval_frequency: get_env_usize("FOCUS_EVAL_FREQUENCY", DEFAULT_EVAL_FREQUENCY),
            zeroth_order_only: get_env_bool("FOCUS_P00", false),
        }
    }
}

impl ScheduleConfig {
    /// Phase 2 epochs at iteration 0 for `variant`.
    pub fn production_base_for(&self, variant: StatisticVariant) -> usize {
        self.production_base.unwrap_or(match variant {
            StatisticVariant::Scat => DEFAULT_SCAT_PRODUCTION_EPOCHS,
            StatisticVariant::Cov => DEFAULT_COV_PRODUCTION_EPOCHS,
        })
    }

    /// Phase 2 epochs of outer iteration `iteration`: `base + step · iteration`.
    pub fn production_epochs(&self, variant: StatisticVariant, iteration: usize) -> usize {
        self.production_base_for(variant) + self.production_step * iteration
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CoreError::Config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate <= 1.0) {
            return Err(CoreError::Config(format!(
                "decay rate must lie in (0, 1], got {}",
                self.decay_rate
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(CoreError::Config(format!("epsilon must be non-negative, got {}", self.epsilon)));
        }
        if self.eval_frequency == 0 {
            return Err(CoreError::Config("eval frequency must be at least 1".to_string()));
        }
        Ok(())
    }
}
