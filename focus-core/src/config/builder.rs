// ============================================================================
// focus-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of CoreConfig values. Unset fields keep the defaults
// of CoreConfig::default() (constants or FOCUS_* environment overrides), and
// build() validates the result.
//
// KEY COMPONENTS:
// - CoreConfigBuilder: Builder struct for creating CoreConfig instances

use std::path::PathBuf;

use super::CoreConfig;
use crate::error::CoreResult;
use crate::statistics::StatisticVariant;

/// Builder for creating validated [`CoreConfig`] instances.
#[derive(Debug, Clone)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl Default for CoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreConfigBuilder {
    /// Creates a new builder holding the default configuration.
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// Starts from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: CoreConfig) -> Self {
        Self { config }
    }

    /// Sets the directory holding the input data.
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = data_dir.into();
        self
    }

    /// Sets the directory receiving cached inputs and artifacts.
    pub fn output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = output_dir.into();
        self
    }

    pub fn input_name(mut self, name: impl Into<String>) -> Self {
        self.config.input_name = name.into();
        self
    }

    /// Sets the working resolution.
    pub fn nside(mut self, nside: u32) -> Self {
        self.config.nside = nside;
        self
    }

    pub fn variant(mut self, variant: StatisticVariant) -> Self {
        self.config.variant = variant;
        self
    }

    pub fn kernel_size(mut self, kernel_size: u32) -> Self {
        self.config.kernel_size = kernel_size;
        self
    }

    pub fn outer_iterations(mut self, iterations: usize) -> Self {
        self.config.outer_iterations = iterations;
        self
    }

    pub fn noise_realizations(mut self, realizations: usize) -> Self {
        self.config.noise_realizations = realizations;
        self
    }

    pub fn template_file(mut self, file: impl Into<String>) -> Self {
        self.config.template_file = file.into();
        self
    }

    pub fn mask_files(mut self, files: Vec<String>) -> Self {
        self.config.mask_files = files;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the number of phase 1 epochs.
    pub fn calibration_epochs(mut self, epochs: usize) -> Self {
        self.config.schedule.calibration_epochs = epochs;
        self
    }

    /// Sets the number of phase 2 epochs at iteration 0.
    pub fn production_epochs(mut self, epochs: usize) -> Self {
        self.config.schedule.production_base = Some(epochs);
        self
    }

    pub fn production_step(mut self, step: usize) -> Self {
        self.config.schedule.production_step = step;
        self
    }

    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.config.schedule.learning_rate = rate;
        self
    }

    pub fn decay_rate(mut self, rate: f64) -> Self {
        self.config.schedule.decay_rate = rate;
        self
    }

    pub fn eval_frequency(mut self, frequency: usize) -> Self {
        self.config.schedule.eval_frequency = frequency;
        self
    }

    /// Restricts phase 2 to the zeroth-order channel.
    pub fn zeroth_order_only(mut self, enabled: bool) -> Self {
        self.config.schedule.zeroth_order_only = enabled;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> CoreResult<CoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let config = CoreConfigBuilder::new()
            .data_dir("/data")
            .output_dir("/out")
            .input_name("EE0256")
            .nside(32)
            .variant(StatisticVariant::Cov)
            .kernel_size(5)
            .outer_iterations(2)
            .noise_realizations(10)
            .production_epochs(50)
            .production_step(5)
            .learning_rate(0.1)
            .zeroth_order_only(true)
            .build()
            .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.nside, 32);
        assert_eq!(config.production_epochs(1), 55);
        assert!(config.schedule.zeroth_order_only);
        assert_eq!(config.run_name(), "FOCUS_5x5EE025632");
    }

    #[test]
    fn test_build_validates() {
        assert!(CoreConfigBuilder::new().input_name("x").nside(6).build().is_err());
        assert!(CoreConfigBuilder::new().input_name("x").kernel_size(7).build().is_err());
    }
}
