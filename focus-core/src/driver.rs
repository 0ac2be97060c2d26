// ============================================================================
// focus-core/src/driver.rs
// ============================================================================
//
// OPTIMIZATION DRIVER: Two-phase annealed descent of one outer iteration
//
// Phase 1 runs a short pass on the zeroth-order losses, always starting from
// the fixed initial estimate. Phase 2 continues from the phase 1 map on the
// full losses, with an epoch budget that grows linearly with the outer
// iteration index. A barrier follows each phase.
//
// KEY COMPONENTS:
// - OptimizationDriver: runs each phase through an Optimizer
// - DriverOutcome: final map and the loss history of each phase

use crate::config::ScheduleConfig;
use crate::distributed::Communicator;
use crate::error::CoreResult;
use crate::loss::LossTerm;
use crate::progress::{OptimizationPhase, ProgressCallback, ProgressEvent};
use crate::sphere::Map;
use crate::statistics::StatisticVariant;
use crate::synthesis::{Optimizer, OptimizerConfig, SynthesisOutcome};
use log::info;

/// Result of both optimization phases.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOutcome {
    pub map: Map,
    pub calibration_history: Vec<f64>,
    pub production_history: Vec<f64>,
}

pub struct OptimizationDriver<'a> {
    optimizer: &'a dyn Optimizer,
    communicator: &'a dyn Communicator,
    progress: &'a dyn ProgressCallback,
    schedule: ScheduleConfig,
    variant: StatisticVariant,
}

impl<'a> OptimizationDriver<'a> {
    pub fn new(
        optimizer: &'a dyn Optimizer,
        communicator: &'a dyn Communicator,
        progress: &'a dyn ProgressCallback,
        schedule: ScheduleConfig,
        variant: StatisticVariant,
    ) -> Self {
        Self {
            optimizer,
            communicator,
            progress,
            schedule,
            variant,
        }
    }

    /// Optimizer settings of `phase` in outer iteration `iteration`.
    pub fn phase_config(&self, phase: OptimizationPhase, iteration: usize) -> OptimizerConfig {
        let epoch_count = match phase {
            OptimizationPhase::Calibration => self.schedule.calibration_epochs,
            OptimizationPhase::Production => self.schedule.production_epochs(self.variant, iteration),
        };
        OptimizerConfig {
            decay_rate: self.schedule.decay_rate,
            epoch_count,
            learning_rate: self.schedule.learning_rate,
            epsilon: self.schedule.epsilon,
            eval_frequency: self.schedule.eval_frequency,
        }
    }

    /// Runs one phase from `start`, followed by a barrier.
    pub fn run_phase(
        &self,
        phase: OptimizationPhase,
        iteration: usize,
        losses: &[LossTerm],
        start: &Map,
    ) -> CoreResult<SynthesisOutcome> {
        let config = self.phase_config(phase, iteration);
        info!("Iteration {iteration}: {phase}, {} epochs", config.epoch_count);
        self.progress.on_progress(ProgressEvent::PhaseStart {
            phase,
            epochs: config.epoch_count,
        });
        let outcome = self.optimizer.run(losses, start, &config)?;
        self.communicator.barrier();
        self.progress.on_progress(ProgressEvent::PhaseComplete {
            phase,
            final_loss: outcome.final_loss(),
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::SingleProcess;
    use crate::progress::NullProgressCallback;
    use crate::sphere::Nside;
    use std::sync::Mutex;

    /// Records every run and returns the start map shifted by one.
    #[derive(Default)]
    struct Recorder {
        runs: Mutex<Vec<(usize, usize, f64)>>,
    }

    impl Optimizer for Recorder {
        fn run(&self, losses: &[LossTerm], initial: &Map, config: &OptimizerConfig) -> CoreResult<SynthesisOutcome> {
            self.runs
                .lock()
                .unwrap()
                .push((config.epoch_count, losses.len(), initial.values()[0]));
            Ok(SynthesisOutcome {
                map: initial.map_values(|v| v + 1.0),
                history: vec![0.0; config.epoch_count],
            })
        }
    }

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            calibration_epochs: 100,
            production_base: None,
            production_step: 500,
            learning_rate: 0.3,
            decay_rate: 0.999,
            epsilon: 1e-16,
            eval_frequency: 100,
            zeroth_order_only: false,
        }
    }

    #[test]
    fn test_phase_two_starts_from_phase_one() {
        let recorder = Recorder::default();
        let driver = OptimizationDriver::new(
            &recorder,
            &SingleProcess,
            &NullProgressCallback,
            schedule(),
            StatisticVariant::Cov,
        );
        let initial = Map::zeros(Nside::new(1).unwrap());
        let first = driver.run_phase(OptimizationPhase::Calibration, 2, &[], &initial).unwrap();
        let second = driver.run_phase(OptimizationPhase::Production, 2, &[], &first.map).unwrap();
        assert_eq!(second.map.values()[0], 2.0);
        assert_eq!(first.history.len(), 100);
        assert_eq!(second.history.len(), 2000);
        let runs = recorder.runs.lock().unwrap();
        assert_eq!(runs.as_slice(), &[(100, 0, 0.0), (2000, 0, 1.0)]);
    }

    #[test]
    fn test_phase_config_defaults() {
        let recorder = Recorder::default();
        let driver = OptimizationDriver::new(
            &recorder,
            &SingleProcess,
            &NullProgressCallback,
            schedule(),
            StatisticVariant::Scat,
        );
        let config = driver.phase_config(OptimizationPhase::Production, 0);
        assert_eq!(config.epoch_count, 2000);
        assert_eq!(config.learning_rate, 0.3);
        assert_eq!(config.decay_rate, 0.999);
        assert_eq!(config.eval_frequency, 100);
        assert_eq!(driver.phase_config(OptimizationPhase::Calibration, 4).epoch_count, 100);
    }
}
