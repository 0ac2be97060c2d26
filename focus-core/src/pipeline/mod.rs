// ============================================================================
// focus-core/src/pipeline/mod.rs
// ============================================================================
//
// PIPELINE: Outer iteration controller and run entry point
//
// Every worker runs the same sequence of stages, `iteration_count` times:
//
//   CALIBRATE -> COMPOSE -> OPTIMIZE_PHASE1 -> OPTIMIZE_PHASE2 -> PERSIST
//
// The working estimate starts as the two half-split maps plus the full data
// map. After the first iteration it is the single reconstructed map, used in
// every role. Persistence failures are logged and never change control flow.
//
// KEY COMPONENTS:
// - Controller: the staged loop for one worker
// - WorkingEstimate: the value threaded from one iteration to the next
// - run_denoise: loads inputs once and runs one controller per worker
// - RunSummary: final map and per-iteration records

pub mod inputs;

pub use inputs::{DatasetLayout, NoiseKind, PreparedInputs, RawInputs, load_inputs, load_raw_inputs};

use crate::artifacts::ArtifactStore;
use crate::calibration::{BiasTracker, CalibrationKind, CalibrationPlan, CalibrationSet, NoiseCalibration, calibrate};
use crate::config::{CoreConfig, ScheduleConfig};
use crate::distributed::{Communicator, LocalGroup, Partition, SingleProcess};
use crate::driver::{DriverOutcome, OptimizationDriver};
use crate::error::{CoreError, CoreResult};
use crate::loss::{LossComposer, Objective};
use crate::progress::{NullProgressCallback, OptimizationPhase, ProgressCallback, ProgressEvent};
use crate::sphere::{Map, MaskSet};
use crate::statistics::{ScaleMomentOperator, StatBundle, StatisticOperator, StatisticVariant};
use crate::synthesis::{AdamSynthesis, Optimizer};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Stages of one outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Calibrate,
    Compose,
    OptimizePhase1,
    OptimizePhase2,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Calibrate => "CALIBRATE",
            Stage::Compose => "COMPOSE",
            Stage::OptimizePhase1 => "OPTIMIZE_PHASE1",
            Stage::OptimizePhase2 => "OPTIMIZE_PHASE2",
            Stage::Persist => "PERSIST",
        };
        f.write_str(name)
    }
}

/// Current estimate of the clean signal.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkingEstimate {
    Initial { half1: Map, half2: Map, data: Map },
    Reconstructed(Map),
}

impl WorkingEstimate {
    pub fn initial(inputs: &PreparedInputs) -> Self {
        WorkingEstimate::Initial {
            half1: inputs.half1.clone(),
            half2: inputs.half2.clone(),
            data: inputs.data.clone(),
        }
    }

    /// The two maps standing in for the half splits.
    pub fn halves(&self) -> (&Map, &Map) {
        match self {
            WorkingEstimate::Initial { half1, half2, .. } => (half1, half2),
            WorkingEstimate::Reconstructed(map) => (map, map),
        }
    }

    /// The map standing in for the full-data signal.
    pub fn signal(&self) -> &Map {
        match self {
            WorkingEstimate::Initial { data, .. } => data,
            WorkingEstimate::Reconstructed(map) => map,
        }
    }
}

/// Record of one finished outer iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSummary {
    pub iteration: usize,
    pub calibration_epochs: usize,
    pub production_epochs: usize,
    pub final_loss: Option<f64>,
    pub duration: Duration,
}

/// Result of a reconstruction run on one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_name: String,
    /// Final estimate in normalized units
    pub map: Map,
    /// Final estimate in physical units
    pub physical_map: Map,
    pub iterations: Vec<IterationSummary>,
    pub duration: Duration,
}

/// Drives the outer iterations of one worker.
pub struct Controller<'a> {
    operator: &'a dyn StatisticOperator,
    optimizer: &'a dyn Optimizer,
    communicator: &'a dyn Communicator,
    progress: &'a dyn ProgressCallback,
    store: &'a ArtifactStore,
    schedule: ScheduleConfig,
    variant: StatisticVariant,
    iterations: usize,
}

impl<'a> Controller<'a> {
    pub fn new(
        operator: &'a dyn StatisticOperator,
        optimizer: &'a dyn Optimizer,
        communicator: &'a dyn Communicator,
        progress: &'a dyn ProgressCallback,
        store: &'a ArtifactStore,
        config: &CoreConfig,
    ) -> Self {
        Self {
            operator,
            optimizer,
            communicator,
            progress,
            store,
            schedule: config.schedule.clone(),
            variant: config.variant,
            iterations: config.outer_iterations,
        }
    }

    fn enter(&self, iteration: usize, stage: Stage) {
        debug!(
            "[rank {}] iteration {iteration}: {stage}",
            self.communicator.identity().rank()
        );
    }

    /// Runs every outer iteration on `inputs`.
    pub fn run(&self, inputs: &PreparedInputs) -> CoreResult<RunSummary> {
        let started = Instant::now();
        let partition = Partition::for_worker(self.communicator.identity());
        let root = partition.writes_shared_artifacts();
        if partition.is_idle() {
            debug!(
                "Worker {} owns no loss term and only joins collectives",
                partition.identity().rank()
            );
        }

        let masks = Arc::new(inputs.masks.clone());
        let data_reference = self
            .operator
            .evaluate(&inputs.half1, Some(&inputs.half2), &masks, true)?;
        let cross_reference = self
            .operator
            .evaluate(&inputs.template, Some(&inputs.data), &masks, false)?;
        let composer = LossComposer {
            masks: Arc::clone(&masks),
            data: Arc::new(inputs.data.clone()),
            template: Arc::new(inputs.template.clone()),
            inverse_noise_variance: Arc::new(inputs.inverse_noise_variance.clone()),
            data_reference,
            cross_reference,
            variant: self.variant,
        };
        let input_stats = if root {
            Some(self.operator.evaluate(&inputs.data, None, &masks, true)?)
        } else {
            None
        };

        let driver = OptimizationDriver::new(
            self.optimizer,
            self.communicator,
            self.progress,
            self.schedule.clone(),
            self.variant,
        );
        let initial = inputs.half1.midpoint(&inputs.half2)?;
        let objective = Objective::from_zeroth_order_flag(self.schedule.zeroth_order_only);

        let mut estimate = WorkingEstimate::initial(inputs);
        let mut tracker = BiasTracker::new();
        let mut iterations = Vec::with_capacity(self.iterations);

        for iteration in 0..self.iterations {
            let iteration_started = Instant::now();
            if root {
                info!("Outer iteration {}/{}", iteration + 1, self.iterations);
            }
            self.progress.on_progress(ProgressEvent::IterationStart {
                iteration,
                total: self.iterations,
            });

            self.enter(iteration, Stage::Calibrate);
            let calibrations = self.calibrate(&partition, &estimate, inputs, &masks, &mut tracker)?;

            self.enter(iteration, Stage::Compose);
            let zeroth_order = composer.compose(partition.roles(), &calibrations, Objective::ZerothOrder)?;
            let production = composer.compose(partition.roles(), &calibrations, objective)?;

            self.enter(iteration, Stage::OptimizePhase1);
            let first = driver.run_phase(OptimizationPhase::Calibration, iteration, &zeroth_order, &initial)?;
            self.enter(iteration, Stage::OptimizePhase2);
            let second = driver.run_phase(OptimizationPhase::Production, iteration, &production, &first.map)?;
            let outcome = DriverOutcome {
                map: second.map,
                calibration_history: first.history,
                production_history: second.history,
            };

            self.enter(iteration, Stage::Persist);
            self.persist(&partition, iteration, &calibrations, &composer, input_stats.as_ref(), inputs, &outcome);
            self.communicator.barrier();

            let duration = iteration_started.elapsed();
            iterations.push(IterationSummary {
                iteration,
                calibration_epochs: outcome.calibration_history.len(),
                production_epochs: outcome.production_history.len(),
                final_loss: outcome.production_history.last().copied(),
                duration,
            });
            self.progress
                .on_progress(ProgressEvent::IterationComplete { iteration, duration });
            estimate = WorkingEstimate::Reconstructed(outcome.map);
        }

        let map = match estimate {
            WorkingEstimate::Reconstructed(map) => map,
            WorkingEstimate::Initial { .. } => initial,
        };
        Ok(RunSummary {
            run_name: self.store.run_name().to_string(),
            physical_map: inputs.to_physical(&map),
            map,
            iterations,
            duration: started.elapsed(),
        })
    }

    fn calibrate(
        &self,
        partition: &Partition,
        estimate: &WorkingEstimate,
        inputs: &PreparedInputs,
        masks: &MaskSet,
        tracker: &mut BiasTracker,
    ) -> CoreResult<CalibrationSet> {
        let (half1, half2) = estimate.halves();
        let mut set = CalibrationSet::new();
        for kind in partition.calibrations() {
            let plan = match kind {
                CalibrationKind::Auto => {
                    CalibrationPlan::auto(half1, half2, &inputs.noise.half1, &inputs.noise.half2)
                }
                CalibrationKind::Cross => {
                    CalibrationPlan::template_cross(&inputs.template, estimate.signal(), &inputs.noise.full)
                }
                CalibrationKind::Data => {
                    let plan = CalibrationPlan::data(half1, half2, &inputs.noise.full);
                    match set.get(CalibrationKind::Auto) {
                        Some(auto) => plan.with_baseline(auto.baseline.clone()),
                        None => plan,
                    }
                }
            };
            let calibration = calibrate(self.operator, masks, &plan)?;
            if partition.writes_calibration(kind) {
                tracker.observe(&calibration)?;
            }
            self.progress.on_progress(ProgressEvent::CalibrationComplete {
                kind,
                realizations: calibration.realizations,
            });
            set.insert(calibration);
        }
        Ok(set)
    }

    fn save_calibration(&self, iteration: usize, calibration: &NoiseCalibration) -> CoreResult<()> {
        self.store
            .save_bundle(&self.store.bias_path(calibration.kind, iteration), &calibration.bias)?;
        self.store.save_bundle(
            &self.store.inverse_variance_path(calibration.kind, iteration),
            &calibration.inverse_variance,
        )
    }

    fn save_shared(
        &self,
        iteration: usize,
        composer: &LossComposer,
        input_stats: Option<&StatBundle>,
        inputs: &PreparedInputs,
        outcome: &DriverOutcome,
    ) -> CoreResult<()> {
        self.store
            .save_bundle(&self.store.cross_path(iteration), &composer.data_reference)?;
        if let Some(stats) = input_stats {
            self.store.save_bundle(&self.store.input_stats_path(iteration), stats)?;
        }
        let output_stats = self.operator.evaluate(&outcome.map, None, &composer.masks, true)?;
        self.store
            .save_bundle(&self.store.output_stats_path(iteration), &output_stats)?;
        self.store
            .save_map(&self.store.result_path(iteration), &inputs.to_physical(&outcome.map))?;
        self.store.save_history(iteration, &outcome.production_history)
    }

    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        partition: &Partition,
        iteration: usize,
        calibrations: &CalibrationSet,
        composer: &LossComposer,
        input_stats: Option<&StatBundle>,
        inputs: &PreparedInputs,
        outcome: &DriverOutcome,
    ) {
        for calibration in calibrations.iter() {
            if !partition.writes_calibration(calibration.kind) {
                continue;
            }
            if let Err(e) = self.save_calibration(iteration, calibration) {
                warn!("Failed to save {} calibration of iteration {iteration}: {e}", calibration.kind);
            }
        }
        if partition.writes_shared_artifacts() {
            match self.save_shared(iteration, composer, input_stats, inputs, outcome) {
                Ok(()) => info!(
                    "Saved iteration {iteration} result to {}",
                    self.store.result_path(iteration).display()
                ),
                Err(e) => warn!("Failed to save artifacts of iteration {iteration}: {e}"),
            }
        }
    }
}

fn run_worker(
    config: &CoreConfig,
    operator: &dyn StatisticOperator,
    communicator: &dyn Communicator,
    progress: &dyn ProgressCallback,
    store: &ArtifactStore,
    inputs: &PreparedInputs,
) -> CoreResult<RunSummary> {
    let optimizer = AdamSynthesis::new(operator, communicator, progress);
    Controller::new(operator, &optimizer, communicator, progress, store, config).run(inputs)
}

/// Runs a full reconstruction with `config.workers` in-process workers.
///
/// Inputs are loaded once and shared by every worker. Only the first worker
/// reports progress; its summary is returned.
pub fn run_denoise(config: &CoreConfig, progress: &dyn ProgressCallback) -> CoreResult<RunSummary> {
    config.validate()?;
    let store = ArtifactStore::new(&config.output_dir, config.run_name());
    store.ensure_dir()?;
    info!(
        "Starting run {} ({} variant, nside {}, {} workers)",
        store.run_name(),
        config.variant,
        config.nside,
        config.workers
    );
    if let Err(e) = config.save_to_file(&store.config_path()) {
        warn!("Could not save run configuration: {e}");
    }

    let inputs = load_inputs(config, &store)?;
    let operator = ScaleMomentOperator::new(config.variant, config.kernel_size)?;

    if config.workers == 1 {
        return run_worker(config, &operator, &SingleProcess, progress, &store, &inputs);
    }

    let group = LocalGroup::create(config.workers)?;
    let (operator, store, inputs) = (&operator, &store, &inputs);
    let results: Vec<CoreResult<Option<RunSummary>>> = thread::scope(|scope| {
        let handles: Vec<_> = group
            .into_iter()
            .map(|communicator| {
                scope.spawn(move || {
                    let reporter = Partition::for_worker(communicator.identity()).reports_progress();
                    let progress: &dyn ProgressCallback = if reporter { progress } else { &NullProgressCallback };
                    run_worker(config, operator, &communicator, progress, store, inputs)
                        .map(|summary| reporter.then_some(summary))
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(CoreError::Worker(format!("worker {rank} panicked"))))
            })
            .collect()
    });

    let mut root = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(summary) => root = root.or(summary),
            Err(e) => return Err(CoreError::Worker(format!("worker {rank} failed: {e}"))),
        }
    }
    root.ok_or_else(|| CoreError::Worker("no worker reported a run summary".to_string()))
}
