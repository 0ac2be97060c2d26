//! Core library for noise-debiased reconstruction of spherical maps.
//!
//! A run estimates the clean signal behind a noisy sky map by matching
//! multiscale statistics: Monte-Carlo noise realizations calibrate the bias
//! and variance of every statistic, a composer turns them into loss terms,
//! and a two-phase descent minimizes those terms over candidate maps. The
//! whole sequence is repeated over several outer iterations, each one
//! recalibrating around the latest estimate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use focus_core::{CoreConfigBuilder, NullProgressCallback, StatisticVariant, run_denoise};
//!
//! let config = CoreConfigBuilder::new()
//!     .data_dir("/data/planck")
//!     .output_dir("/scratch/focus")
//!     .input_name("EE0256")
//!     .nside(64)
//!     .variant(StatisticVariant::Cov)
//!     .build()
//!     .unwrap();
//!
//! let summary = run_denoise(&config, &NullProgressCallback).unwrap();
//! println!("final loss: {:?}", summary.iterations.last().and_then(|i| i.final_loss));
//! ```

pub mod artifacts;
pub mod calibration;
pub mod config;
pub mod distributed;
pub mod driver;
pub mod error;
pub mod file_logging;
pub mod float_codec;
pub mod loss;
pub mod noise;
pub mod pipeline;
pub mod progress;
pub mod simulate;
pub mod sphere;
pub mod statistics;
pub mod synthesis;

// Re-exports for public API
pub use artifacts::ArtifactStore;
pub use calibration::{CalibrationKind, CalibrationPlan, NoiseCalibration, calibrate};
pub use config::{CoreConfig, CoreConfigBuilder, ScheduleConfig};
pub use distributed::{Communicator, LocalGroup, Partition, SingleProcess, WorkerIdentity};
pub use error::{CoreError, CoreResult};
pub use loss::{LossComposer, LossRole, LossTerm, Objective};
pub use noise::{NoiseEnsemble, NoiseSet};
pub use pipeline::{Controller, PreparedInputs, RunSummary, WorkingEstimate, run_denoise};
pub use progress::{NullProgressCallback, OptimizationPhase, ProgressCallback, ProgressEvent};
pub use simulate::{SimulatedDataset, SimulationConfig, simulate_dataset};
pub use sphere::{Map, MaskSet, Nside};
pub use statistics::{ScaleMomentOperator, StatBundle, StatisticOperator, StatisticVariant};
pub use synthesis::{AdamSynthesis, DemoConfig, Optimizer, OptimizerConfig, SynthesisOutcome, synthesize_matching};
