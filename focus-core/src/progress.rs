// ============================================================================
// focus-core/src/progress.rs
// ============================================================================
//
// PROGRESS REPORTING: Reconstruction progress callbacks and events
//
// The core library reports iteration, calibration and optimization progress
// through a callback so that front ends can render it however they like
// (the CLI draws progress bars on rank 0).
//
// KEY COMPONENTS:
// - ProgressEvent: Enum of progress event types
// - OptimizationPhase: the two phases of one outer iteration
// - ProgressCallback: Trait for receiving progress events
// - NullProgressCallback: No-op implementation

use crate::calibration::CalibrationKind;
use std::fmt;
use std::time::Duration;

/// The two optimization passes of an outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationPhase {
    /// Short zeroth-order pass.
    Calibration,
    /// Long full-statistic pass.
    Production,
}

impl fmt::Display for OptimizationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationPhase::Calibration => write!(f, "phase 1 (zeroth order)"),
            OptimizationPhase::Production => write!(f, "phase 2 (full statistics)"),
        }
    }
}

/// Progress events emitted during a reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// An outer iteration has started
    IterationStart {
        /// Zero-based iteration index
        iteration: usize,
        /// Total number of outer iterations
        total: usize,
    },

    /// A noise calibration finished
    CalibrationComplete {
        kind: CalibrationKind,
        realizations: usize,
    },

    /// An optimization phase is about to run
    PhaseStart {
        phase: OptimizationPhase,
        epochs: usize,
    },

    /// One optimization epoch finished
    Epoch {
        /// One-based epoch number
        epoch: usize,
        epochs: usize,
        loss: f64,
    },

    /// An optimization phase finished
    PhaseComplete {
        phase: OptimizationPhase,
        final_loss: Option<f64>,
    },

    /// An outer iteration finished, including persistence
    IterationComplete {
        iteration: usize,
        duration: Duration,
    },
}

/// Receives progress events from the core library.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// A progress callback that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressCallback;

impl ProgressCallback for NullProgressCallback {
    fn on_progress(&self, _event: ProgressEvent) {}
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}
