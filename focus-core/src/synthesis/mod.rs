// ============================================================================
// focus-core/src/synthesis/mod.rs
// ============================================================================
//
// SYNTHESIS: Gradient-based optimization of a map against loss terms
//
// KEY COMPONENTS:
// - OptimizerConfig: epochs, learning rate and its decay schedule
// - SynthesisOutcome: final map plus per-epoch loss history
// - Optimizer: the optimizer seam used by the optimization driver
// - AdamSynthesis: Adam with finite-difference gradients, shipped with the crate
// - synthesize_matching: single-map synthesis against a target's statistics

pub mod adam;
pub mod demo;

pub use adam::AdamSynthesis;
pub use demo::{DemoConfig, DemoOutcome, synthesize_matching};

use crate::error::CoreResult;
use crate::loss::LossTerm;
use crate::sphere::Map;
use serde::{Deserialize, Serialize};

/// Parameters of one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Learning-rate multiplier applied every `eval_frequency` epochs
    pub decay_rate: f64,
    /// Exact number of epochs to run
    pub epoch_count: usize,
    pub learning_rate: f64,
    pub epsilon: f64,
    pub eval_frequency: usize,
}

/// Result of one optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutcome {
    pub map: Map,
    /// Total loss at the start of every epoch, summed over all workers
    pub history: Vec<f64>,
}

impl SynthesisOutcome {
    pub fn final_loss(&self) -> Option<f64> {
        self.history.last().copied()
    }
}

/// Minimizes the sum of a set of loss terms over candidate maps.
///
/// Every worker of a group calls `run` with the same initial map and config,
/// but only the loss terms it owns; the returned map is identical on all
/// workers.
pub trait Optimizer {
    fn run(&self, losses: &[LossTerm], initial: &Map, config: &OptimizerConfig) -> CoreResult<SynthesisOutcome>;
}
