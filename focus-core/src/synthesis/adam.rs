//! Adam descent with central finite-difference gradients.
//!
//! Each epoch evaluates the local loss terms at `x ± h·e_p` for every pixel
//! `p` (in parallel, collected in pixel order), all-reduces `[loss, ∇loss]`
//! across the worker group, and applies one Adam step. Since every worker
//! applies the same reduced gradient to the same start map, the maps stay
//! identical across workers.

use super::{Optimizer, OptimizerConfig, SynthesisOutcome};
use crate::distributed::Communicator;
use crate::error::{CoreError, CoreResult};
use crate::loss::{LossTerm, total_loss};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::sphere::Map;
use crate::statistics::StatisticOperator;
use log::{debug, trace};
use rayon::prelude::*;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;

/// Default finite-difference step, in normalized map units.
pub const DEFAULT_GRADIENT_STEP: f64 = 1e-4;

pub struct AdamSynthesis<'a> {
    operator: &'a dyn StatisticOperator,
    communicator: &'a dyn Communicator,
    progress: &'a dyn ProgressCallback,
    gradient_step: f64,
}

impl<'a> AdamSynthesis<'a> {
    pub fn new(
        operator: &'a dyn StatisticOperator,
        communicator: &'a dyn Communicator,
        progress: &'a dyn ProgressCallback,
    ) -> Self {
        Self {
            operator,
            communicator,
            progress,
            gradient_step: DEFAULT_GRADIENT_STEP,
        }
    }

    pub fn with_gradient_step(mut self, step: f64) -> Self {
        self.gradient_step = step;
        self
    }

    /// Local loss at `x` and its central-difference gradient.
    pub fn loss_and_gradient(&self, losses: &[LossTerm], x: &Map) -> CoreResult<(f64, Vec<f64>)> {
        if losses.is_empty() {
            return Ok((0.0, vec![0.0; x.len()]));
        }
        let h = self.gradient_step;
        let loss = total_loss(losses, x, self.operator)?;
        let gradient = (0..x.len())
            .into_par_iter()
            .map_init(
                || x.clone(),
                |probe, p| -> CoreResult<f64> {
                    let original = probe.values()[p];
                    probe.values_mut()[p] = original + h;
                    let plus = total_loss(losses, probe, self.operator);
                    probe.values_mut()[p] = original - h;
                    let minus = total_loss(losses, probe, self.operator);
                    probe.values_mut()[p] = original;
                    Ok((plus? - minus?) / (2.0 * h))
                },
            )
            .collect::<CoreResult<Vec<f64>>>()?;
        Ok((loss, gradient))
    }
}

impl Optimizer for AdamSynthesis<'_> {
    fn run(&self, losses: &[LossTerm], initial: &Map, config: &OptimizerConfig) -> CoreResult<SynthesisOutcome> {
        if config.eval_frequency == 0 {
            return Err(CoreError::Optimizer("eval frequency must be at least 1".to_string()));
        }
        if !(self.gradient_step > 0.0) {
            return Err(CoreError::Optimizer(format!(
                "finite-difference step must be positive, got {}",
                self.gradient_step
            )));
        }

        let npix = initial.len();
        let mut x = initial.clone();
        let mut m = vec![0.0; npix];
        let mut v = vec![0.0; npix];
        let mut learning_rate = config.learning_rate;
        let mut history = Vec::with_capacity(config.epoch_count);
        let mut buffer = vec![0.0; npix + 1];

        for epoch in 1..=config.epoch_count {
            let (loss, gradient) = self.loss_and_gradient(losses, &x)?;
            buffer[0] = loss;
            buffer[1..].copy_from_slice(&gradient);
            self.communicator.all_reduce_sum(&mut buffer)?;
            let total = buffer[0];
            history.push(total);

            let bias1 = 1.0 - BETA1.powi(epoch as i32);
            let bias2 = 1.0 - BETA2.powi(epoch as i32);
            for (((xi, mi), vi), g) in x.values_mut().iter_mut().zip(&mut m).zip(&mut v).zip(&buffer[1..]) {
                *mi = BETA1 * *mi + (1.0 - BETA1) * g;
                *vi = BETA2 * *vi + (1.0 - BETA2) * g * g;
                let m_hat = *mi / bias1;
                let v_hat = *vi / bias2;
                *xi -= learning_rate * m_hat / (v_hat.sqrt() + config.epsilon);
            }

            trace!("epoch {epoch}/{} loss {total:.6e}", config.epoch_count);
            if epoch % config.eval_frequency == 0 {
                debug!("Itt {epoch} L={total:.3e} lr={learning_rate:.4e}");
                learning_rate *= config.decay_rate;
            }
            self.progress.on_progress(ProgressEvent::Epoch {
                epoch,
                epochs: config.epoch_count,
                loss: total,
            });
        }

        Ok(SynthesisOutcome { map: x, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::{LocalGroup, SingleProcess};
    use crate::loss::VarianceLoss;
    use crate::progress::NullProgressCallback;
    use crate::sphere::Nside;
    use crate::statistics::{ScaleMomentOperator, StatisticVariant};
    use std::sync::Arc;
    use std::thread;

    fn config(epochs: usize) -> OptimizerConfig {
        OptimizerConfig {
            decay_rate: 0.999,
            epoch_count: epochs,
            learning_rate: 0.05,
            epsilon: 1e-16,
            eval_frequency: 10,
        }
    }

    fn variance_term(nside: Nside, level: f64) -> LossTerm {
        LossTerm::Variance(
            VarianceLoss::new(
                Arc::new(Map::constant(nside, 2.0)),
                Arc::new(Map::constant(nside, level)),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_zero_epochs_returns_initial_map() {
        let op = ScaleMomentOperator::new(StatisticVariant::Scat, 3).unwrap();
        let n = Nside::new(1).unwrap();
        let adam = AdamSynthesis::new(&op, &SingleProcess, &NullProgressCallback);
        let initial = Map::constant(n, 0.25);
        let outcome = adam.run(&[variance_term(n, 1.0)], &initial, &config(0)).unwrap();
        assert_eq!(outcome.map, initial);
        assert!(outcome.history.is_empty());
        assert_eq!(outcome.final_loss(), None);
    }

    #[test]
    fn test_descent_reduces_loss() {
        let op = ScaleMomentOperator::new(StatisticVariant::Scat, 3).unwrap();
        let n = Nside::new(1).unwrap();
        let adam = AdamSynthesis::new(&op, &SingleProcess, &NullProgressCallback);
        let outcome = adam.run(&[variance_term(n, 1.0)], &Map::zeros(n), &config(60)).unwrap();
        assert_eq!(outcome.history.len(), 60);
        assert!(outcome.history[59] < outcome.history[0]);
    }

    #[test]
    fn test_gradient_of_variance_loss() {
        let op = ScaleMomentOperator::new(StatisticVariant::Scat, 3).unwrap();
        let n = Nside::new(1).unwrap();
        let adam = AdamSynthesis::new(&op, &SingleProcess, &NullProgressCallback);
        // L = 100 (mean((2 - x)²) - 1)², at x = 0: dL/dx_p = 200 · 3 · (-4 / 12)
        let (loss, gradient) = adam.loss_and_gradient(&[variance_term(n, 1.0)], &Map::zeros(n)).unwrap();
        assert!((loss - 900.0).abs() < 1e-9);
        for g in gradient {
            assert!((g + 200.0).abs() < 1e-4, "{g}");
        }
    }

    #[test]
    fn test_workers_split_losses_but_agree_on_map() {
        let n = Nside::new(1).unwrap();
        let terms = vec![variance_term(n, 1.0), variance_term(n, 0.5)];
        let op = ScaleMomentOperator::new(StatisticVariant::Scat, 3).unwrap();
        let single = AdamSynthesis::new(&op, &SingleProcess, &NullProgressCallback)
            .run(&terms, &Map::zeros(n), &config(5))
            .unwrap();

        let handles: Vec<_> = LocalGroup::create(2)
            .unwrap()
            .into_iter()
            .map(|comm| {
                let local = vec![terms[comm.identity().rank()].clone()];
                thread::spawn(move || {
                    let op = ScaleMomentOperator::new(StatisticVariant::Scat, 3).unwrap();
                    AdamSynthesis::new(&op, &comm, &NullProgressCallback)
                        .run(&local, &Map::zeros(n), &config(5))
                        .unwrap()
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes[0], outcomes[1]);
        for (a, b) in outcomes[0].map.values().iter().zip(single.map.values()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
