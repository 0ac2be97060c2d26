//! Single-map statistic synthesis.
//!
//! Starts from a seeded Gaussian map with the per-scale spread of the target
//! and descends until its statistics match the target's, either its own
//! statistic or its cross statistic with the target. Maps are standardized
//! before the descent and brought back afterwards.

use super::{AdamSynthesis, Optimizer, OptimizerConfig, SynthesisOutcome};
use crate::distributed::SingleProcess;
use crate::error::CoreResult;
use crate::loss::{CandidateModel, LossRole, LossTerm, Objective, StatisticLoss};
use crate::progress::ProgressCallback;
use crate::simulate::matched_gaussian;
use crate::sphere::{Map, MaskSet};
use crate::statistics::{ScaleMomentOperator, StatisticOperator, StatisticVariant};
use log::info;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    pub variant: StatisticVariant,
    pub kernel_size: u32,
    /// Match `Op(target, x)` instead of `Op(x, x)`
    pub cross: bool,
    pub zeroth_order_only: bool,
    pub seed: u64,
    pub optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoOutcome {
    /// Start map, in the units of the target
    pub start: Map,
    /// Synthesized map, in the units of the target
    pub map: Map,
    pub history: Vec<f64>,
}

/// Synthesizes a map whose statistics match those of `target`.
pub fn synthesize_matching(
    target: &Map,
    config: &DemoConfig,
    progress: &dyn ProgressCallback,
) -> CoreResult<DemoOutcome> {
    let operator = ScaleMomentOperator::new(config.variant, config.kernel_size)?;
    let (offset, spread) = (target.mean(), target.std());
    let spread = if spread > 0.0 { spread } else { 1.0 };
    let standardized = target.map_values(|v| (v - offset) / spread);
    let masks = Arc::new(MaskSet::uniform(target.nside()));

    let (model, reference, role) = if config.cross {
        (
            CandidateModel::TemplateCross {
                template: Arc::new(standardized.clone()),
            },
            operator.evaluate(&standardized, Some(&standardized), &masks, false)?,
            LossRole::TemplateCross,
        )
    } else {
        (
            CandidateModel::Auto,
            operator.evaluate(&standardized, None, &masks, true)?,
            LossRole::Auto,
        )
    };
    let weight = reference.ones_like();
    let objective = Objective::from_zeroth_order_flag(config.zeroth_order_only);
    let loss = StatisticLoss::new(model, reference, weight, masks, objective)?;

    let start = matched_gaussian(&standardized, config.seed)?;
    info!(
        "Synthesizing {} map at nside {} over {} epochs",
        if config.cross { "cross-matched" } else { "auto-matched" },
        target.nside(),
        config.optimizer.epoch_count
    );
    let optimizer = AdamSynthesis::new(&operator, &SingleProcess, progress);
    let SynthesisOutcome { map, history } =
        optimizer.run(&[LossTerm::Statistic { role, loss }], &start, &config.optimizer)?;

    let restore = |m: &Map| m.map_values(|v| v * spread + offset);
    Ok(DemoOutcome {
        start: restore(&start),
        map: restore(&map),
        history,
    })
}
