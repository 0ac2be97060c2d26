// ============================================================================
// focus-core/src/loss.rs
// ============================================================================
//
// LOSS COMPOSITION: Debiased statistic losses and the variance-matching term
//
// Every loss term captures immutable reference data at construction and maps
// a candidate map to a scalar. Statistic losses compare the operator's output
// on the candidate with a bias-corrected reference, weighted by the
// calibrated inverse variance:
//
//   full mode:          sum over channels of mean(w × (ref − cand)²)
//   zeroth-order mode:  sum of |w.P00 × (ref.P00 − cand.P00)²|
//
// KEY COMPONENTS:
// - Objective: full statistic or zeroth-order channel only
// - LossRole: which of the four loss families a term belongs to
// - StatisticLoss / VarianceLoss / LossTerm: the loss closures
// - LossComposer: builds the terms of one iteration from its calibrations

use crate::calibration::{CalibrationKind, CalibrationSet, NoiseCalibration};
use crate::error::CoreResult;
use crate::sphere::{Map, MaskSet};
use crate::statistics::{StatBundle, StatisticOperator, StatisticVariant};
use std::fmt;
use std::sync::Arc;

/// Multiplier applied to the template cross loss with covariance statistics.
pub const COV_CROSS_SCALE: f64 = 1e-5;

/// Weight of the pixel-domain variance-matching term.
pub const VARIANCE_MATCH_COEFFICIENT: f64 = 100.0;

/// Which part of a statistic bundle a loss compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Full,
    ZerothOrder,
}

impl Objective {
    pub fn from_zeroth_order_flag(zeroth_order_only: bool) -> Self {
        if zeroth_order_only {
            Objective::ZerothOrder
        } else {
            Objective::Full
        }
    }
}

/// The loss families composed each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossRole {
    Auto,
    TemplateCross,
    DataCross,
    VarianceMatch,
}

impl LossRole {
    pub const ALL: [LossRole; 4] = [
        LossRole::Auto,
        LossRole::TemplateCross,
        LossRole::DataCross,
        LossRole::VarianceMatch,
    ];

    /// Calibrations a term of this role is built from.
    pub fn calibrations(self) -> &'static [CalibrationKind] {
        match self {
            LossRole::Auto => &[CalibrationKind::Auto],
            LossRole::TemplateCross => &[CalibrationKind::Cross],
            LossRole::DataCross => &[CalibrationKind::Auto, CalibrationKind::Data],
            LossRole::VarianceMatch => &[],
        }
    }
}

impl fmt::Display for LossRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LossRole::Auto => "auto",
            LossRole::TemplateCross => "template-cross",
            LossRole::DataCross => "data-cross",
            LossRole::VarianceMatch => "variance-match",
        };
        f.write_str(name)
    }
}

/// How the candidate statistic is formed from the candidate map `x`.
#[derive(Debug, Clone)]
pub enum CandidateModel {
    /// `Op(x, x, auto)`
    Auto,
    /// `Op(T, x, cross)`
    TemplateCross { template: Arc<Map> },
    /// `Op(d, x, auto) − bias`
    DataCross { data: Arc<Map>, bias: StatBundle },
}

/// Weighted distance between a candidate statistic and a fixed reference.
#[derive(Debug, Clone)]
pub struct StatisticLoss {
    model: CandidateModel,
    reference: StatBundle,
    weight: StatBundle,
    masks: Arc<MaskSet>,
    objective: Objective,
    scale: f64,
}

impl StatisticLoss {
    pub fn new(
        model: CandidateModel,
        reference: StatBundle,
        weight: StatBundle,
        masks: Arc<MaskSet>,
        objective: Objective,
    ) -> CoreResult<Self> {
        // Layouts are checked once here rather than on every evaluation.
        reference.sub(&weight)?;
        if objective == Objective::ZerothOrder {
            reference.zeroth_order()?;
        }
        Ok(Self {
            model,
            reference,
            weight,
            masks,
            objective,
            scale: 1.0,
        })
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn reference(&self) -> &StatBundle {
        &self.reference
    }

    pub fn weight(&self) -> &StatBundle {
        &self.weight
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Statistic of the candidate under this loss's physical model.
    pub fn candidate(&self, x: &Map, operator: &dyn StatisticOperator) -> CoreResult<StatBundle> {
        match &self.model {
            CandidateModel::Auto => operator.evaluate(x, None, &self.masks, true),
            CandidateModel::TemplateCross { template } => operator.evaluate(template, Some(x), &self.masks, false),
            CandidateModel::DataCross { data, bias } => operator.evaluate(data, Some(x), &self.masks, true)?.sub(bias),
        }
    }

    pub fn evaluate(&self, x: &Map, operator: &dyn StatisticOperator) -> CoreResult<f64> {
        let candidate = self.candidate(x, operator)?;
        let value = match self.objective {
            Objective::Full => self
                .weight
                .mul(&self.reference.sub(&candidate)?.square())?
                .reduce_mean()
                .reduce_sum(),
            Objective::ZerothOrder => {
                let diff = self.reference.zeroth_order()?.sub(candidate.zeroth_order()?)?;
                self.weight.zeroth_order()?.mul(&diff.square())?.abs().sum()
            }
        };
        Ok(self.scale * value)
    }
}

/// `coefficient × (mean(σ⁻²_noise × (d − x)²) − 1)²`
#[derive(Debug, Clone)]
pub struct VarianceLoss {
    data: Arc<Map>,
    inverse_noise_variance: Arc<Map>,
    coefficient: f64,
}

impl VarianceLoss {
    pub fn new(data: Arc<Map>, inverse_noise_variance: Arc<Map>) -> CoreResult<Self> {
        data.ensure_compatible(&inverse_noise_variance, "inverse noise variance map")?;
        Ok(Self {
            data,
            inverse_noise_variance,
            coefficient: VARIANCE_MATCH_COEFFICIENT,
        })
    }

    pub fn evaluate(&self, x: &Map) -> CoreResult<f64> {
        self.data.ensure_compatible(x, "variance-matching candidate")?;
        let total: f64 = self
            .data
            .values()
            .iter()
            .zip(x.values())
            .zip(self.inverse_noise_variance.values())
            .map(|((d, x), w)| w * (d - x) * (d - x))
            .sum();
        let ratio = total / x.len() as f64;
        Ok(self.coefficient * (ratio - 1.0).powi(2))
    }
}

/// One scalar loss closure over candidate maps.
#[derive(Debug, Clone)]
pub enum LossTerm {
    Statistic { role: LossRole, loss: StatisticLoss },
    Variance(VarianceLoss),
}

impl LossTerm {
    pub fn role(&self) -> LossRole {
        match self {
            LossTerm::Statistic { role, .. } => *role,
            LossTerm::Variance(_) => LossRole::VarianceMatch,
        }
    }

    pub fn name(&self) -> String {
        self.role().to_string()
    }

    /// Loss value at `x`. Pure: captured data is never modified.
    pub fn evaluate(&self, x: &Map, operator: &dyn StatisticOperator) -> CoreResult<f64> {
        match self {
            LossTerm::Statistic { loss, .. } => loss.evaluate(x, operator),
            LossTerm::Variance(loss) => loss.evaluate(x),
        }
    }
}

/// Sum of every term at `x`.
pub fn total_loss(terms: &[LossTerm], x: &Map, operator: &dyn StatisticOperator) -> CoreResult<f64> {
    terms
        .iter()
        .try_fold(0.0, |acc, term| -> CoreResult<f64> { Ok(acc + term.evaluate(x, operator)?) })
}

/// Fixed data shared by every loss of a run.
#[derive(Debug, Clone)]
pub struct LossComposer {
    pub masks: Arc<MaskSet>,
    pub data: Arc<Map>,
    pub template: Arc<Map>,
    pub inverse_noise_variance: Arc<Map>,
    /// Auto statistic of the two half-split data maps.
    pub data_reference: StatBundle,
    /// Cross statistic of the template with the data map.
    pub cross_reference: StatBundle,
    pub variant: StatisticVariant,
}

impl LossComposer {
    pub fn auto_loss(&self, auto: &NoiseCalibration, objective: Objective) -> CoreResult<LossTerm> {
        let loss = StatisticLoss::new(
            CandidateModel::Auto,
            self.data_reference.sub(&auto.bias)?,
            auto.inverse_variance.clone(),
            Arc::clone(&self.masks),
            objective,
        )?;
        Ok(LossTerm::Statistic {
            role: LossRole::Auto,
            loss,
        })
    }

    pub fn template_loss(&self, cross: &NoiseCalibration, objective: Objective) -> CoreResult<LossTerm> {
        let mut loss = StatisticLoss::new(
            CandidateModel::TemplateCross {
                template: Arc::clone(&self.template),
            },
            self.cross_reference.sub(&cross.bias)?,
            cross.inverse_variance.clone(),
            Arc::clone(&self.masks),
            objective,
        )?;
        if self.variant == StatisticVariant::Cov {
            loss = loss.with_scale(COV_CROSS_SCALE);
        }
        Ok(LossTerm::Statistic {
            role: LossRole::TemplateCross,
            loss,
        })
    }

    pub fn data_loss(
        &self,
        auto: &NoiseCalibration,
        data: &NoiseCalibration,
        objective: Objective,
    ) -> CoreResult<LossTerm> {
        let loss = StatisticLoss::new(
            CandidateModel::DataCross {
                data: Arc::clone(&self.data),
                bias: data.bias.clone(),
            },
            self.data_reference.sub(&auto.bias)?,
            data.inverse_variance.clone(),
            Arc::clone(&self.masks),
            objective,
        )?;
        Ok(LossTerm::Statistic {
            role: LossRole::DataCross,
            loss,
        })
    }

    pub fn variance_loss(&self) -> CoreResult<LossTerm> {
        Ok(LossTerm::Variance(VarianceLoss::new(
            Arc::clone(&self.data),
            Arc::clone(&self.inverse_noise_variance),
        )?))
    }

    /// Builds one term per role, in the order given.
    pub fn compose(
        &self,
        roles: &[LossRole],
        calibrations: &CalibrationSet,
        objective: Objective,
    ) -> CoreResult<Vec<LossTerm>> {
        roles
            .iter()
            .map(|role| match role {
                LossRole::Auto => self.auto_loss(calibrations.require(CalibrationKind::Auto)?, objective),
                LossRole::TemplateCross => {
                    self.template_loss(calibrations.require(CalibrationKind::Cross)?, objective)
                }
                LossRole::DataCross => self.data_loss(
                    calibrations.require(CalibrationKind::Auto)?,
                    calibrations.require(CalibrationKind::Data)?,
                    objective,
                ),
                LossRole::VarianceMatch => self.variance_loss(),
            })
            .collect()
    }
}
