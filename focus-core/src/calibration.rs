// ============================================================================
// focus-core/src/calibration.rs
// ============================================================================
//
// NOISE BIAS CALIBRATION: Monte-Carlo bias and inverse-variance estimation
//
// For one statistic model, the calibrator evaluates the operator on the
// noise-free base maps (R) and on the same maps with noise realization k
// injected on the sides the model calls for (S_k). It then reports
//
//   bias             = mean_k(S_k - R)
//   inverse_variance = 1 / (mean_k((S_k - R)²) - bias²)
//
// Realizations are evaluated in parallel but folded strictly in index order,
// so repeated calls are bit-identical. Zero variance yields non-finite
// weights, which are passed through untouched.
//
// KEY COMPONENTS:
// - CalibrationKind: the three calibrated statistic models
// - CalibrationPlan: base maps, injected noise and evaluation mode
// - calibrate: the calibrator itself
// - BiasTracker: running init-bias and the BIAS MEAN/VAR/DVAR diagnostics

use crate::error::{CoreError, CoreResult};
use crate::noise::NoiseEnsemble;
use crate::sphere::{Map, MaskSet};
use crate::statistics::{StatBundle, StatisticOperator};
use log::{debug, info};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fmt;

/// The statistic models whose noise bias is calibrated each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationKind {
    /// Half-split auto statistic, noise on both sides.
    Auto,
    /// Template cross statistic, noise on the candidate side.
    Cross,
    /// Data cross statistic, noise on one data side.
    Data,
}

impl CalibrationKind {
    pub const ALL: [CalibrationKind; 3] = [CalibrationKind::Auto, CalibrationKind::Cross, CalibrationKind::Data];

    /// One-based index used in artifact names and diagnostics.
    pub fn index(self) -> usize {
        match self {
            CalibrationKind::Auto => 1,
            CalibrationKind::Cross => 2,
            CalibrationKind::Data => 3,
        }
    }
}

impl fmt::Display for CalibrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationKind::Auto => "auto",
            CalibrationKind::Cross => "cross",
            CalibrationKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// Inputs of one calibration.
#[derive(Debug, Clone)]
pub struct CalibrationPlan<'a> {
    pub kind: CalibrationKind,
    pub left: &'a Map,
    pub right: Option<&'a Map>,
    pub left_noise: Option<&'a NoiseEnsemble>,
    /// Ignored when `right` is `None`.
    pub right_noise: Option<&'a NoiseEnsemble>,
    pub auto: bool,
    /// Precomputed `R`, shared with another calibration of the same base maps.
    pub baseline: Option<StatBundle>,
}

impl<'a> CalibrationPlan<'a> {
    /// Half-split model: `Op(h1 + n1_k, h2 + n2_k, auto)`.
    pub fn auto(half1: &'a Map, half2: &'a Map, noise1: &'a NoiseEnsemble, noise2: &'a NoiseEnsemble) -> Self {
        Self {
            kind: CalibrationKind::Auto,
            left: half1,
            right: Some(half2),
            left_noise: Some(noise1),
            right_noise: Some(noise2),
            auto: true,
            baseline: None,
        }
    }

    /// Template model: `Op(T, u + n_k, cross)`.
    pub fn template_cross(template: &'a Map, signal: &'a Map, noise: &'a NoiseEnsemble) -> Self {
        Self {
            kind: CalibrationKind::Cross,
            left: template,
            right: Some(signal),
            left_noise: None,
            right_noise: Some(noise),
            auto: false,
            baseline: None,
        }
    }

    /// Data model: `Op(h1 + n_k, h2, auto)`.
    pub fn data(half1: &'a Map, half2: &'a Map, noise: &'a NoiseEnsemble) -> Self {
        Self {
            kind: CalibrationKind::Data,
            left: half1,
            right: Some(half2),
            left_noise: Some(noise),
            right_noise: None,
            auto: true,
            baseline: None,
        }
    }

    pub fn with_baseline(mut self, baseline: StatBundle) -> Self {
        self.baseline = Some(baseline);
        self
    }

    fn realization_count(&self) -> CoreResult<usize> {
        let right_noise = self.right.and(self.right_noise);
        match (self.left_noise, right_noise) {
            (Some(left), Some(right)) if left.len() != right.len() => Err(CoreError::EnsembleMismatch {
                left: left.len(),
                right: right.len(),
            }),
            (Some(noise), _) | (None, Some(noise)) if noise.is_empty() => {
                Err(CoreError::EmptyEnsemble(noise.label().to_string()))
            }
            (Some(noise), _) | (None, Some(noise)) => Ok(noise.len()),
            (None, None) => Err(CoreError::EmptyEnsemble(format!("{} calibration", self.kind))),
        }
    }
}

/// Outcome of one calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseCalibration {
    pub kind: CalibrationKind,
    /// `R`, the statistic of the noise-free base maps.
    pub baseline: StatBundle,
    pub bias: StatBundle,
    pub inverse_variance: StatBundle,
    pub realizations: usize,
}

fn perturbed<'m>(base: &'m Map, noise: Option<&NoiseEnsemble>, index: usize) -> CoreResult<Cow<'m, Map>> {
    match noise {
        None => Ok(Cow::Borrowed(base)),
        Some(ensemble) => {
            let realization = ensemble
                .get(index)
                .ok_or_else(|| CoreError::EmptyEnsemble(ensemble.label().to_string()))?;
            Ok(Cow::Owned(base.add(realization)?))
        }
    }
}

/// Estimates the noise bias and inverse variance of one statistic model.
pub fn calibrate(
    operator: &dyn StatisticOperator,
    masks: &MaskSet,
    plan: &CalibrationPlan<'_>,
) -> CoreResult<NoiseCalibration> {
    let count = plan.realization_count()?;
    let baseline = match &plan.baseline {
        Some(baseline) => baseline.clone(),
        None => operator.evaluate(plan.left, plan.right, masks, plan.auto)?,
    };
    debug!(
        "Calibrating {} bias over {} realizations with {}",
        plan.kind,
        count,
        operator.name()
    );

    let deviations = (0..count)
        .into_par_iter()
        .map(|k| {
            let left = perturbed(plan.left, plan.left_noise, k)?;
            let right = match plan.right {
                Some(right) => Some(perturbed(right, plan.right_noise, k)?),
                None => None,
            };
            operator
                .evaluate(&left, right.as_deref(), masks, plan.auto)?
                .sub(&baseline)
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let (first, rest) = deviations
        .split_first()
        .ok_or_else(|| CoreError::EmptyEnsemble(format!("{} calibration", plan.kind)))?;
    let (sum, sum_sq) = rest.iter().try_fold(
        (first.clone(), first.square()),
        |(sum, sum_sq), deviation| -> CoreResult<_> { Ok((sum.add(deviation)?, sum_sq.add(&deviation.square())?)) },
    )?;

    let norm = 1.0 / count as f64;
    let bias = sum.scale(norm);
    let variance = sum_sq.scale(norm).sub(&bias.square())?;

    Ok(NoiseCalibration {
        kind: plan.kind,
        baseline,
        bias,
        inverse_variance: variance.recip(),
        realizations: count,
    })
}

/// Calibrations computed by one worker in one iteration.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSet {
    entries: Vec<NoiseCalibration>,
}

impl CalibrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a calibration, replacing any earlier one of the same kind.
    pub fn insert(&mut self, calibration: NoiseCalibration) {
        self.entries.retain(|c| c.kind != calibration.kind);
        self.entries.push(calibration);
    }

    pub fn get(&self, kind: CalibrationKind) -> Option<&NoiseCalibration> {
        self.entries.iter().find(|c| c.kind == kind)
    }

    pub fn require(&self, kind: CalibrationKind) -> CoreResult<&NoiseCalibration> {
        self.get(kind)
            .ok_or_else(|| CoreError::Worker(format!("the {kind} calibration was not computed by this worker")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoiseCalibration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Diagnostic emitted when a bias is observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiasReport {
    /// First observation: mean and spread of the bias coefficients.
    Initial { mean: f64, std: f64 },
    /// Later observations: spread of the bias around the running init-bias.
    Delta { std: f64 },
}

/// Running mean of the bias of every calibration kind across iterations.
#[derive(Debug, Clone, Default)]
pub struct BiasTracker {
    running: [Option<(StatBundle, usize)>; 3],
}

impl BiasTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current init-bias of `kind`, if observed at least once.
    pub fn init_bias(&self, kind: CalibrationKind) -> Option<&StatBundle> {
        self.running[kind.index() - 1].as_ref().map(|(bias, _)| bias)
    }

    /// Logs the diagnostic for `calibration` and folds its bias into the running mean.
    pub fn observe(&mut self, calibration: &NoiseCalibration) -> CoreResult<BiasReport> {
        let index = calibration.kind.index();
        let slot = &mut self.running[index - 1];
        let bias = &calibration.bias;
        let (report, next) = match slot.take() {
            None => {
                let report = BiasReport::Initial {
                    mean: bias.mean(),
                    std: bias.std(),
                };
                (report, (bias.clone(), 1))
            }
            Some((running, seen)) => {
                let delta = bias.sub(&running)?;
                let report = BiasReport::Delta { std: delta.std() };
                let updated = running.add(&delta.scale(1.0 / (seen + 1) as f64))?;
                (report, (updated, seen + 1))
            }
        };
        *slot = Some(next);

        match report {
            BiasReport::Initial { mean, std } => {
                info!("BIAS MEAN {index} {mean:.6e}");
                info!("BIAS VAR {index} {std:.6e}");
            }
            BiasReport::Delta { std } => info!("BIAS DVAR {index} {std:.6e}"),
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::Nside;
    use crate::statistics::{ScaleMomentOperator, StatisticVariant};

    fn setup() -> (ScaleMomentOperator, MaskSet, Map, Map) {
        let n = Nside::new(2).unwrap();
        let op = ScaleMomentOperator::new(StatisticVariant::Cov, 3).unwrap();
        let a = Map::new(n, (0..n.npix()).map(|p| (p as f64 * 0.7).cos()).collect()).unwrap();
        let b = a.scale(0.9);
        (op, MaskSet::uniform(n), a, b)
    }

    #[test]
    fn test_noise_free_plan_is_rejected() {
        let (op, masks, a, b) = setup();
        let noise = NoiseEnsemble::zeros("n", a.nside(), 1).unwrap();
        let mut plan = CalibrationPlan::data(&a, &b, &noise);
        plan.left_noise = None;
        assert!(matches!(calibrate(&op, &masks, &plan), Err(CoreError::EmptyEnsemble(_))));
    }

    #[test]
    fn test_mismatched_sides_are_rejected() {
        let (op, masks, a, b) = setup();
        let n1 = NoiseEnsemble::zeros("noise1", a.nside(), 3).unwrap();
        let n2 = NoiseEnsemble::zeros("noise2", a.nside(), 2).unwrap();
        let plan = CalibrationPlan::auto(&a, &b, &n1, &n2);
        assert!(matches!(
            calibrate(&op, &masks, &plan),
            Err(CoreError::EnsembleMismatch { left: 3, right: 2 })
        ));
    }

    #[test]
    fn test_single_realization_has_zero_variance() {
        let (op, masks, a, b) = setup();
        let noise = NoiseEnsemble::gaussian("noise", a.nside(), 1, 0.3, 5).unwrap();
        let result = calibrate(&op, &masks, &CalibrationPlan::data(&a, &b, &noise)).unwrap();
        assert_eq!(result.realizations, 1);
        assert!(result.bias.reduce_sum().abs() > 0.0);
        // one sample: the biased variance estimate is exactly zero
        for channel in result.inverse_variance.channels() {
            assert!(channel.values().iter().all(|v| !v.is_finite()));
        }
    }

    #[test]
    fn test_shared_baseline_is_used() {
        let (op, masks, a, b) = setup();
        let noise = NoiseEnsemble::gaussian("noise", a.nside(), 2, 0.3, 5).unwrap();
        let baseline = op.evaluate(&a, Some(&b), &masks, true).unwrap();
        let shared = CalibrationPlan::data(&a, &b, &noise).with_baseline(baseline.clone());
        let fresh = CalibrationPlan::data(&a, &b, &noise);
        assert_eq!(
            calibrate(&op, &masks, &shared).unwrap(),
            calibrate(&op, &masks, &fresh).unwrap()
        );
    }

    #[test]
    fn test_tracker_reports_initial_then_delta() {
        let (op, masks, a, b) = setup();
        let noise = NoiseEnsemble::gaussian("noise", a.nside(), 3, 0.3, 9).unwrap();
        let calibration = calibrate(&op, &masks, &CalibrationPlan::data(&a, &b, &noise)).unwrap();

        let mut tracker = BiasTracker::new();
        assert!(matches!(tracker.observe(&calibration).unwrap(), BiasReport::Initial { .. }));
        assert_eq!(tracker.observe(&calibration).unwrap(), BiasReport::Delta { std: 0.0 });
        assert_eq!(tracker.init_bias(CalibrationKind::Data), Some(&calibration.bias));
        assert!(tracker.init_bias(CalibrationKind::Auto).is_none());
    }
}
