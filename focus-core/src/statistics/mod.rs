// ============================================================================
// focus-core/src/statistics/mod.rs
// ============================================================================
//
// STATISTICS: Forward statistic operators and their outputs
//
// A statistic operator turns one or two maps into a StatBundle of higher-order
// summary coefficients, weighted by every mask of a MaskSet. The rest of the
// crate only ever sees the StatisticOperator trait and StatBundle values.
//
// KEY COMPONENTS:
// - StatisticOperator: the operator seam (evaluate + name)
// - StatisticVariant: scattering or scattering-covariance statistics
// - StatBundle / Channel: immutable coefficient records
// - ScaleMomentOperator: multiscale moment operator shipped with the crate

pub mod bundle;
pub mod scale_moments;

pub use bundle::{Channel, StatBundle, ZEROTH_ORDER};
pub use scale_moments::ScaleMomentOperator;

use crate::error::{CoreError, CoreResult};
use crate::sphere::{Map, MaskSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Forward statistic operator.
///
/// `evaluate(x, None, masks, true)` is the self statistic of `x`.
/// `evaluate(x, Some(y), masks, auto)` is the joint statistic of `x` and `y`;
/// with `auto` set the result is symmetric in its two arguments.
///
/// Implementations must be pure: equal inputs give bit-identical bundles.
pub trait StatisticOperator: Send + Sync {
    fn evaluate(&self, map: &Map, map2: Option<&Map>, masks: &MaskSet, auto: bool) -> CoreResult<StatBundle>;

    /// Short human-readable identifier used in logs.
    fn name(&self) -> &str;
}

/// Family of statistics computed by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticVariant {
    /// Scattering coefficients (first and second order moments).
    #[default]
    Scat,
    /// Scattering covariance (moments plus cross-scale covariances).
    Cov,
}

impl StatisticVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            StatisticVariant::Scat => "scat",
            StatisticVariant::Cov => "cov",
        }
    }
}

impl fmt::Display for StatisticVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatisticVariant {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scat" => Ok(StatisticVariant::Scat),
            "cov" | "scatcov" => Ok(StatisticVariant::Cov),
            other => Err(CoreError::Config(format!(
                "unknown statistic variant '{other}' (expected 'scat' or 'cov')"
            ))),
        }
    }
}

/// Scale weight applied per pyramid level for a given kernel size.
pub fn scale_weight(kernel_size: u32) -> CoreResult<f64> {
    match kernel_size {
        3 => Ok(1.2),
        5 => Ok(1.0),
        other => Err(CoreError::Config(format!(
            "kernel size must be 3 or 5, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_parsing() {
        assert_eq!("scat".parse::<StatisticVariant>().unwrap(), StatisticVariant::Scat);
        assert_eq!("COV".parse::<StatisticVariant>().unwrap(), StatisticVariant::Cov);
        assert!("wavelet".parse::<StatisticVariant>().is_err());
        assert_eq!(StatisticVariant::Cov.to_string(), "cov");
    }

    #[test]
    fn test_scale_weight() {
        assert_eq!(scale_weight(3).unwrap(), 1.2);
        assert_eq!(scale_weight(5).unwrap(), 1.0);
        assert!(scale_weight(4).is_err());
    }
}
