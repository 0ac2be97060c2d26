// ============================================================================
// focus-core/src/noise/mod.rs
// ============================================================================
//
// NOISE: Monte-Carlo noise ensembles
//
// A run carries three parallel ensembles of noise realizations: the primary
// ensemble (noise of the full data map) and one ensemble per half split.
// They are drawn or loaded once, normalized once, and only read afterwards.
//
// KEY COMPONENTS:
// - NoiseEnsemble: ordered realizations at one resolution
// - NoiseSet: the three parallel ensembles, equal realization count enforced
// - gaussian_map: seeded white-noise map used by ensembles and simulations

use crate::error::{CoreError, CoreResult};
use crate::sphere::{Map, Nside};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Draws one white Gaussian map with standard deviation `sigma`.
pub fn gaussian_map(nside: Nside, sigma: f64, rng: &mut StdRng) -> CoreResult<Map> {
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| CoreError::Config(format!("invalid noise level {sigma}: {e}")))?;
    Map::new(nside, (0..nside.npix()).map(|_| normal.sample(rng)).collect())
}

/// Ordered noise realizations `0..N-1`, all at the same resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseEnsemble {
    label: String,
    realizations: Vec<Map>,
}

impl NoiseEnsemble {
    pub fn new(label: impl Into<String>, realizations: Vec<Map>) -> CoreResult<Self> {
        let label = label.into();
        let Some(first) = realizations.first() else {
            return Err(CoreError::EmptyEnsemble(label));
        };
        let nside = first.nside();
        for realization in &realizations[1..] {
            first.ensure_compatible(realization, &format!("noise ensemble '{label}' at nside {nside}"))?;
        }
        Ok(Self { label, realizations })
    }

    /// `count` realizations that are identically zero.
    pub fn zeros(label: impl Into<String>, nside: Nside, count: usize) -> CoreResult<Self> {
        Self::new(label, vec![Map::zeros(nside); count])
    }

    /// `count` seeded white-noise realizations.
    pub fn gaussian(label: impl Into<String>, nside: Nside, count: usize, sigma: f64, seed: u64) -> CoreResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let realizations = (0..count)
            .map(|_| gaussian_map(nside, sigma, &mut rng))
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(label, realizations)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.realizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realizations.is_empty()
    }

    pub fn nside(&self) -> Nside {
        self.realizations[0].nside()
    }

    pub fn realizations(&self) -> &[Map] {
        &self.realizations
    }

    pub fn get(&self, index: usize) -> Option<&Map> {
        self.realizations.get(index)
    }

    pub fn scale(&self, factor: f64) -> NoiseEnsemble {
        self.with_realizations(self.realizations.iter().map(|n| n.scale(factor)).collect())
    }

    /// Removes from realization `k` the mean of `reference[k]`.
    pub fn subtract_means_of(&self, reference: &NoiseEnsemble) -> CoreResult<NoiseEnsemble> {
        ensure_same_count(self, reference)?;
        let realizations = self
            .realizations
            .iter()
            .zip(&reference.realizations)
            .map(|(n, r)| {
                let mean = r.mean();
                n.map_values(|v| v - mean)
            })
            .collect();
        Ok(self.with_realizations(realizations))
    }

    /// Removes from every realization its own mean.
    pub fn centered(&self) -> NoiseEnsemble {
        self.with_realizations(
            self.realizations
                .iter()
                .map(|n| {
                    let mean = n.mean();
                    n.map_values(|v| v - mean)
                })
                .collect(),
        )
    }

    /// Per-pixel inverse noise variance `1 / mean_k(n_k²)`.
    pub fn inverse_variance_map(&self) -> Map {
        let count = self.len() as f64;
        let mut power = Map::zeros(self.nside());
        for realization in &self.realizations {
            for (acc, v) in power.values_mut().iter_mut().zip(realization.values()) {
                *acc += v * v;
            }
        }
        power.map_values(|p| count / p)
    }

    fn with_realizations(&self, realizations: Vec<Map>) -> NoiseEnsemble {
        NoiseEnsemble {
            label: self.label.clone(),
            realizations,
        }
    }
}

fn ensure_same_count(left: &NoiseEnsemble, right: &NoiseEnsemble) -> CoreResult<()> {
    if left.len() != right.len() {
        return Err(CoreError::EnsembleMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

/// Primary and half-split noise ensembles of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSet {
    pub full: NoiseEnsemble,
    pub half1: NoiseEnsemble,
    pub half2: NoiseEnsemble,
}

impl NoiseSet {
    pub fn new(full: NoiseEnsemble, half1: NoiseEnsemble, half2: NoiseEnsemble) -> CoreResult<Self> {
        ensure_same_count(&full, &half1)?;
        ensure_same_count(&full, &half2)?;
        if full.nside() != half1.nside() || full.nside() != half2.nside() {
            return Err(CoreError::Config(format!(
                "noise ensembles disagree on resolution: {}, {}, {}",
                full.nside(),
                half1.nside(),
                half2.nside()
            )));
        }
        Ok(Self { full, half1, half2 })
    }

    pub fn zeros(nside: Nside, count: usize) -> CoreResult<Self> {
        Self::new(
            NoiseEnsemble::zeros("noise", nside, count)?,
            NoiseEnsemble::zeros("noise1", nside, count)?,
            NoiseEnsemble::zeros("noise2", nside, count)?,
        )
    }

    /// Seeded half-split noise with per-split level `sigma·√2`; the primary
    /// realization `k` is the average of the two half-split realizations.
    pub fn gaussian(nside: Nside, count: usize, sigma: f64, seed: u64) -> CoreResult<Self> {
        let split_sigma = sigma * std::f64::consts::SQRT_2;
        let half1 = NoiseEnsemble::gaussian("noise1", nside, count, split_sigma, seed)?;
        let half2 = NoiseEnsemble::gaussian("noise2", nside, count, split_sigma, seed.wrapping_add(1))?;
        let full = half1
            .realizations()
            .iter()
            .zip(half2.realizations())
            .map(|(a, b)| a.midpoint(b))
            .collect::<CoreResult<Vec<_>>>()?;
        Self::new(NoiseEnsemble::new("noise", full)?, half1, half2)
    }

    /// Number of realizations shared by the three ensembles.
    pub fn len(&self) -> usize {
        self.full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }

    pub fn nside(&self) -> Nside {
        self.full.nside()
    }

    /// Rescales every ensemble by `amplitude` and removes realization means.
    ///
    /// The half splits are centered on the mean of the matching primary
    /// realization, which is itself centered last.
    pub fn normalized(&self, amplitude: f64) -> CoreResult<NoiseSet> {
        let full = self.full.scale(amplitude);
        let half1 = self.half1.scale(amplitude).subtract_means_of(&full)?;
        let half2 = self.half2.scale(amplitude).subtract_means_of(&full)?;
        Ok(NoiseSet {
            full: full.centered(),
            half1,
            half2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nside(n: u32) -> Nside {
        Nside::new(n).unwrap()
    }

    #[test]
    fn test_empty_and_mismatched_ensembles_are_rejected() {
        assert!(matches!(NoiseEnsemble::new("n", Vec::new()), Err(CoreError::EmptyEnsemble(_))));
        let result = NoiseSet::new(
            NoiseEnsemble::zeros("noise", nside(2), 3).unwrap(),
            NoiseEnsemble::zeros("noise1", nside(2), 3).unwrap(),
            NoiseEnsemble::zeros("noise2", nside(2), 2).unwrap(),
        );
        assert!(matches!(result, Err(CoreError::EnsembleMismatch { left: 3, right: 2 })));
    }

    #[test]
    fn test_gaussian_is_seeded() {
        let a = NoiseSet::gaussian(nside(2), 4, 0.5, 7).unwrap();
        let b = NoiseSet::gaussian(nside(2), 4, 0.5, 7).unwrap();
        let c = NoiseSet::gaussian(nside(2), 4, 0.5, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn test_normalized_realizations_have_zero_mean() {
        let set = NoiseSet::gaussian(nside(4), 3, 1.0, 11).unwrap();
        let normalized = set.normalized(2.0).unwrap();
        for realization in normalized.full.realizations() {
            assert!(realization.mean().abs() < 1e-12);
        }
        // Half splits are centered on the primary realization mean
        let raw_mean = set.full.get(0).unwrap().mean() * 2.0;
        let expected = set.half1.get(0).unwrap().mean() * 2.0 - raw_mean;
        assert!((normalized.half1.get(0).unwrap().mean() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_variance_map() {
        let n = nside(1);
        let ensemble = NoiseEnsemble::new(
            "noise",
            vec![Map::constant(n, 1.0), Map::constant(n, -3.0)],
        )
        .unwrap();
        let inv = ensemble.inverse_variance_map();
        assert!(inv.values().iter().all(|&v| (v - 0.2).abs() < 1e-12));
    }
}
