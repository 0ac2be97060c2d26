//! Spherical maps in nested pixel ordering.
//!
//! A map at resolution `nside` holds `12·nside²` pixels. Pixels are stored in
//! nested order, so the `4^k` children of a coarse pixel occupy one contiguous
//! block; every resolution change in this crate relies on that layout.

pub mod downsample;
pub mod mask;

pub use downsample::{degrade, downsample, upsample};
pub use mask::MaskSet;

use crate::error::{CoreError, CoreResult, shape_mismatch};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest resolution accepted anywhere in the crate.
pub const MAX_NSIDE: u32 = 8192;

/// Smallest working resolution a reconstruction may run at.
pub const MIN_WORKING_NSIDE: u32 = 2;

/// Largest working resolution a reconstruction may run at.
pub const MAX_WORKING_NSIDE: u32 = 256;

/// Resolution level of a nested spherical pixelization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Nside(u32);

impl Nside {
    /// Creates a resolution, rejecting values that are not powers of two.
    pub fn new(nside: u32) -> CoreResult<Self> {
        if nside == 0 || !nside.is_power_of_two() || nside > MAX_NSIDE {
            return Err(CoreError::InvalidResolution(nside));
        }
        Ok(Self(nside))
    }

    /// Creates a resolution valid for a reconstruction run (`2..=256`).
    pub fn working(nside: u32) -> CoreResult<Self> {
        let resolved = Self::new(nside)?;
        if !(MIN_WORKING_NSIDE..=MAX_WORKING_NSIDE).contains(&nside) {
            return Err(CoreError::Config(format!(
                "nside should be a power of 2 in [{MIN_WORKING_NSIDE},...,{MAX_WORKING_NSIDE}], got {nside}"
            )));
        }
        Ok(resolved)
    }

    /// Infers the resolution of an array holding `len` pixels.
    pub fn from_npix(len: usize) -> CoreResult<Self> {
        if len == 0 || len % 12 != 0 {
            return Err(shape_mismatch("pixel count (not a multiple of 12)", 12, len));
        }
        let nside = ((len / 12) as f64).sqrt().round() as usize;
        if 12 * nside * nside != len {
            return Err(shape_mismatch("pixel count (not 12·nside²)", 12 * nside * nside, len));
        }
        Self::new(nside as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of pixels, `12·nside²`.
    pub fn npix(self) -> usize {
        12 * (self.0 as usize) * (self.0 as usize)
    }

    /// Next coarser resolution, or `None` at `nside = 1`.
    pub fn coarser(self) -> Option<Nside> {
        (self.0 > 1).then(|| Nside(self.0 / 2))
    }

    /// Number of halvings separating this resolution from `nside = 1`.
    pub fn depth(self) -> u32 {
        self.0.trailing_zeros()
    }
}

impl TryFrom<u32> for Nside {
    type Error = CoreError;

    fn try_from(value: u32) -> CoreResult<Self> {
        Nside::new(value)
    }
}

impl From<Nside> for u32 {
    fn from(value: Nside) -> Self {
        value.0
    }
}

impl fmt::Display for Nside {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A real-valued map over every pixel of one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    nside: Nside,
    values: Vec<f64>,
}

impl Map {
    /// Wraps `values`, checking that their count matches `nside`.
    pub fn new(nside: Nside, values: Vec<f64>) -> CoreResult<Self> {
        if values.len() != nside.npix() {
            return Err(shape_mismatch(format!("map at nside {nside}"), nside.npix(), values.len()));
        }
        Ok(Self { nside, values })
    }

    /// Wraps `values`, inferring the resolution from their count.
    pub fn from_values(values: Vec<f64>) -> CoreResult<Self> {
        let nside = Nside::from_npix(values.len())?;
        Ok(Self { nside, values })
    }

    pub fn zeros(nside: Nside) -> Self {
        Self::constant(nside, 0.0)
    }

    pub fn constant(nside: Nside, value: f64) -> Self {
        Self {
            nside,
            values: vec![value; nside.npix()],
        }
    }

    pub fn nside(&self) -> Nside {
        self.nside
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Fails unless `other` lives at the same resolution.
    pub fn ensure_compatible(&self, other: &Map, context: &str) -> CoreResult<()> {
        if self.nside != other.nside {
            return Err(shape_mismatch(context, self.len(), other.len()));
        }
        Ok(())
    }

    /// Pixel-wise combination of two maps at the same resolution.
    pub fn zip_with(&self, other: &Map, f: impl Fn(f64, f64) -> f64) -> CoreResult<Map> {
        self.ensure_compatible(other, "pixel-wise map operation")?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Map {
            nside: self.nside,
            values,
        })
    }

    pub fn add(&self, other: &Map) -> CoreResult<Map> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Map) -> CoreResult<Map> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Map) -> CoreResult<Map> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Applies `f` to every pixel.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> Map {
        Map {
            nside: self.nside,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn scale(&self, factor: f64) -> Map {
        self.map_values(|v| v * factor)
    }

    /// Pixel-wise mean of two maps.
    pub fn midpoint(&self, other: &Map) -> CoreResult<Map> {
        self.zip_with(other, |a, b| (a + b) / 2.0)
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.len() as f64
    }

    /// Population standard deviation of the pixel values.
    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.len() as f64;
        var.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nside_validation() {
        assert!(Nside::new(0).is_err());
        assert!(Nside::new(3).is_err());
        assert!(Nside::new(12).is_err());
        assert_eq!(Nside::new(1).unwrap().npix(), 12);
        assert_eq!(Nside::new(8).unwrap().npix(), 768);
        assert_eq!(Nside::new(16).unwrap().depth(), 4);
    }

    #[test]
    fn test_working_range() {
        assert!(Nside::working(1).is_err());
        assert!(Nside::working(2).is_ok());
        assert!(Nside::working(256).is_ok());
        assert!(Nside::working(512).is_err());
        assert!(matches!(Nside::working(6), Err(CoreError::InvalidResolution(6))));
    }

    #[test]
    fn test_from_npix() {
        assert_eq!(Nside::from_npix(48).unwrap().get(), 2);
        assert!(Nside::from_npix(47).is_err());
        assert!(Nside::from_npix(12 * 9).is_err()); // nside 3
    }

    #[test]
    fn test_map_arithmetic_checks_resolution() {
        let a = Map::constant(Nside::new(2).unwrap(), 1.0);
        let b = Map::constant(Nside::new(4).unwrap(), 1.0);
        assert!(a.add(&b).is_err());

        let c = Map::constant(Nside::new(2).unwrap(), 3.0);
        let mid = a.midpoint(&c).unwrap();
        assert!(mid.values().iter().all(|&v| v == 2.0));
        assert_eq!(mid.std(), 0.0);
    }

    #[test]
    fn test_nside_serde_rejects_invalid() {
        let parsed: Result<Nside, _> = serde_json::from_str("6");
        assert!(parsed.is_err());
        let ok: Nside = serde_json::from_str("64").unwrap();
        assert_eq!(ok.get(), 64);
    }
}
