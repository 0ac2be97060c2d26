//! Statistic bundles: immutable, composable records of named coefficient channels.
//!
//! Every arithmetic operation returns a new bundle. Binary operations require
//! both operands to share the same channel layout (same names, same order,
//! same lengths).

use crate::error::{CoreError, CoreResult, artifact_error};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Name of the zeroth-order (power) channel.
pub const ZEROTH_ORDER: &str = "P00";

/// One named block of coefficients with its logical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    shape: Vec<usize>,
    #[serde(with = "crate::float_codec")]
    values: Vec<f64>,
}

impl Channel {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f64>) -> CoreResult<Self> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(CoreError::ChannelMismatch(format!(
                "channel '{name}' has shape {shape:?} ({expected} values) but holds {}",
                values.len()
            )));
        }
        Ok(Self { name, shape, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn check_layout(&self, other: &Channel, op: &str) -> CoreResult<()> {
        if self.name != other.name || self.values.len() != other.values.len() {
            return Err(CoreError::ChannelMismatch(format!(
                "cannot {op} channel '{}' ({} values) with '{}' ({} values)",
                self.name,
                self.values.len(),
                other.name,
                other.values.len()
            )));
        }
        Ok(())
    }

    fn zip_with(&self, other: &Channel, op: &str, f: impl Fn(f64, f64) -> f64) -> CoreResult<Channel> {
        self.check_layout(other, op)?;
        Ok(Channel {
            name: self.name.clone(),
            shape: self.shape.clone(),
            values: self.values.iter().zip(&other.values).map(|(&a, &b)| f(a, b)).collect(),
        })
    }

    fn map_values(&self, f: impl Fn(f64) -> f64) -> Channel {
        Channel {
            name: self.name.clone(),
            shape: self.shape.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn sub(&self, other: &Channel) -> CoreResult<Channel> {
        self.zip_with(other, "subtract", |a, b| a - b)
    }

    pub fn mul(&self, other: &Channel) -> CoreResult<Channel> {
        self.zip_with(other, "multiply", |a, b| a * b)
    }

    pub fn square(&self) -> Channel {
        self.map_values(|v| v * v)
    }

    pub fn abs(&self) -> Channel {
        self.map_values(f64::abs)
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        self.sum() / self.values.len() as f64
    }
}

/// Opaque statistic record produced by a [`super::StatisticOperator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatBundle {
    channels: Vec<Channel>,
}

impl StatBundle {
    pub fn new(channels: Vec<Channel>) -> CoreResult<Self> {
        if channels.is_empty() {
            return Err(CoreError::ChannelMismatch("a bundle needs at least one channel".to_string()));
        }
        for (index, channel) in channels.iter().enumerate() {
            if channels[..index].iter().any(|c| c.name == channel.name) {
                return Err(CoreError::ChannelMismatch(format!(
                    "duplicate channel name '{}'",
                    channel.name
                )));
            }
        }
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> CoreResult<&Channel> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::MissingChannel(name.to_string()))
    }

    /// The zeroth-order channel used by the reduced objective.
    pub fn zeroth_order(&self) -> CoreResult<&Channel> {
        self.channel(ZEROTH_ORDER)
    }

    /// Total number of coefficients across channels.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Channel::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn zip_with(&self, other: &StatBundle, op: &str, f: impl Fn(f64, f64) -> f64 + Copy) -> CoreResult<StatBundle> {
        if self.channels.len() != other.channels.len() {
            return Err(CoreError::ChannelMismatch(format!(
                "cannot {op} a bundle of {} channels with one of {}",
                self.channels.len(),
                other.channels.len()
            )));
        }
        let channels = self
            .channels
            .iter()
            .zip(&other.channels)
            .map(|(a, b)| a.zip_with(b, op, f))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(StatBundle { channels })
    }

    /// Applies `f` to every coefficient.
    pub fn map_values(&self, f: impl Fn(f64) -> f64 + Copy) -> StatBundle {
        StatBundle {
            channels: self.channels.iter().map(|c| c.map_values(f)).collect(),
        }
    }

    pub fn sub(&self, other: &StatBundle) -> CoreResult<StatBundle> {
        self.zip_with(other, "subtract", |a, b| a - b)
    }

    pub fn add(&self, other: &StatBundle) -> CoreResult<StatBundle> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    pub fn mul(&self, other: &StatBundle) -> CoreResult<StatBundle> {
        self.zip_with(other, "multiply", |a, b| a * b)
    }

    pub fn square(&self) -> StatBundle {
        self.map_values(|v| v * v)
    }

    pub fn abs(&self) -> StatBundle {
        self.map_values(f64::abs)
    }

    /// Element-wise reciprocal. Zero coefficients become infinite.
    pub fn recip(&self) -> StatBundle {
        self.map_values(|v| 1.0 / v)
    }

    pub fn scale(&self, factor: f64) -> StatBundle {
        self.map_values(|v| v * factor)
    }

    /// A bundle with this layout and every coefficient set to one.
    pub fn ones_like(&self) -> StatBundle {
        self.map_values(|_| 1.0)
    }

    /// Collapses every channel to its mean.
    pub fn reduce_mean(&self) -> StatBundle {
        StatBundle {
            channels: self
                .channels
                .iter()
                .map(|c| Channel {
                    name: c.name.clone(),
                    shape: vec![1],
                    values: vec![c.mean()],
                })
                .collect(),
        }
    }

    /// Sum of every coefficient in the bundle.
    pub fn reduce_sum(&self) -> f64 {
        self.channels.iter().map(Channel::sum).sum()
    }

    /// Mean over every coefficient in the bundle.
    pub fn mean(&self) -> f64 {
        self.reduce_sum() / self.len() as f64
    }

    /// Population standard deviation over every coefficient in the bundle.
    pub fn std(&self) -> f64 {
        let mean = self.mean();
        let sum_sq: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.values.iter())
            .map(|v| (v - mean).powi(2))
            .sum();
        (sum_sq / self.len() as f64).sqrt()
    }

    /// Writes the bundle as JSON. Non-finite coefficients are kept.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_vec(self)?;
        fs::write(path, json).map_err(|e| artifact_error(path, e))
    }

    /// Reads a bundle written by [`StatBundle::save`].
    pub fn load(path: &Path) -> CoreResult<StatBundle> {
        let bytes = fs::read(path).map_err(|e| artifact_error(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(p00: &[f64], s1: &[f64]) -> StatBundle {
        StatBundle::new(vec![
            Channel::new(ZEROTH_ORDER, vec![p00.len()], p00.to_vec()).unwrap(),
            Channel::new("S1", vec![1, s1.len()], s1.to_vec()).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_arithmetic_produces_new_bundles() {
        let a = bundle(&[1.0, 2.0], &[3.0, 4.0, 5.0]);
        let b = bundle(&[0.5, 0.5], &[1.0, 1.0, 1.0]);
        let diff = a.sub(&b).unwrap();
        assert_eq!(diff.zeroth_order().unwrap().values(), &[0.5, 1.5]);
        assert_eq!(diff.square().channel("S1").unwrap().values(), &[4.0, 9.0, 16.0]);
        // Operands are untouched
        assert_eq!(a.zeroth_order().unwrap().values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_reductions() {
        let a = bundle(&[1.0, 3.0], &[2.0, 2.0, 5.0]);
        let means = a.reduce_mean();
        assert_eq!(means.zeroth_order().unwrap().values(), &[2.0]);
        assert_eq!(means.channel("S1").unwrap().values(), &[3.0]);
        assert_eq!(means.reduce_sum(), 5.0);
        assert_eq!(a.reduce_sum(), 13.0);
        assert!((a.mean() - 2.6).abs() < 1e-12);
    }

    #[test]
    fn test_layout_mismatch_is_an_error() {
        let a = bundle(&[1.0, 3.0], &[2.0, 2.0, 5.0]);
        let b = bundle(&[1.0], &[2.0, 2.0, 5.0]);
        assert!(matches!(a.sub(&b), Err(CoreError::ChannelMismatch(_))));
        assert!(Channel::new("x", vec![2, 2], vec![0.0; 3]).is_err());
    }

    #[test]
    fn test_recip_of_zero_is_not_finite() {
        let zero = bundle(&[0.0, 0.0], &[0.0, 0.0, 0.0]);
        assert!(zero.recip().channels().iter().all(|c| c.values().iter().all(|v| !v.is_finite())));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        let a = bundle(&[1.25, -3.0], &[2.0, 0.5, 5.0]);
        a.save(&path).unwrap();
        assert_eq!(StatBundle::load(&path).unwrap(), a);
        assert!(StatBundle::load(&dir.path().join("missing.json")).is_err());

        let weights = bundle(&[0.0, 2.0], &[0.0, -0.0, 4.0]).recip();
        let weights_path = dir.path().join("weights.json");
        weights.save(&weights_path).unwrap();
        let back = StatBundle::load(&weights_path).unwrap();
        assert_eq!(back.zeroth_order().unwrap().values(), &[f64::INFINITY, 0.5]);
        assert_eq!(back.channel("S1").unwrap().values(), &[f64::INFINITY, f64::NEG_INFINITY, 0.25]);

        let nan = bundle(&[f64::NAN, 1.0], &[1.0, 1.0, 1.0]);
        nan.save(&weights_path).unwrap();
        assert!(StatBundle::load(&weights_path).unwrap().zeroth_order().unwrap().values()[0].is_nan());
    }
}
