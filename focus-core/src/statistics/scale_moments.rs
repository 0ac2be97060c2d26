//! Multiscale moment operator.
//!
//! The input map is split into a pyramid of detail layers: level `j` holds the
//! difference between the map degraded `j` times and its next coarser version
//! (brought back up by nearest-parent upsampling). The coarsest level keeps
//! the residual average. Level `j` is weighted by `λ^j`.
//!
//! Channels, all averaged under every mask of the set at the matching level:
//!
//! * `P00[m, j]` - mean of `a_j · b_j`
//! * `S1[m, j]`  - mean of `sqrt|a_j · b_j|`
//! * `S2[m, j1<j2]` (scat) - mean absolute level-`j2` detail of the modulus field `sqrt|a_j1 · b_j1|`
//! * `C01[m, j1<j2]` (cov) - mean of `downsample(|a_j1|) · b_j2`, symmetrized for auto statistics

use super::{Channel, StatBundle, StatisticOperator, StatisticVariant, ZEROTH_ORDER, scale_weight};
use crate::error::{CoreError, CoreResult, shape_mismatch};
use crate::sphere::{Map, MaskSet, degrade, upsample};

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleMomentOperator {
    variant: StatisticVariant,
    kernel_size: u32,
    lambda: f64,
}

impl ScaleMomentOperator {
    pub fn new(variant: StatisticVariant, kernel_size: u32) -> CoreResult<Self> {
        Ok(Self {
            variant,
            kernel_size,
            lambda: scale_weight(kernel_size)?,
        })
    }

    pub fn variant(&self) -> StatisticVariant {
        self.variant
    }

    pub fn kernel_size(&self) -> u32 {
        self.kernel_size
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

/// Successive degradations of `map` down to `nside = 1`, finest first.
pub(crate) fn pyramid(map: &Map) -> CoreResult<Vec<Map>> {
    let mut levels = vec![map.clone()];
    while let Some(coarser) = levels[levels.len() - 1].nside().coarser() {
        let next = degrade(&levels[levels.len() - 1], coarser)?;
        levels.push(next);
    }
    Ok(levels)
}

fn detail_levels(map: &Map, lambda: f64) -> CoreResult<Vec<Map>> {
    let levels = pyramid(map)?;
    let mut details = Vec::with_capacity(levels.len());
    for (j, level) in levels.iter().enumerate() {
        let detail = match levels.get(j + 1) {
            Some(next) => level.sub(&upsample(next, level.nside())?)?,
            None => level.clone(),
        };
        details.push(detail.scale(lambda.powi(j as i32)));
    }
    Ok(details)
}

fn weighted_mean(mask: &Map, field: impl Iterator<Item = f64>) -> f64 {
    let (num, den) = mask
        .values()
        .iter()
        .zip(field)
        .fold((0.0, 0.0), |(num, den), (&w, v)| (num + w * v, den + w));
    num / den
}

fn mask_at<'a>(masks: &'a MaskSet, depth: usize, index: usize) -> CoreResult<&'a Map> {
    masks
        .at_depth(depth)
        .and_then(|level| level.get(index))
        .ok_or_else(|| CoreError::Mask(format!("mask {index} has no level at depth {depth}")))
}

/// Per-mask weighted means of per-level fields, laid out `[mask][field]`.
fn masked_means(masks: &MaskSet, fields: &[(usize, Vec<f64>)]) -> CoreResult<Vec<f64>> {
    let mut out = Vec::with_capacity(masks.len() * fields.len());
    for m in 0..masks.len() {
        for (depth, field) in fields {
            let mask = mask_at(masks, *depth, m)?;
            out.push(weighted_mean(mask, field.iter().copied()));
        }
    }
    Ok(out)
}

fn product(a: &Map, b: &Map) -> Vec<f64> {
    a.values().iter().zip(b.values()).map(|(x, y)| x * y).collect()
}

impl StatisticOperator for ScaleMomentOperator {
    fn evaluate(&self, map: &Map, map2: Option<&Map>, masks: &MaskSet, auto: bool) -> CoreResult<StatBundle> {
        if masks.nside() != map.nside() {
            return Err(shape_mismatch("mask set resolution", map.len(), masks.nside().npix()));
        }
        let left = detail_levels(map, self.lambda)?;
        let right = match map2 {
            Some(other) => {
                map.ensure_compatible(other, "second operator input")?;
                detail_levels(other, self.lambda)?
            }
            None => left.clone(),
        };

        let nmask = masks.len();
        let nscale = left.len();
        let pairs: Vec<(usize, usize)> = (0..nscale)
            .flat_map(|j1| (j1 + 1..nscale).map(move |j2| (j1, j2)))
            .collect();

        let products: Vec<(usize, Vec<f64>)> = (0..nscale)
            .map(|j| (j, product(&left[j], &right[j])))
            .collect();
        let moduli: Vec<(usize, Vec<f64>)> = products
            .iter()
            .map(|(j, p)| (*j, p.iter().map(|v| v.abs().sqrt()).collect()))
            .collect();

        let mut channels = vec![
            Channel::new(ZEROTH_ORDER, vec![nmask, nscale], masked_means(masks, &products)?)?,
            Channel::new("S1", vec![nmask, nscale], masked_means(masks, &moduli)?)?,
        ];

        if pairs.is_empty() {
            return StatBundle::new(channels);
        }

        match self.variant {
            StatisticVariant::Scat => {
                let mut fields = Vec::with_capacity(pairs.len());
                for (j1, modulus) in &moduli {
                    let field = Map::new(left[*j1].nside(), modulus.clone())?;
                    let second = detail_levels(&field, 1.0)?;
                    for (offset, detail) in second.iter().enumerate().skip(1) {
                        fields.push((j1 + offset, detail.values().iter().map(|v| v.abs()).collect()));
                    }
                }
                channels.push(Channel::new("S2", vec![nmask, pairs.len()], masked_means(masks, &fields)?)?);
            }
            StatisticVariant::Cov => {
                let left_abs: Vec<Vec<Map>> = left
                    .iter()
                    .map(|d| pyramid(&d.map_values(f64::abs)))
                    .collect::<CoreResult<_>>()?;
                let right_abs: Vec<Vec<Map>> = if auto {
                    right
                        .iter()
                        .map(|d| pyramid(&d.map_values(f64::abs)))
                        .collect::<CoreResult<_>>()?
                } else {
                    Vec::new()
                };

                let mut fields = Vec::with_capacity(pairs.len());
                for &(j1, j2) in &pairs {
                    let forward = product(&left_abs[j1][j2 - j1], &right[j2]);
                    let field = if auto {
                        let backward = product(&right_abs[j1][j2 - j1], &left[j2]);
                        forward.iter().zip(&backward).map(|(f, b)| 0.5 * (f + b)).collect()
                    } else {
                        forward
                    };
                    fields.push((j2, field));
                }
                channels.push(Channel::new("C01", vec![nmask, pairs.len()], masked_means(masks, &fields)?)?);
            }
        }

        StatBundle::new(channels)
    }

    fn name(&self) -> &str {
        match self.variant {
            StatisticVariant::Scat => "scale-moments/scat",
            StatisticVariant::Cov => "scale-moments/cov",
        }
    }
}
