//! Mask sets used to weight statistics over sky regions.

use super::{Map, Nside, degrade};
use crate::error::{CoreError, CoreResult};

/// Ordered collection of per-pixel weight maps.
///
/// Mask 0 is always uniform. Every other mask is rescaled at construction so
/// that its total weight equals the total weight of mask 0 (`12·nside²`), and
/// is never modified afterwards. The set also keeps a pyramid of block-averaged
/// copies, one entry per resolution from `nside` down to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSet {
    levels: Vec<Vec<Map>>,
}

impl MaskSet {
    /// A set holding only the uniform baseline mask.
    pub fn uniform(nside: Nside) -> Self {
        let levels = std::iter::successors(Some(nside), |n| n.coarser())
            .map(|level| vec![Map::constant(level, 1.0)])
            .collect();
        Self { levels }
    }

    /// Builds a set from raw masks, forcing mask 0 to uniform weight and
    /// renormalizing the others.
    pub fn from_raw(raw: Vec<Map>) -> CoreResult<Self> {
        let Some(first) = raw.first() else {
            return Err(CoreError::Mask("a mask set needs at least one mask".to_string()));
        };
        let nside = first.nside();
        let baseline = Map::constant(nside, 1.0);
        let baseline_total = baseline.sum();

        let mut masks = Vec::with_capacity(raw.len());
        masks.push(baseline);
        for (index, mask) in raw.iter().enumerate().skip(1) {
            if mask.nside() != nside {
                return Err(CoreError::Mask(format!(
                    "mask {index} has nside {}, expected {nside}",
                    mask.nside()
                )));
            }
            let total = mask.sum();
            if !total.is_finite() || total <= 0.0 {
                return Err(CoreError::Mask(format!(
                    "mask {index} has non-positive total weight {total}"
                )));
            }
            masks.push(mask.scale(baseline_total / total));
        }

        Self::with_pyramid(masks)
    }

    fn with_pyramid(masks: Vec<Map>) -> CoreResult<Self> {
        let mut levels = vec![masks];
        let mut nside = levels[0][0].nside();
        while let Some(coarser) = nside.coarser() {
            let previous = &levels[levels.len() - 1];
            let next = previous
                .iter()
                .map(|mask| degrade(mask, coarser))
                .collect::<CoreResult<Vec<_>>>()?;
            levels.push(next);
            nside = coarser;
        }
        Ok(Self { levels })
    }

    pub fn nside(&self) -> Nside {
        self.levels[0][0].nside()
    }

    /// Number of masks in the set.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Masks at full resolution.
    pub fn masks(&self) -> &[Map] {
        &self.levels[0]
    }

    /// Masks degraded `depth` times (depth 0 is full resolution).
    pub fn at_depth(&self, depth: usize) -> Option<&[Map]> {
        self.levels.get(depth).map(Vec::as_slice)
    }

    /// Total weight of mask `index`.
    pub fn total_weight(&self, index: usize) -> Option<f64> {
        self.levels[0].get(index).map(Map::sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nside(n: u32) -> Nside {
        Nside::new(n).unwrap()
    }

    #[test]
    fn test_renormalized_masks_match_baseline_weight() {
        let n = nside(4);
        let half: Vec<f64> = (0..n.npix()).map(|p| if p < 96 { 1.0 } else { 0.0 }).collect();
        let quarter: Vec<f64> = (0..n.npix()).map(|p| if p < 48 { 0.5 } else { 0.0 }).collect();
        let masks = MaskSet::from_raw(vec![
            Map::constant(n, 0.3),
            Map::new(n, half).unwrap(),
            Map::new(n, quarter).unwrap(),
        ])
        .unwrap();

        let baseline = masks.total_weight(0).unwrap();
        assert_eq!(baseline, n.npix() as f64);
        assert!(masks.masks()[0].values().iter().all(|&v| v == 1.0));
        for index in 1..masks.len() {
            let total = masks.total_weight(index).unwrap();
            assert!((total - baseline).abs() < 1e-9, "mask {index}: {total} vs {baseline}");
        }
    }

    #[test]
    fn test_pyramid_reaches_nside_one() {
        let masks = MaskSet::uniform(nside(8));
        assert_eq!(masks.at_depth(3).unwrap()[0].len(), 12);
        assert!(masks.at_depth(4).is_none());
    }

    #[test]
    fn test_rejects_empty_and_zero_masks() {
        assert!(MaskSet::from_raw(Vec::new()).is_err());
        let n = nside(2);
        let result = MaskSet::from_raw(vec![Map::constant(n, 1.0), Map::zeros(n)]);
        assert!(matches!(result, Err(CoreError::Mask(_))));
    }
}
