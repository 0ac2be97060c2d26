//! Resolution changes between nested pixelizations.
//!
//! Degrading averages each contiguous block of `(nside_in/nside_out)²` fine
//! pixels; upsampling copies every coarse pixel into its children.

use super::{Map, Nside};
use crate::error::{CoreError, CoreResult};

/// Degrades a raw nested array to `nside_out` by block averaging.
///
/// The input resolution is inferred from the array length. Arrays already at
/// `nside_out` are returned unchanged.
pub fn downsample(values: &[f64], nside_out: Nside) -> CoreResult<Vec<f64>> {
    let nside_in = Nside::from_npix(values.len())?;
    if nside_in == nside_out {
        return Ok(values.to_vec());
    }
    if nside_in < nside_out {
        return Err(CoreError::Config(format!(
            "cannot downsample nside {nside_in} to the finer nside {nside_out}"
        )));
    }

    let ratio = (nside_in.get() / nside_out.get()) as usize;
    let block = ratio * ratio;
    Ok(values
        .chunks_exact(block)
        .map(|chunk| chunk.iter().sum::<f64>() / block as f64)
        .collect())
}

/// Degrades a map to `nside_out`.
pub fn degrade(map: &Map, nside_out: Nside) -> CoreResult<Map> {
    Map::new(nside_out, downsample(map.values(), nside_out)?)
}

/// Copies every pixel of `map` into its children at `nside_out`.
pub fn upsample(map: &Map, nside_out: Nside) -> CoreResult<Map> {
    let nside_in = map.nside();
    if nside_out < nside_in {
        return Err(CoreError::Config(format!(
            "cannot upsample nside {nside_in} to the coarser nside {nside_out}"
        )));
    }
    let ratio = (nside_out.get() / nside_in.get()) as usize;
    let block = ratio * ratio;
    let values = map
        .values()
        .iter()
        .flat_map(|&v| std::iter::repeat_n(v, block))
        .collect();
    Map::new(nside_out, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_block_means() {
        let nside_out = Nside::new(1).unwrap();
        let values: Vec<f64> = (0..48).map(|v| v as f64).collect();
        let out = downsample(&values, nside_out).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(out[0], 1.5);
        assert_eq!(out[11], 45.5);
    }

    #[test]
    fn test_downsample_same_resolution_is_identity() {
        let values: Vec<f64> = (0..48).map(|v| v as f64 * 0.5).collect();
        let out = downsample(&values, Nside::new(2).unwrap()).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_downsample_rejects_finer_target() {
        let values = vec![0.0; 12];
        assert!(downsample(&values, Nside::new(2).unwrap()).is_err());
        assert!(downsample(&[0.0; 13], Nside::new(1).unwrap()).is_err());
    }

    #[test]
    fn test_upsample_then_degrade_recovers_map() {
        let coarse = Map::from_values((0..12).map(|v| v as f64).collect()).unwrap();
        let fine = upsample(&coarse, Nside::new(4).unwrap()).unwrap();
        assert_eq!(fine.len(), 192);
        assert_eq!(&fine.values()[..16], &[0.0; 16]);
        let back = degrade(&fine, Nside::new(1).unwrap()).unwrap();
        assert_eq!(back, coarse);
    }
}
