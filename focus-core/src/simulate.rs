// ============================================================================
// focus-core/src/simulate.rs
// ============================================================================
//
// SIMULATION: Synthetic datasets and seeded start maps
//
// `simulate_dataset` writes a complete dataset in the layout read by the
// reconstruction: a multiscale random signal observed through two noisy half
// splits, a correlated template, a uniform and a high-latitude mask, and the
// three noise ensembles. One data pixel is set to the missing-pixel sentinel.
//
// `matched_gaussian` draws white noise and rescales each detail level of its
// pyramid to the spread of the same level in a reference map.

use crate::artifacts::write_map;
use crate::config::DEFAULT_TEMPLATE_FILE;
use crate::error::{CoreError, CoreResult, artifact_error};
use crate::noise::{NoiseSet, gaussian_map};
use crate::pipeline::{DatasetLayout, NoiseKind};
use crate::sphere::{Map, Nside, upsample};
use crate::statistics::scale_moments::pyramid;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::PathBuf;

/// Value written to missing data pixels.
pub const UNSEEN: f64 = -1.6375e30;

/// Per-level spread ratio between successive resolutions of the signal.
const LEVEL_DECAY: f64 = 0.6;

pub const UNIFORM_MASK_FILE: &str = "MASK_ALL.json";
pub const HIGH_LATITUDE_MASK_FILE: &str = "MASK_HIGHLAT.json";

/// Parameters of a synthetic dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub output_dir: PathBuf,
    pub name: String,
    pub nside: u32,
    pub realizations: usize,
    /// Spread of the full-data noise
    pub noise_level: f64,
    pub seed: u64,
}

/// Files written by `simulate_dataset`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDataset {
    pub layout: DatasetLayout,
    pub template_file: String,
    pub mask_files: Vec<String>,
    /// The noise-free signal
    pub signal: Map,
}

/// Sum of white-noise maps drawn at every resolution from 1 to `nside` and
/// brought up to `nside`, coarse levels dominating.
pub fn multiscale_field(nside: Nside, seed: u64) -> CoreResult<Map> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut field = Map::zeros(nside);
    let mut sigma = 1.0;
    let mut levels: Vec<Nside> = std::iter::successors(Some(nside), |n| n.coarser()).collect();
    levels.reverse();
    for level in levels {
        let layer = upsample(&gaussian_map(level, sigma, &mut rng)?, nside)?;
        field = field.add(&layer)?;
        sigma *= LEVEL_DECAY;
    }
    Ok(field)
}

/// Seeded Gaussian map whose detail levels have the spread of `reference`'s.
pub fn matched_gaussian(reference: &Map, seed: u64) -> CoreResult<Map> {
    let nside = reference.nside();
    let mut rng = StdRng::seed_from_u64(seed);
    let white = gaussian_map(nside, 1.0, &mut rng)?;

    let details = |map: &Map| -> CoreResult<Vec<Map>> {
        let levels = pyramid(map)?;
        levels
            .windows(2)
            .map(|pair| upsample(&pair[0], nside)?.sub(&upsample(&pair[1], nside)?))
            .collect()
    };

    let mut result = Map::constant(nside, reference.mean());
    for (target, source) in details(reference)?.iter().zip(details(&white)?) {
        let spread = source.std();
        if spread > 0.0 {
            result = result.add(&source.scale(target.std() / spread))?;
        }
    }
    Ok(result)
}

fn high_latitude_mask(nside: Nside) -> CoreResult<Map> {
    // Base faces 4..=7 of the nested ordering cover the equatorial belt
    let face = (nside.get() as usize).pow(2);
    Map::new(
        nside,
        (0..nside.npix())
            .map(|p| if (4..8).contains(&(p / face)) { 0.0 } else { 1.0 })
            .collect(),
    )
}

/// Writes a synthetic dataset into `config.output_dir`.
pub fn simulate_dataset(config: &SimulationConfig) -> CoreResult<SimulatedDataset> {
    let nside = Nside::new(config.nside)?;
    if config.realizations == 0 {
        return Err(CoreError::Config("at least one noise realization is required".to_string()));
    }
    if !(config.noise_level > 0.0) {
        return Err(CoreError::Config(format!(
            "noise level must be positive, got {}",
            config.noise_level
        )));
    }
    fs::create_dir_all(&config.output_dir).map_err(|e| artifact_error(&config.output_dir, e))?;
    let layout = DatasetLayout::new(&config.output_dir, &config.name);
    info!(
        "Simulating dataset {} at nside {nside} with {} noise realizations",
        config.name, config.realizations
    );

    let signal = multiscale_field(nside, config.seed)?;
    let foreground = multiscale_field(nside, config.seed.wrapping_add(1))?;
    let template = signal.scale(0.8).add(&foreground.scale(0.2))?;

    // Observed noise is drawn apart from the calibration ensembles
    let observed = NoiseSet::gaussian(nside, 1, config.noise_level, config.seed.wrapping_add(2))?;
    let half1 = signal.add(&observed.half1.realizations()[0])?;
    let half2 = signal.add(&observed.half2.realizations()[0])?;
    let mut data = half1.midpoint(&half2)?;
    data.values_mut()[0] = UNSEEN;

    write_map(&layout.data_path(), &data)?;
    write_map(&layout.half_path(1), &half1)?;
    write_map(&layout.half_path(2), &half2)?;
    write_map(&layout.file(DEFAULT_TEMPLATE_FILE), &template)?;
    write_map(&layout.file(UNIFORM_MASK_FILE), &Map::constant(nside, 1.0))?;
    write_map(&layout.file(HIGH_LATITUDE_MASK_FILE), &high_latitude_mask(nside)?)?;

    let noise = NoiseSet::gaussian(nside, config.realizations, config.noise_level, config.seed.wrapping_add(3))?;
    for (kind, ensemble) in [
        (NoiseKind::Full, &noise.full),
        (NoiseKind::Half1, &noise.half1),
        (NoiseKind::Half2, &noise.half2),
    ] {
        for (index, realization) in ensemble.realizations().iter().enumerate() {
            write_map(&layout.noise_path(kind, index), realization)?;
        }
    }
    debug!("Dataset written to {}", config.output_dir.display());

    Ok(SimulatedDataset {
        layout,
        template_file: DEFAULT_TEMPLATE_FILE.to_string(),
        mask_files: vec![UNIFORM_MASK_FILE.to_string(), HIGH_LATITUDE_MASK_FILE.to_string()],
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::read_map;

    #[test]
    fn test_matched_gaussian_is_seeded() {
        let reference = multiscale_field(Nside::new(8).unwrap(), 5).unwrap();
        let a = matched_gaussian(&reference, 11).unwrap();
        let b = matched_gaussian(&reference, 11).unwrap();
        let c = matched_gaussian(&reference, 12).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!((a.mean() - reference.mean()).abs() < 1e-9);
    }

    #[test]
    fn test_high_latitude_mask_covers_polar_faces() {
        let mask = high_latitude_mask(Nside::new(2).unwrap()).unwrap();
        assert_eq!(mask.sum(), 32.0);
        assert_eq!(mask.values()[16], 0.0);
        assert_eq!(mask.values()[0], 1.0);
    }

    #[test]
    fn test_simulated_dataset_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulationConfig {
            output_dir: dir.path().to_path_buf(),
            name: "SIMDATA".to_string(),
            nside: 4,
            realizations: 3,
            noise_level: 0.1,
            seed: 9,
        };
        let dataset = simulate_dataset(&config).unwrap();
        assert_eq!(read_map(&dataset.layout.data_path()).unwrap().values()[0], UNSEEN);
        assert!(dataset.layout.noise_path(NoiseKind::Half2, 2).exists());
        assert!(!dataset.layout.noise_path(NoiseKind::Full, 3).exists());
        for file in &dataset.mask_files {
            assert!(dataset.layout.file(file).exists());
        }
    }

    #[test]
    fn test_invalid_simulation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SimulationConfig {
            output_dir: dir.path().to_path_buf(),
            name: "SIMDATA".to_string(),
            nside: 4,
            realizations: 0,
            noise_level: 0.1,
            seed: 9,
        };
        assert!(simulate_dataset(&config).is_err());
        config.realizations = 1;
        config.nside = 6;
        assert!(simulate_dataset(&config).is_err());
    }
}
