// ============================================================================
// focus-core/src/pipeline/inputs.rs
// ============================================================================
//
// INPUT PREPARATION: Loading, caching and normalization of run inputs
//
// Data maps and the template are degraded to the working resolution and
// cached in the output directory; a cache that cannot be read in full is
// silently recomputed. Noise realizations and masks are read and degraded on
// every run.
//
// Normalization removes the median of the valid data pixels (`offset`),
// replaces sentinel pixels by it, and rescales everything by the inverse
// standard deviation of the first primary noise realization (`amplitude`).
//
// KEY COMPONENTS:
// - DatasetLayout: file names of a dataset inside the data directory
// - RawInputs: inputs at the working resolution, before normalization
// - PreparedInputs: normalized inputs consumed by the controller
// - load_inputs: cache-aware loading driven by a CoreConfig

use crate::artifacts::{ArtifactStore, CachedInput, read_map};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::noise::{NoiseEnsemble, NoiseSet};
use crate::sphere::{Map, MaskSet, Nside, degrade};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Data pixels below this value are treated as missing.
pub const SENTINEL_THRESHOLD: f64 = -1e10;

/// Which of the three parallel noise ensembles a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    Full,
    Half1,
    Half2,
}

impl NoiseKind {
    fn suffix(self) -> &'static str {
        match self {
            NoiseKind::Full => "full",
            NoiseKind::Half1 => "hm1",
            NoiseKind::Half2 => "hm2",
        }
    }
}

/// File layout of a dataset:
///
/// * `{name}_MONO.json`, `{name}_HM1_MONO.json`, `{name}_HM2_MONO.json`
/// * `{prefix}_NOISE{k:03}_{full,hm1,hm2}.json` with `prefix` the first six
///   characters of the name
/// * the template and mask files named in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    dir: PathBuf,
    name: String,
}

impl DatasetLayout {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}_MONO.json", self.name))
    }

    /// Path of half split 1 or 2.
    pub fn half_path(&self, split: u8) -> PathBuf {
        self.dir.join(format!("{}_HM{split}_MONO.json", self.name))
    }

    pub fn noise_path(&self, kind: NoiseKind, index: usize) -> PathBuf {
        let prefix: String = self.name.chars().take(6).collect();
        self.dir
            .join(format!("{prefix}_NOISE{index:03}_{}.json", kind.suffix()))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Inputs at the working resolution, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInputs {
    pub data: Map,
    pub half1: Map,
    pub half2: Map,
    pub template: Map,
    /// Raw masks; empty means a single uniform mask
    pub masks: Vec<Map>,
    pub noise: NoiseSet,
}

/// Normalized inputs of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedInputs {
    pub data: Map,
    pub half1: Map,
    pub half2: Map,
    pub template: Map,
    pub masks: MaskSet,
    pub noise: NoiseSet,
    /// Per-pixel `1 / mean_k(n_k²)` of the normalized primary noise
    pub inverse_noise_variance: Map,
    pub amplitude: f64,
    pub offset: f64,
}

impl PreparedInputs {
    pub fn nside(&self) -> Nside {
        self.data.nside()
    }

    /// Converts a normalized map back to physical units.
    pub fn to_physical(&self, map: &Map) -> Map {
        let (amplitude, offset) = (self.amplitude, self.offset);
        map.map_values(|v| v / amplitude + offset)
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl RawInputs {
    /// Applies offset removal, sentinel filling and amplitude scaling.
    pub fn prepare(self) -> CoreResult<PreparedInputs> {
        let nside = self.data.nside();
        for (label, map) in [("half split 1", &self.half1), ("half split 2", &self.half2), ("template", &self.template)] {
            self.data.ensure_compatible(map, label)?;
        }
        if self.noise.nside() != nside {
            return Err(CoreError::Config(format!(
                "noise realizations are at nside {}, data at nside {nside}",
                self.noise.nside()
            )));
        }

        let valid: Vec<f64> = self
            .data
            .values()
            .iter()
            .copied()
            .filter(|&v| v > SENTINEL_THRESHOLD)
            .collect();
        let offset = median(valid).ok_or_else(|| CoreError::Config("the data map has no valid pixel".to_string()))?;

        let missing: Vec<bool> = self.data.values().iter().map(|&v| v < SENTINEL_THRESHOLD).collect();
        let fill = |map: &Map| -> CoreResult<Map> {
            let values = map
                .values()
                .iter()
                .zip(&missing)
                .map(|(&v, &bad)| if bad { offset } else { v })
                .collect();
            Map::new(nside, values)
        };

        let spread = self.noise.full.realizations()[0].std();
        let amplitude = if spread.is_finite() && spread > 0.0 {
            1.0 / spread
        } else {
            warn!("First noise realization has spread {spread}; keeping maps unscaled");
            1.0
        };
        info!("AMPMAP {amplitude:.6e} {offset:.6e}");

        let normalize = |map: &Map| -> CoreResult<Map> { Ok(fill(map)?.map_values(|v| amplitude * (v - offset))) };
        let noise = self.noise.normalized(amplitude)?;
        let inverse_noise_variance = noise.full.inverse_variance_map();
        let masks = if self.masks.is_empty() {
            MaskSet::uniform(nside)
        } else {
            MaskSet::from_raw(self.masks)?
        };

        Ok(PreparedInputs {
            data: normalize(&self.data)?,
            half1: normalize(&self.half1)?,
            half2: normalize(&self.half2)?,
            template: self.template.scale(amplitude),
            masks,
            noise,
            inverse_noise_variance,
            amplitude,
            offset,
        })
    }
}

fn read_degraded(path: &Path, nside: Nside) -> CoreResult<Map> {
    degrade(&read_map(path)?, nside)
}

fn read_ensemble(layout: &DatasetLayout, kind: NoiseKind, count: usize, nside: Nside) -> CoreResult<NoiseEnsemble> {
    let realizations = (0..count)
        .map(|k| read_degraded(&layout.noise_path(kind, k), nside))
        .collect::<CoreResult<Vec<_>>>()?;
    NoiseEnsemble::new(format!("noise {}", kind.suffix()), realizations)
}

struct DataMaps {
    template: Map,
    data: Map,
    half1: Map,
    half2: Map,
}

fn load_cached_maps(store: &ArtifactStore) -> CoreResult<DataMaps> {
    Ok(DataMaps {
        template: store.load_cached(CachedInput::Template)?,
        data: store.load_cached(CachedInput::Data)?,
        half1: store.load_cached(CachedInput::Half1)?,
        half2: store.load_cached(CachedInput::Half2)?,
    })
}

fn load_data_maps(config: &CoreConfig, layout: &DatasetLayout, store: &ArtifactStore, nside: Nside) -> CoreResult<DataMaps> {
    match load_cached_maps(store) {
        Ok(maps) if maps.data.nside() == nside => {
            debug!("Using cached inputs from {}", store.dir().display());
            return Ok(maps);
        }
        Ok(_) => debug!("Cached inputs have the wrong resolution, recomputing"),
        Err(e) => debug!("No usable cached inputs ({e}), recomputing"),
    }

    let maps = DataMaps {
        data: read_degraded(&layout.data_path(), nside)?,
        half1: read_degraded(&layout.half_path(1), nside)?,
        half2: read_degraded(&layout.half_path(2), nside)?,
        template: read_degraded(&layout.file(&config.template_file), nside)?,
    };
    for (input, map) in [
        (CachedInput::Template, &maps.template),
        (CachedInput::Data, &maps.data),
        (CachedInput::Half1, &maps.half1),
        (CachedInput::Half2, &maps.half2),
    ] {
        if let Err(e) = store.save_cached(input, map) {
            warn!("Could not cache {} input: {e}", input.suffix());
        }
    }
    Ok(maps)
}

/// Reads every input of the run described by `config` at its working resolution.
pub fn load_raw_inputs(config: &CoreConfig, store: &ArtifactStore) -> CoreResult<RawInputs> {
    let nside = config.working_nside()?;
    let layout = DatasetLayout::new(&config.data_dir, &config.input_name);
    let maps = load_data_maps(config, &layout, store, nside)?;

    let masks = config
        .mask_files
        .iter()
        .map(|file| read_degraded(&layout.file(file), nside))
        .collect::<CoreResult<Vec<_>>>()?;

    let count = config.noise_realizations;
    info!("Reading {count} noise realizations from {}", layout.dir().display());
    let noise = NoiseSet::new(
        read_ensemble(&layout, NoiseKind::Full, count, nside)?,
        read_ensemble(&layout, NoiseKind::Half1, count, nside)?,
        read_ensemble(&layout, NoiseKind::Half2, count, nside)?,
    )?;

    Ok(RawInputs {
        data: maps.data,
        half1: maps.half1,
        half2: maps.half2,
        template: maps.template,
        masks,
        noise,
    })
}

/// Loads and normalizes the inputs of the run described by `config`.
pub fn load_inputs(config: &CoreConfig, store: &ArtifactStore) -> CoreResult<PreparedInputs> {
    load_raw_inputs(config, store)?.prepare()
}
