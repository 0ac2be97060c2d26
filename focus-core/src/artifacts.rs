// ============================================================================
// focus-core/src/artifacts.rs
// ============================================================================
//
// ARTIFACTS: Naming and JSON persistence of run outputs
//
// Every file a run writes is named from the run name and, where relevant, the
// outer iteration index:
//
//   {run}_bias{k}_{i}.json   {run}_isig{k}_{i}.json      calibration k ∈ 1..=3
//   {run}_cross_{i}.json     {run}_in_{i}.json  {run}_out_{i}.json
//   {run}result_{i}.json     {run}log_{i}.json
//   {run}{td,di,d1,d2}.json                              cached inputs
//
// Maps are stored as flat JSON arrays in nested pixel order. Every float
// array goes through `float_codec`, so infinities and NaN read back as such.
//
// KEY COMPONENTS:
// - ArtifactStore: paths and writers for one run
// - CachedInput: the four cached downsampled inputs
// - read_map / write_map / read_values / write_values: float array files
// - read_json / write_json: generic file helpers

use crate::calibration::CalibrationKind;
use crate::error::{CoreResult, artifact_error};
use crate::float_codec::{FloatArray, FloatVec};
use crate::sphere::Map;
use crate::statistics::StatBundle;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes `value` as JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec(value)?;
    fs::write(path, bytes).map_err(|e| artifact_error(path, e))
}

/// Reads a JSON value.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let bytes = fs::read(path).map_err(|e| artifact_error(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| artifact_error(path, e))
}

/// Writes a float array, keeping non-finite values.
pub fn write_values(path: &Path, values: &[f64]) -> CoreResult<()> {
    write_json(path, &FloatArray(values))
}

/// Reads an array written by [`write_values`] or a plain JSON number array.
pub fn read_values(path: &Path) -> CoreResult<Vec<f64>> {
    let FloatVec(values) = read_json(path)?;
    Ok(values)
}

/// Writes a map as a flat JSON array.
pub fn write_map(path: &Path, map: &Map) -> CoreResult<()> {
    write_values(path, map.values())
}

/// Reads a flat JSON array as a map, inferring its resolution.
pub fn read_map(path: &Path) -> CoreResult<Map> {
    Map::from_values(read_values(path)?).map_err(|e| artifact_error(path, e))
}

/// Downsampled inputs cached in the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedInput {
    Template,
    Data,
    Half1,
    Half2,
}

impl CachedInput {
    pub fn suffix(self) -> &'static str {
        match self {
            CachedInput::Template => "td",
            CachedInput::Data => "di",
            CachedInput::Half1 => "d1",
            CachedInput::Half2 => "d2",
        }
    }
}

/// Paths and writers for the artifacts of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
    run_name: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            run_name: run_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Creates the output directory if needed.
    pub fn ensure_dir(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| artifact_error(&self.dir, e))
    }

    fn path(&self, name: String) -> PathBuf {
        self.dir.join(name)
    }

    pub fn bias_path(&self, kind: CalibrationKind, iteration: usize) -> PathBuf {
        self.path(format!("{}_bias{}_{iteration}.json", self.run_name, kind.index()))
    }

    pub fn inverse_variance_path(&self, kind: CalibrationKind, iteration: usize) -> PathBuf {
        self.path(format!("{}_isig{}_{iteration}.json", self.run_name, kind.index()))
    }

    pub fn cross_path(&self, iteration: usize) -> PathBuf {
        self.path(format!("{}_cross_{iteration}.json", self.run_name))
    }

    pub fn input_stats_path(&self, iteration: usize) -> PathBuf {
        self.path(format!("{}_in_{iteration}.json", self.run_name))
    }

    pub fn output_stats_path(&self, iteration: usize) -> PathBuf {
        self.path(format!("{}_out_{iteration}.json", self.run_name))
    }

    pub fn result_path(&self, iteration: usize) -> PathBuf {
        self.path(format!("{}result_{iteration}.json", self.run_name))
    }

    pub fn log_path(&self, iteration: usize) -> PathBuf {
        self.path(format!("{}log_{iteration}.json", self.run_name))
    }

    pub fn cache_path(&self, input: CachedInput) -> PathBuf {
        self.path(format!("{}{}.json", self.run_name, input.suffix()))
    }

    pub fn config_path(&self) -> PathBuf {
        self.path(format!("{}config.json", self.run_name))
    }

    pub fn save_bundle(&self, path: &Path, bundle: &StatBundle) -> CoreResult<()> {
        bundle.save(path)
    }

    pub fn save_map(&self, path: &Path, map: &Map) -> CoreResult<()> {
        write_map(path, map)
    }

    pub fn save_history(&self, iteration: usize, history: &[f64]) -> CoreResult<()> {
        write_values(&self.log_path(iteration), history)
    }

    pub fn load_history(&self, iteration: usize) -> CoreResult<Vec<f64>> {
        read_values(&self.log_path(iteration))
    }

    pub fn load_cached(&self, input: CachedInput) -> CoreResult<Map> {
        read_map(&self.cache_path(input))
    }

    pub fn save_cached(&self, input: CachedInput, map: &Map) -> CoreResult<()> {
        write_map(&self.cache_path(input), map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::Nside;

    #[test]
    fn test_artifact_names() {
        let store = ArtifactStore::new("/out", "FOCUSEE025664");
        assert_eq!(
            store.bias_path(CalibrationKind::Cross, 3),
            PathBuf::from("/out/FOCUSEE025664_bias2_3.json")
        );
        assert_eq!(
            store.inverse_variance_path(CalibrationKind::Data, 0),
            PathBuf::from("/out/FOCUSEE025664_isig3_0.json")
        );
        assert_eq!(store.result_path(4), PathBuf::from("/out/FOCUSEE025664result_4.json"));
        assert_eq!(store.log_path(1), PathBuf::from("/out/FOCUSEE025664log_1.json"));
        assert_eq!(store.cache_path(CachedInput::Half2), PathBuf::from("/out/FOCUSEE025664d2.json"));
        assert_eq!(store.cross_path(2), PathBuf::from("/out/FOCUSEE025664_cross_2.json"));
    }

    #[test]
    fn test_map_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"), "RUN");
        store.ensure_dir().unwrap();
        let map = Map::new(Nside::new(2).unwrap(), (0..48).map(|v| v as f64 / 3.0).collect()).unwrap();
        store.save_cached(CachedInput::Data, &map).unwrap();
        assert_eq!(store.load_cached(CachedInput::Data).unwrap(), map);
        assert!(store.load_cached(CachedInput::Template).is_err());

        let bad = dir.path().join("bad.json");
        write_json(&bad, &[1.0, 2.0, 3.0]).unwrap();
        assert!(read_map(&bad).is_err());
    }

    #[test]
    fn test_diverged_history_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), "RUN");
        store.save_history(2, &[3.0, 1.5, f64::NAN, f64::INFINITY]).unwrap();
        let history = store.load_history(2).unwrap();
        assert_eq!(&history[..2], &[3.0, 1.5]);
        assert!(history[2].is_nan());
        assert_eq!(history[3], f64::INFINITY);
    }
}
