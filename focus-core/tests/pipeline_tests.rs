use focus_core::artifacts::ArtifactStore;
use focus_core::calibration::CalibrationKind;
use focus_core::config::{CoreConfig, CoreConfigBuilder};
use focus_core::distributed::SingleProcess;
use focus_core::error::CoreResult;
use focus_core::loss::LossTerm;
use focus_core::noise::NoiseSet;
use focus_core::pipeline::{Controller, RawInputs};
use focus_core::progress::{NullProgressCallback, ProgressEvent};
use focus_core::simulate::{SimulationConfig, simulate_dataset};
use focus_core::sphere::{Map, Nside};
use focus_core::statistics::{ScaleMomentOperator, StatBundle, StatisticVariant};
use focus_core::synthesis::{Optimizer, OptimizerConfig, SynthesisOutcome};
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

/// Returns the start map unchanged and records every epoch budget.
#[derive(Default)]
struct Recorder {
    epochs: Mutex<Vec<usize>>,
}

impl Optimizer for Recorder {
    fn run(&self, _losses: &[LossTerm], initial: &Map, config: &OptimizerConfig) -> CoreResult<SynthesisOutcome> {
        self.epochs.lock().unwrap().push(config.epoch_count);
        Ok(SynthesisOutcome {
            map: initial.clone(),
            history: vec![1.0; config.epoch_count],
        })
    }
}

fn config(output: &Path, variant: StatisticVariant, iterations: usize) -> CoreConfig {
    CoreConfigBuilder::new()
        .data_dir(output)
        .output_dir(output)
        .input_name("TEST00")
        .nside(8)
        .variant(variant)
        .outer_iterations(iterations)
        .noise_realizations(2)
        .build()
        .unwrap()
}

fn zero_noise_inputs(n: Nside) -> RawInputs {
    let half1 = Map::new(n, (0..n.npix()).map(|p| (p as f64 * 0.05).sin()).collect()).unwrap();
    let half2 = Map::new(n, (0..n.npix()).map(|p| (p as f64 * 0.05).cos()).collect()).unwrap();
    RawInputs {
        data: half1.midpoint(&half2).unwrap(),
        half1,
        half2,
        template: Map::constant(n, 0.5),
        masks: Vec::new(),
        noise: NoiseSet::zeros(n, 2).unwrap(),
    }
}

#[test]
fn test_zero_epochs_return_the_initial_estimate() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), StatisticVariant::Scat, 1);
    config.schedule.calibration_epochs = 0;
    config.schedule.production_base = Some(0);

    let n = Nside::new(8).unwrap();
    let inputs = zero_noise_inputs(n).prepare().unwrap();
    let op = ScaleMomentOperator::new(config.variant, config.kernel_size).unwrap();
    let optimizer = focus_core::AdamSynthesis::new(&op, &SingleProcess, &NullProgressCallback);
    let store = ArtifactStore::new(dir.path(), config.run_name());
    let summary = Controller::new(&op, &optimizer, &SingleProcess, &NullProgressCallback, &store, &config)
        .run(&inputs)
        .unwrap();

    assert_eq!(summary.map, inputs.half1.midpoint(&inputs.half2).unwrap());
    assert_eq!(summary.iterations.len(), 1);
    assert_eq!(summary.iterations[0].final_loss, None);
    assert!(store.result_path(0).exists());
    assert!(store.bias_path(CalibrationKind::Auto, 0).exists());

    // Zero noise leaves every weight non-finite, and the file keeps them so
    let weights = StatBundle::load(&store.inverse_variance_path(CalibrationKind::Data, 0)).unwrap();
    assert!(!weights.is_empty());
    assert!(weights.channels().iter().flat_map(|c| c.values()).all(|v| !v.is_finite()));
    let bias = StatBundle::load(&store.bias_path(CalibrationKind::Auto, 0)).unwrap();
    assert!(bias.channels().iter().flat_map(|c| c.values()).all(|&v| v == 0.0));
}

#[test]
fn test_production_epochs_grow_with_the_iteration() {
    for (variant, base) in [(StatisticVariant::Scat, 2000), (StatisticVariant::Cov, 1000)] {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), variant, 5);
        let inputs = zero_noise_inputs(Nside::new(2).unwrap()).prepare().unwrap();
        let op = ScaleMomentOperator::new(variant, 3).unwrap();
        let recorder = Recorder::default();
        let store = ArtifactStore::new(dir.path(), config.run_name());
        let events = Mutex::new(Vec::new());
        let progress = |event: ProgressEvent| {
            if let ProgressEvent::IterationStart { iteration, .. } = event {
                events.lock().unwrap().push(iteration);
            }
        };
        let summary = Controller::new(&op, &recorder, &SingleProcess, &progress, &store, &config)
            .run(&inputs)
            .unwrap();

        let expected: Vec<usize> = (0..5).flat_map(|i| [100, base + 500 * i]).collect();
        assert_eq!(*recorder.epochs.lock().unwrap(), expected);
        assert_eq!(summary.iterations.len(), 5);
        assert_eq!(summary.iterations[4].production_epochs, base + 2000);
        assert_eq!(*events.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        for i in 0..5 {
            assert!(store.log_path(i).exists());
        }
    }
}

#[test]
fn test_simulated_dataset_runs_on_two_workers() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let output_dir = dir.path().join("out");
    let dataset = simulate_dataset(&SimulationConfig {
        output_dir: data_dir.clone(),
        name: "SIMRUN".to_string(),
        nside: 4,
        realizations: 2,
        noise_level: 0.2,
        seed: 5,
    })
    .unwrap();

    let config = CoreConfigBuilder::new()
        .data_dir(&data_dir)
        .output_dir(&output_dir)
        .input_name("SIMRUN")
        .nside(2)
        .outer_iterations(2)
        .noise_realizations(2)
        .mask_files(dataset.mask_files.clone())
        .calibration_epochs(2)
        .production_epochs(2)
        .production_step(1)
        .eval_frequency(1)
        .workers(2)
        .build()
        .unwrap();

    let starts = Mutex::new(Vec::new());
    let progress = |event: ProgressEvent| {
        if let ProgressEvent::IterationStart { iteration, .. } = event {
            starts.lock().unwrap().push(iteration);
        }
    };
    let summary = focus_core::run_denoise(&config, &progress).unwrap();
    // only the root worker forwards progress
    assert_eq!(*starts.lock().unwrap(), vec![0, 1]);
    assert_eq!(summary.run_name, "FOCUSSIMRUN2");
    assert_eq!(summary.iterations.len(), 2);
    assert_eq!(summary.iterations[1].production_epochs, 3);
    assert!(summary.physical_map.values().iter().all(|v| v.is_finite()));

    let store = ArtifactStore::new(&output_dir, "FOCUSSIMRUN2");
    for kind in CalibrationKind::ALL {
        assert!(store.bias_path(kind, 1).exists());
    }
    assert!(store.cross_path(1).exists());
    assert!(store.output_stats_path(0).exists());
    assert!(store.config_path().exists());
    assert!(store.cache_path(focus_core::artifacts::CachedInput::Template).exists());
}
