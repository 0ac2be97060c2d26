use assert_cmd::Command;
use predicates::str::contains;
use std::error::Error;
use tempfile::tempdir;

fn focus_cmd() -> Command {
    let mut cmd = Command::cargo_bin("focus").expect("Failed to find focus binary");
    for var in ["FOCUS_WORKERS", "FOCUS_LOG_DIR", "FOCUS_DATA_DIR", "FOCUS_OUTPUT_DIR", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    focus_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("denoise"))
        .stdout(contains("synthesize"))
        .stdout(contains("simulate"));
}

#[test]
fn test_denoise_rejects_invalid_nside() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    focus_cmd()
        .args(["denoise", "SIMMAP", "--nside", "48"])
        .arg("--data-dir")
        .arg(dir.path())
        .arg("--output-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("nside must be a power of two"));
    Ok(())
}

#[test]
fn test_denoise_reports_missing_inputs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    focus_cmd()
        .args(["denoise", "NOTHERE", "--nside", "2", "--realizations", "1"])
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--output-dir")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(contains("NOTHERE"));
    Ok(())
}

#[test]
fn test_simulate_then_denoise() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let data = dir.path().join("data");
    let out = dir.path().join("out");

    focus_cmd()
        .args(["simulate", "--name", "SIMMAP", "--input-nside", "4", "--realizations", "2"])
        .arg("--output-dir")
        .arg(&data)
        .assert()
        .success();
    assert!(data.join("SIMMAP_MONO.json").exists());
    assert!(data.join("SIMMAP_NOISE001_hm2.json").exists());

    let config = dir.path().join("run.json");
    std::fs::write(
        &config,
        r#"{ "schedule": { "calibration_epochs": 1, "production_step": 1, "eval_frequency": 1 } }"#,
    )?;

    focus_cmd()
        .args(["denoise", "SIMMAP", "--nside", "2", "--realizations", "2", "--iterations", "1", "--steps", "1"])
        .args(["--masks", "MASK_ALL.json,MASK_HIGHLAT.json", "--workers", "3"])
        .arg("--data-dir")
        .arg(&data)
        .arg("--output-dir")
        .arg(&out)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    assert!(out.join("FOCUSSIMMAP2result_0.json").exists());
    assert!(out.join("FOCUSSIMMAP2log_0.json").exists());
    assert!(out.join("FOCUSSIMMAP2_isig3_0.json").exists());
    Ok(())
}

#[test]
fn test_synthesize_writes_map_and_history() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input.json");
    let output = dir.path().join("synth.json");
    let values: Vec<String> = (0..192).map(|p| format!("{}", (p as f64 * 0.1).sin())).collect();
    std::fs::write(&input, format!("[{}]", values.join(",")))?;

    focus_cmd()
        .args(["synthesize", "--nside", "2", "--steps", "3", "--xstat"])
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert!(output.exists());
    let history = std::fs::read_to_string(dir.path().join("synth.json.log.json"))?;
    assert_eq!(history.matches(',').count(), 2);
    Ok(())
}

#[test]
fn test_log_dir_writes_a_log_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let logs = dir.path().join("logs");
    focus_cmd()
        .args(["simulate", "--input-nside", "2", "--realizations", "1"])
        .arg("--output-dir")
        .arg(dir.path().join("data"))
        .arg("--log-dir")
        .arg(&logs)
        .assert()
        .success();

    let entries: Vec<_> = std::fs::read_dir(&logs)?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1);
    let text = std::fs::read_to_string(entries[0].path())?;
    assert!(text.contains("Dataset SIMMAP written"));
    Ok(())
}
