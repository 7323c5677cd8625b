use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "classpulse init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".classpulse.toml");
    assert!(config_path.exists(), ".classpulse.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[pipeline]"));
    assert!(content.contains("[semesters.25spring]"));

    // Must pass the same validation a run applies
    let config = classpulse_core::PulseConfig::from_toml(&content).unwrap();
    assert_eq!(config.semesters.len(), 3);
    let _raw: toml::Value = toml::from_str(&content).unwrap();
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".classpulse.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn offline_stage_without_snapshots_explains_prerequisite() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .args(["stage", "reconcile", "--semester", "25spring"])
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing"), "stderr: {stderr}");
    assert!(stderr.contains("roster"), "stderr: {stderr}");
}

#[test]
fn remote_stage_without_token_fails_before_io() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .args(["run", "--from", "activity"])
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!dir.path().join(".classpulse").exists());
}

#[test]
fn unknown_stage_is_rejected() {
    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .args(["stage", "fetch"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown stage"));
}

#[test]
fn assignments_without_token_fails() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classpulse"))
        .args(["assignments", "--classroom", "1296269"])
        .current_dir(dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GH_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("GITHUB_TOKEN"));
}
