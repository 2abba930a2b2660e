use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_triago"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "triago init failed: {}", String::from_utf8_lossy(&output.stderr));

    let config_path = dir.path().join(".triago.toml");
    assert!(config_path.exists(), ".triago.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[tracker]"));
    assert!(content.contains("[scoring.weights]"));

    // Verify it's valid TOML that triago-core can parse
    let _config: triago_core::TriagoConfig = toml::from_str(&content).unwrap();
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".triago.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_triago"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn bare_invocation_prints_welcome() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_triago"))
        .arg("--color")
        .arg("never")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("triago v"));
    assert!(stdout.contains("Quick start:"));
}
