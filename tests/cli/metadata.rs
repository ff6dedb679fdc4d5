use std::process::Command;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/encoder.yaml");

#[test]
fn cli_describes_layer_layout() {
    let output = Command::new(env!("CARGO_BIN_EXE_sruppt"))
        .args(["describe", "--config", CONFIG])
        .output()
        .expect("run sruppt describe");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("encoder: 3 layers"));
    assert!(stdout.contains("layer 0: linear transform"));
    assert!(stdout.contains("layer 1: attention transform"));
    assert!(stdout.contains("total_right_window: 3"));
}

#[test]
fn cli_rejects_unknown_config_fields() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    std::fs::write(&path, "encoder:\n  layers: 2\n").expect("write config");
    let output = Command::new(env!("CARGO_BIN_EXE_sruppt"))
        .args(["describe", "--config"])
        .arg(&path)
        .output()
        .expect("run sruppt describe");
    assert!(!output.status.success());
}
