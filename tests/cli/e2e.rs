use std::process::Command;

const CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/encoder.yaml");

#[test]
fn cli_stream_matches_full_run() {
    let output = Command::new(env!("CARGO_BIN_EXE_sruppt"))
        .args(["stream", "--config", CONFIG, "--steps", "10", "--chunk", "3"])
        .output()
        .expect("run sruppt stream");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("drain: emitted 3"));
    let summary = stdout
        .lines()
        .find(|line| line.starts_with("emitted 10 of 10 steps"))
        .expect("summary line");
    let diff: f32 = summary
        .rsplit("= ")
        .next()
        .and_then(|value| value.trim().parse().ok())
        .expect("max diff");
    assert!(diff < 1e-4, "stream diverged: {summary}");
}

#[test]
fn cli_stream_rejects_zero_chunk() {
    let output = Command::new(env!("CARGO_BIN_EXE_sruppt"))
        .args(["stream", "--config", CONFIG, "--chunk", "0"])
        .output()
        .expect("run sruppt stream");
    assert!(!output.status.success());
}
