mod common;

use common::synthetic_image::{disc_on_background, write_png};
use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_foreground_probe"))
}

#[test]
fn wrong_argument_count_prints_usage_and_fails() {
    let output = binary().output().expect("binary runs");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));

    let output = binary().args(["a.png", "b.png"]).output().expect("binary runs");
    assert!(!output.status.success());
}

#[test]
fn missing_file_fails_without_scores() {
    let output = binary().arg("/no/such/file.png").output().expect("binary runs");
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Probability Score"), "stdout: {stdout}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Could not open or find the image!"));
}

#[test]
fn valid_image_prints_three_scores() {
    let path = write_png(&disc_on_background(120, 30.0), "cli");
    let output = binary().arg(&path).output().expect("binary runs");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let score = |label: &str| -> f64 {
        stdout
            .lines()
            .find_map(|line| line.strip_prefix(label))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or_else(|| panic!("missing `{label}` in:\n{stdout}"))
    };

    let foreground = score("Foreground Probability Score:");
    let background = score("Background Probability Score:");
    let edge_weighted = score("Edge-Weighted Foreground Score:");
    assert!((0.0..=1.0).contains(&foreground));
    assert!((foreground + background - 1.0).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&edge_weighted));
    assert!(stdout.contains("Loaded image with size: 120 x 120"));
}
