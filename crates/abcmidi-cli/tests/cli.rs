//! End-to-end tests for the `abcmidi` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCALE: &str = "X:1\nT:Scale\nM:4/4\nL:1/8\nK:C\nCDEF GABc|\n";
const DUET: &str = "X:2\nT:Duet\nL:1/4\nV:1 name=\"Upper\"\nV:2 name=\"Lower\" clef=bass\nK:C\n\
                    V:1\ncdef|\nV:2\nC,4|\n";

fn write_abc(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, text).unwrap();
    path
}

/// Run in the temp dir with no ambient config leaking in
fn abcmidi(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("abcmidi").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env_remove("RUST_LOG")
        .env_remove("ABCMIDI_TICKS_PER_QUARTER")
        .env_remove("ABCMIDI_OUTPUT_DIR")
        .env_remove("ABCMIDI_LOG_LEVEL");
    cmd
}

fn division(path: &Path) -> u16 {
    let bytes = fs::read(path).unwrap();
    u16::from_be_bytes([bytes[12], bytes[13]])
}

#[test]
fn compile_writes_midi_beside_input() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);

    abcmidi(&dir)
        .arg("compile")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("scale.mid"))
        .stdout(predicate::str::contains("2 tracks"));

    let bytes = fs::read(dir.path().join("scale.mid")).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 2);
    assert_eq!(division(&dir.path().join("scale.mid")), 480);
}

#[test]
fn compile_with_explicit_output_and_division() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "duet.abc", DUET);
    let output = dir.path().join("out").join("duet.mid");

    abcmidi(&dir)
        .arg("compile")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--ticks-per-quarter")
        .arg("96")
        .assert()
        .success();

    let bytes = fs::read(&output).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 3);
    assert_eq!(division(&output), 96);
}

#[test]
fn compile_rejects_zero_division() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);

    abcmidi(&dir)
        .arg("compile")
        .arg(&input)
        .arg("--ticks-per-quarter")
        .arg("0")
        .assert()
        .failure();
}

#[test]
fn compile_missing_input_fails() {
    let dir = TempDir::new().unwrap();

    abcmidi(&dir)
        .arg("compile")
        .arg("nowhere.abc")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.abc"));
}

#[test]
fn compile_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);
    let out_dir = dir.path().join("rendered");
    let config = dir.path().join("custom.toml");
    fs::write(
        &config,
        format!(
            "[midi]\nticks_per_quarter = 240\n\n[output]\ndirectory = \"{}\"\n",
            out_dir.display()
        ),
    )
    .unwrap();

    abcmidi(&dir)
        .arg("--config")
        .arg(&config)
        .arg("compile")
        .arg(&input)
        .assert()
        .success();

    assert_eq!(division(&out_dir.join("scale.mid")), 240);
}

#[test]
fn local_config_and_env_override() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);
    fs::write(dir.path().join("abcmidi.toml"), "[midi]\nticks_per_quarter = 240\n").unwrap();

    abcmidi(&dir)
        .env("ABCMIDI_TICKS_PER_QUARTER", "120")
        .arg("compile")
        .arg(&input)
        .assert()
        .success();

    assert_eq!(division(&dir.path().join("scale.mid")), 120);
}

#[test]
fn bad_config_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[midi\n").unwrap();

    abcmidi(&dir)
        .arg("--config")
        .arg(&config)
        .arg("compile")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.toml"));
}

#[test]
fn check_clean_tune() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "scale.abc", SCALE);

    abcmidi(&dir)
        .arg("check")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 errors, 0 warnings"))
        .stdout(predicate::str::contains("V:1 1 (Acoustic Grand Piano)"));
}

#[test]
fn check_lists_voice_instruments() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(
        &dir,
        "band.abc",
        "X:1\nV:Lead program=73\nV:Bass instrument=acoustic_bass\nK:C\n[V:Lead]c[V:Bass]C,\n",
    );

    abcmidi(&dir)
        .arg("check")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("V:1 Lead (Flute)"))
        .stdout(predicate::str::contains("V:2 Bass (Acoustic Bass)"));
}

#[test]
fn compile_reports_shared_channels() {
    let dir = TempDir::new().unwrap();
    let body: String = (1..=16).map(|v| format!("[V:{}]C", v)).collect();
    let input = write_abc(&dir, "crowd.abc", &format!("X:1\nK:C\n{}\n", body));

    abcmidi(&dir)
        .arg("compile")
        .arg(&input)
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "warning: No free MIDI channel for voice '16', sharing channel 0",
        ));
}

#[test]
fn check_reports_errors_and_fails() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "bad.abc", "X:1\nM:7/banana\nK:C\nCD & E\n");

    abcmidi(&dir)
        .arg("check")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error (line 2"))
        .stderr(predicate::str::contains("warning (line 4"));
}

#[test]
fn check_json_output() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "bad.abc", "X:1\nL:oops\nK:C\nC\n");

    let output = abcmidi(&dir)
        .arg("check")
        .arg("--json")
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let feedback: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = feedback.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["level"], "Error");
    assert_eq!(entries[0]["line"], 2);
}

#[test]
fn tracks_prints_json() {
    let dir = TempDir::new().unwrap();
    let input = write_abc(&dir, "duet.abc", DUET);

    let output = abcmidi(&dir).arg("tracks").arg(&input).output().unwrap();
    assert!(output.status.success());

    let tracks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tracks = tracks.as_array().unwrap();
    assert_eq!(tracks.len(), 3);
    assert_eq!(tracks[0]["name"], "Duet");
    assert_eq!(tracks[1]["name"], "Upper");
    assert_eq!(tracks[2]["name"], "Lower");
    assert_eq!(tracks[2]["channel"], 1);
}

#[test]
fn config_shows_sources() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("abcmidi.toml"), "[telemetry]\nlog_level = \"warn\"\n").unwrap();

    abcmidi(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("# loaded abcmidi.toml"))
        .stdout(predicate::str::contains("log_level = \"warn\""))
        .stdout(predicate::str::contains("ticks_per_quarter = 480"));
}
