use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_zoom_defaults_to_normal() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", dir.path())
        .arg("zoom")
        .assert()
        .success()
        .stdout(predicate::str::diff("zoom-normal\n"));
}

#[test]
fn test_zoom_steps_persist_and_saturate() {
    let dir = tempdir().unwrap();

    for expected in ["zoom-large", "zoom-extra-large", "zoom-extra-large"] {
        cargo_bin_cmd!("pagechat")
            .env("PAGECHAT_HOME", dir.path())
            .args(["zoom", "in"])
            .assert()
            .success()
            .stdout(predicate::str::diff(format!("{expected}\n")));
    }

    let stored = fs::read_to_string(dir.path().join("store").join("preferences.json")).unwrap();
    assert!(stored.contains("zoom-extra-large"));

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", dir.path())
        .args(["zoom", "out"])
        .assert()
        .success()
        .stdout(predicate::str::diff("zoom-large\n"));
}

#[test]
fn test_zoom_set_rejects_unknown_level() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", dir.path())
        .args(["zoom", "set", "small"])
        .assert()
        .success()
        .stdout(predicate::str::diff("zoom-small\n"));

    cargo_bin_cmd!("pagechat")
        .env("PAGECHAT_HOME", dir.path())
        .args(["zoom", "set", "huge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown zoom level"));
}
