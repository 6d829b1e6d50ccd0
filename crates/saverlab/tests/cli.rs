use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn saverlab(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_saverlab"))
        .env("SAVERLAB_CONFIG_DIR", root.join("config"))
        .env("SAVERLAB_DATA_DIR", root.join("data"))
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run saverlab")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_json_names_the_builtin_modules() {
    let root = TempDir::new().unwrap();
    let output = saverlab(root.path(), &["list", "--json"]);
    assert!(output.status.success());

    let listings: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let titles: Vec<&str> = listings
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Plasma", "Starfield", "Bouncing Boxes"]);
}

#[test]
fn prefs_set_persists_and_validates() {
    let root = TempDir::new().unwrap();
    let output = saverlab(root.path(), &["prefs", "set", "recording.create_movie", "false"]);
    assert!(output.status.success(), "{output:?}");
    assert!(root.path().join("config/preferences.toml").exists());

    let shown = saverlab(root.path(), &["prefs", "show"]);
    assert!(shown.status.success());
    assert!(stdout(&shown).contains("create_movie = false"));

    let rejected = saverlab(root.path(), &["prefs", "set", "recording.custom_frame_rate", "0"]);
    assert!(!rejected.status.success());

    let reset = saverlab(root.path(), &["prefs", "reset"]);
    assert!(reset.status.success());
    assert!(stdout(&saverlab(root.path(), &["prefs"])).contains("create_movie = true"));
}

#[test]
fn where_reports_overridden_directories() {
    let root = TempDir::new().unwrap();
    let output = saverlab(root.path(), &["where"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(&root.path().join("config").display().to_string()));
    assert!(text.contains(&root.path().join("data/state.toml").display().to_string()));
}

#[test]
fn record_writes_an_image_sequence() {
    let root = TempDir::new().unwrap();
    let take = root.path().join("take");
    let output = saverlab(
        root.path(),
        &[
            "record",
            "plasma",
            "--frames",
            "4",
            "--size",
            "32x24",
            "--no-movie",
            "--json",
            "--output",
            take.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{output:?}");

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["frames"], 4);
    assert_eq!(report["dropped"], 0);
    assert_eq!(report["frame_rate"], 30);
    assert_eq!(report["images_kept"], true);
    assert!(report["movie"].is_null());

    let mut names: Vec<String> = fs::read_dir(&take)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["frame_000000.png", "frame_000001.png", "frame_000002.png", "frame_000003.png"]
    );
}

#[test]
fn record_unknown_module_fails() {
    let root = TempDir::new().unwrap();
    let output = saverlab(root.path(), &["record", "fireworks", "--frames", "1"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("fireworks"));
}

#[test]
fn run_without_modules_or_saved_windows_fails() {
    let root = TempDir::new().unwrap();
    let output = saverlab(root.path(), &["run"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no module given"));
}
