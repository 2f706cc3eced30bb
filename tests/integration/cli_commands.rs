#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[element]]
address = "/sensors"

[[element]]
address = "/sensors/temperature"
kind = "data"
writable = true

[[element]]
address = "/sensors/humidity"
kind = "data"

[[element]]
address = "/favourites"

[[link]]
source = "/favourites"
target = "/sensors/temperature"
identifier = "temp"
"#;

fn setup(manifest: &str) -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let manifest_path = dir.path().join("device.toml");
    fs::write(&manifest_path, manifest).expect("write manifest");
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[logging]\nlevel = \"warn\"\n").expect("write config");
    (dir, manifest_path, config_path)
}

fn json_output(args: &[&str], config: &PathBuf, manifest: &PathBuf) -> Value {
    let output = cargo_bin_cmd!("devtree")
        .arg("--config")
        .arg(config)
        .args(["--format", "json"])
        .args(&args[..1])
        .arg(manifest)
        .args(&args[1..])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn show_lists_every_attached_node() {
    let (_dir, manifest, config) = setup(MANIFEST);
    let value = json_output(&["show"], &config, &manifest);
    assert_eq!(value["root"], "device");
    let nodes = value["nodes"].as_array().expect("nodes");
    // root, sensors, 2 data elements with 3 + 2 generated, favourites
    assert_eq!(nodes.len(), 10);
    let addresses: Vec<&str> = nodes
        .iter()
        .filter_map(|n| n["address"].as_str())
        .collect();
    assert!(addresses.contains(&"device/sensors/temperature/setdata"));
    assert!(!addresses.contains(&"device/sensors/humidity/setdata"));
}

#[test]
fn show_text_renders_links() {
    let (_dir, manifest, config) = setup(MANIFEST);
    let output = cargo_bin_cmd!("devtree")
        .arg("--config")
        .arg(&config)
        .args(["--theme", "plain", "show"])
        .arg(&manifest)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("temperature [data] device/sensors/temperature"));
    assert!(text.contains("temp => device/sensors/temperature"));
}

#[test]
fn resolve_reports_canonical_addresses() {
    let (_dir, manifest, config) = setup(MANIFEST);
    let value = json_output(
        &["resolve", "/FAVOURITES/temp", "device/sensors/humidity"],
        &config,
        &manifest,
    );
    let results = value.as_array().expect("array");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["canonical"], "device/sensors/temperature");
    assert_eq!(results[0]["kind"], "data");
    assert_eq!(results[1]["canonical"], "device/sensors/humidity");
}

#[test]
fn resolve_exits_nonzero_for_unknown_addresses() {
    let (_dir, manifest, config) = setup(MANIFEST);
    cargo_bin_cmd!("devtree")
        .arg("--config")
        .arg(&config)
        .arg("resolve")
        .arg(&manifest)
        .arg("/sensors/pressure")
        .assert()
        .code(2);
}

#[test]
fn verify_passes_for_manifest_trees() {
    let (_dir, manifest, config) = setup(MANIFEST);
    let value = json_output(&["verify"], &config, &manifest);
    assert_eq!(value["success"], true);
    assert_eq!(value["counts"]["link_edges"], 1);
    assert!(value["findings"].as_array().expect("findings").is_empty());
}

#[test]
fn config_root_identifier_is_used() {
    let (dir, manifest, _) = setup(MANIFEST);
    let config = dir.path().join("gateway.toml");
    fs::write(&config, "[tree]\nroot = \"gateway\"\n").expect("write config");
    let value = json_output(&["resolve", "gateway/sensors"], &config, &manifest);
    assert_eq!(value[0]["canonical"], "gateway/sensors");
}

#[test]
fn invalid_manifest_fails_with_message() {
    let (_dir, manifest, config) = setup("[[element]]\naddress = \"/a/b\"\n");
    let output = cargo_bin_cmd!("devtree")
        .arg("--config")
        .arg(&config)
        .arg("show")
        .arg(&manifest)
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("not found"), "{text}");
}

#[test]
fn completions_are_generated() {
    cargo_bin_cmd!("devtree")
        .args(["completions", "bash"])
        .assert()
        .success();
}
