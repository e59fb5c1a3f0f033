use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Command isolated from the user's config and keyring
fn passcache(temp: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("passcache"));
    cmd.arg("--config")
        .arg(temp.join("config.yaml"))
        .arg("--keyring")
        .arg(temp.join("keyrings.db"))
        .env_remove("PASSCACHE_CONFIG")
        .env_remove("PASSCACHE_KEYRING")
        .env_remove("PASSCACHE_FORMAT")
        .env_remove("PASSCACHE_DEBUG");
    cmd
}

fn write_config(temp: &Path) -> PathBuf {
    let path = temp.join("config.yaml");
    fs::write(
        &path,
        "preferences:\n  cache_ttl_seconds: 600\n  cache_by_subkey: true\n",
    )
    .expect("failed to write config");
    path
}

#[test]
fn version_prints_package_version() {
    let temp = tempdir().unwrap();
    passcache(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn keyring_add_then_list_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;

    passcache(temp.path())
        .args(["keyring", "add", "0x2a", "--user-id", "Alice <alice@example.org>"])
        .args(["--subkey", "99:passphrase:s"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored keyring"));

    let assert = passcache(temp.path())
        .args(["--format", "json", "keyring", "list"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let records = json["data"].as_array().expect("data array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["master_key_id"], 42);
    assert_eq!(records[0]["subkeys"].as_array().map(Vec::len), Some(2));
    assert_eq!(records[0]["subkeys"][1]["can_sign"], true);

    Ok(())
}

#[test]
fn keyring_remove_unknown_fails() {
    let temp = tempdir().unwrap();
    passcache(temp.path())
        .args(["keyring", "remove", "0x1234"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn keyring_add_rejects_bad_subkey() {
    let temp = tempdir().unwrap();
    passcache(temp.path())
        .args(["keyring", "add", "42", "--subkey", "99:passphrase:x"])
        .assert()
        .failure();
}

#[test]
fn status_reports_config_and_preferences() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path());

    let assert = passcache(temp.path())
        .args(["--format", "json", "status"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let data = &json["data"];
    assert_eq!(data["config_path"], config_path.display().to_string());
    assert_eq!(data["config_found"], true);
    assert_eq!(data["preferences"]["cache_ttl_seconds"], 600);
    assert_eq!(data["preferences"]["cache_by_subkey"], true);
    // Status must not create the keyring database
    assert!(data.get("keyrings").is_none());
    assert!(!temp.path().join("keyrings.db").exists());

    Ok(())
}

#[test]
fn parse_splits_armored_blocks() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let input = temp.path().join("mail.txt");
    fs::write(
        &input,
        "Hi Bob,\n\n-----BEGIN PGP MESSAGE-----\n\nhQEMA1234\n-----END PGP MESSAGE-----\nCheers\n",
    )?;

    let assert = passcache(temp.path())
        .args(["--format", "json", "parse"])
        .arg(&input)
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let data = &json["data"];
    assert_eq!(data["state"], "succeeded");
    let kinds: Vec<&str> = data["output"]
        .as_array()
        .expect("blocks")
        .iter()
        .filter_map(|b| b["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"message"));
    assert!(kinds.contains(&"text"));

    Ok(())
}

#[test]
fn parse_missing_file_fails() {
    let temp = tempdir().unwrap();
    passcache(temp.path())
        .args(["parse", "does-not-exist.txt"])
        .assert()
        .failure();
}

#[test]
fn bench_runs_small_benchmark() {
    let temp = tempdir().unwrap();
    passcache(temp.path())
        .args(["--format", "json", "bench", "--iterations", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"iterations\": 16"))
        .stdout(predicate::str::contains("s2k_coded_count"));
}
