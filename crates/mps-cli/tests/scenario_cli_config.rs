//! Scenario: `mps config` commands
//!
//! # Invariants under test
//!
//! 1. `config hash` prints the same hash for the same layered input and a
//!    different one once an overlay changes a value.
//! 2. A credential literal anywhere in the config fails the command.
//! 3. `config check` passes on the shipped default and fails on a typo'd key.
//! 4. `--help` lists every top-level command.

use std::fs;
use std::path::PathBuf;

use predicates::prelude::*;

fn shipped_default() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("default.yaml")
}

fn hash_of(args: &[&str]) -> anyhow::Result<String> {
    let out = assert_cmd::Command::cargo_bin("mps")?
        .args(["config", "hash"])
        .args(args)
        .output()?;
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout)?;
    let line = stdout
        .lines()
        .find(|l| l.starts_with("config_hash="))
        .ok_or_else(|| anyhow::anyhow!("no config_hash line"))?;
    Ok(line.trim_start_matches("config_hash=").to_string())
}

#[test]
fn config_hash_is_stable_and_overlay_sensitive() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let base = shipped_default();
    let base_s = base.to_string_lossy().to_string();

    let overlay = dir.path().join("site.yaml");
    fs::write(&overlay, "engine:\n  audit_corrective: false\n")?;
    let overlay_s = overlay.to_string_lossy().to_string();

    let a = hash_of(&[&base_s])?;
    let b = hash_of(&[&base_s])?;
    let c = hash_of(&[&base_s, &overlay_s])?;
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    Ok(())
}

#[test]
fn secret_literal_fails_config_hash() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let bad = dir.path().join("bad.yaml");
    fs::write(&bad, "marketplace:\n  auth_header: \"Basic c2hvcDpwdw==\"\n")?;

    assert_cmd::Command::cargo_bin("mps")?
        .args(["config", "hash", &bad.to_string_lossy()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("c2hvcDpwdw").not());
    Ok(())
}

#[test]
fn config_check_flags_unused_keys() -> anyhow::Result<()> {
    let base = shipped_default();
    assert_cmd::Command::cargo_bin("mps")?
        .args(["config", "check", &base.to_string_lossy()])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_ok=true"));

    let dir = tempfile::tempdir()?;
    let typo = dir.path().join("typo.yaml");
    fs::write(&typo, "marketplce:\n  timeout_secs: 10\n")?;

    assert_cmd::Command::cargo_bin("mps")?
        .args([
            "config",
            "check",
            &base.to_string_lossy(),
            &typo.to_string_lossy(),
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("/marketplce/timeout_secs"));
    Ok(())
}

#[test]
fn help_lists_commands() -> anyhow::Result<()> {
    let assert = assert_cmd::Command::cargo_bin("mps")?.arg("--help").assert().success();
    let out = String::from_utf8(assert.get_output().stdout.clone())?;
    for cmd in ["db", "config", "watermark", "once", "trigger"] {
        assert!(out.contains(cmd), "missing command {cmd} in:\n{out}");
    }
    Ok(())
}
