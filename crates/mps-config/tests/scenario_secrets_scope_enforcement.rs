//! Scenario: Credential resolution fails closed per scope
//!
//! # Test design
//! Failure cases use sentinel env var names (`MPS_SCN_SENTINEL_*`) that are
//! never set anywhere, so no test mutates the process environment.
//!
//! # Invariants under test
//!
//! 1. DAEMON requires marketplace and trigger credentials.
//! 2. MARKETPLACE requires marketplace credentials only.
//! 3. OFFLINE requires nothing.
//! 4. Errors name the env var, never a value.
//! 5. `Debug` output is redacted.
//! 6. `require_*` on an unresolved pair names the missing var.

use mps_config::{load_layered_yaml_from_strings, resolve_secrets, SecretsScope};

fn load(yaml: &str) -> serde_json::Value {
    load_layered_yaml_from_strings(&[yaml])
        .expect("test yaml must parse cleanly")
        .config_json
}

const ALL_SENTINELS: &str = r#"
marketplace:
  keys_env:
    user: "MPS_SCN_SENTINEL_MKT_USER_A1"
    password: "MPS_SCN_SENTINEL_MKT_PASS_A1"
daemon:
  keys_env:
    trigger_user: "MPS_SCN_SENTINEL_TRG_USER_A1"
    trigger_password: "MPS_SCN_SENTINEL_TRG_PASS_A1"
"#;

#[test]
fn daemon_scope_fails_on_first_missing_marketplace_var() {
    let msg = resolve_secrets(&load(ALL_SENTINELS), SecretsScope::Daemon)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("SECRETS_MISSING"), "got: {msg}");
    assert!(msg.contains("scope=DAEMON"), "got: {msg}");
    assert!(msg.contains("MPS_SCN_SENTINEL_MKT_USER_A1"), "got: {msg}");
}

#[test]
fn marketplace_scope_fails_without_marketplace_user() {
    let msg = resolve_secrets(&load(ALL_SENTINELS), SecretsScope::Marketplace)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("scope=MARKETPLACE"), "got: {msg}");
    assert!(msg.contains("MPS_SCN_SENTINEL_MKT_USER_A1"), "got: {msg}");
}

#[test]
fn offline_scope_needs_nothing() {
    let s = resolve_secrets(&load(ALL_SENTINELS), SecretsScope::Offline).unwrap();
    assert!(s.marketplace_user.is_none());
    assert!(s.trigger_password.is_none());
}

#[test]
fn require_helpers_name_the_missing_var() {
    let s = resolve_secrets(&load(ALL_SENTINELS), SecretsScope::Offline).unwrap();
    let msg = s.require_marketplace().unwrap_err().to_string();
    assert!(msg.contains("MPS_SCN_SENTINEL_MKT_USER_A1"), "got: {msg}");
    let msg = s.require_trigger().unwrap_err().to_string();
    assert!(msg.contains("MPS_SCN_SENTINEL_TRG_USER_A1"), "got: {msg}");
}

#[test]
fn resolves_from_an_env_var_that_is_always_set() {
    // PATH exists in every test environment; it stands in for a real credential.
    let yaml = r#"
marketplace:
  keys_env:
    user: "PATH"
    password: "PATH"
daemon:
  keys_env:
    trigger_user: "MPS_SCN_SENTINEL_TRG_USER_B2"
    trigger_password: "MPS_SCN_SENTINEL_TRG_PASS_B2"
"#;
    let cfg = load(yaml);

    let s = resolve_secrets(&cfg, SecretsScope::Marketplace).unwrap();
    let (user, _) = s.require_marketplace().unwrap();
    assert!(!user.is_empty());

    // same config still fails in daemon scope, on the trigger var
    let msg = resolve_secrets(&cfg, SecretsScope::Daemon)
        .unwrap_err()
        .to_string();
    assert!(msg.contains("MPS_SCN_SENTINEL_TRG_USER_B2"), "got: {msg}");
}

#[test]
fn debug_output_is_redacted() {
    let yaml = r#"
marketplace:
  keys_env:
    user: "PATH"
    password: "PATH"
"#;
    let s = resolve_secrets(&load(yaml), SecretsScope::Offline).unwrap();
    let path = std::env::var("PATH").unwrap();
    let dbg = format!("{s:?}");
    assert!(dbg.contains("<REDACTED>"), "got: {dbg}");
    assert!(!dbg.contains(&path), "debug output leaked a value");
}
