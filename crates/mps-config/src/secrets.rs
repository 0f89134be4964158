//! Runtime credential resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"MPS_MARKETPLACE_USER"`).
//! - Binaries call [`resolve_secrets`] once at startup and pass the result into
//!   constructors; no other module reads credentials from the environment.
//! - `Debug` redacts every value.
//! - Error messages name the env var, never its value.
//!
//! # Scope enforcement
//! - `Daemon`:      marketplace user/password and trigger user/password are **required**.
//! - `Marketplace`: marketplace user/password are **required** (CLI passes).
//! - `Offline`:     nothing required (CLI db/watermark/config commands).

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_MARKETPLACE_USER_ENV: &str = "MPS_MARKETPLACE_USER";
pub const DEFAULT_MARKETPLACE_PASSWORD_ENV: &str = "MPS_MARKETPLACE_PASSWORD";
pub const DEFAULT_TRIGGER_USER_ENV: &str = "MPS_TRIGGER_USER";
pub const DEFAULT_TRIGGER_PASSWORD_ENV: &str = "MPS_TRIGGER_PASSWORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsScope {
    Daemon,
    Marketplace,
    Offline,
}

impl SecretsScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretsScope::Daemon => "DAEMON",
            SecretsScope::Marketplace => "MARKETPLACE",
            SecretsScope::Offline => "OFFLINE",
        }
    }
}

/// Credentials resolved from the environment. **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub marketplace_user: Option<String>,
    pub marketplace_password: Option<String>,
    /// Basic-auth pair the storefront presents on the trigger endpoint.
    pub trigger_user: Option<String>,
    pub trigger_password: Option<String>,
    names: SecretEnvNames,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "marketplace_user",
                &self.marketplace_user.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "marketplace_password",
                &self.marketplace_password.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "trigger_user",
                &self.trigger_user.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "trigger_password",
                &self.trigger_password.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl ResolvedSecrets {
    /// `(user, password)` for the marketplace API.
    pub fn require_marketplace(&self) -> Result<(String, String)> {
        Ok((
            require(&self.marketplace_user, &self.names.marketplace_user_var)?,
            require(&self.marketplace_password, &self.names.marketplace_password_var)?,
        ))
    }

    /// `(user, password)` accepted on the trigger endpoint.
    pub fn require_trigger(&self) -> Result<(String, String)> {
        Ok((
            require(&self.trigger_user, &self.names.trigger_user_var)?,
            require(&self.trigger_password, &self.names.trigger_password_var)?,
        ))
    }
}

fn require(v: &Option<String>, var: &str) -> Result<String> {
    match v {
        Some(s) => Ok(s.clone()),
        None => bail!("SECRETS_MISSING: required env var '{}' is not set or empty", var),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct SecretEnvNames {
    marketplace_user_var: String,
    marketplace_password_var: String,
    trigger_user_var: String,
    trigger_password_var: String,
}

/// Non-blank string at `pointer`, trimmed.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        marketplace_user_var: read_str_at(config_json, "/marketplace/keys_env/user")
            .unwrap_or_else(|| DEFAULT_MARKETPLACE_USER_ENV.to_string()),
        marketplace_password_var: read_str_at(config_json, "/marketplace/keys_env/password")
            .unwrap_or_else(|| DEFAULT_MARKETPLACE_PASSWORD_ENV.to_string()),
        trigger_user_var: read_str_at(config_json, "/daemon/keys_env/trigger_user")
            .unwrap_or_else(|| DEFAULT_TRIGGER_USER_ENV.to_string()),
        trigger_password_var: read_str_at(config_json, "/daemon/keys_env/trigger_password")
            .unwrap_or_else(|| DEFAULT_TRIGGER_PASSWORD_ENV.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve every credential named by `config_json` and enforce the ones
/// `scope` requires.
///
/// # Errors
/// Returns the **env var NAME** of the first missing required variable.
pub fn resolve_secrets(config_json: &Value, scope: SecretsScope) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let resolved = ResolvedSecrets {
        marketplace_user: resolve_env(&names.marketplace_user_var),
        marketplace_password: resolve_env(&names.marketplace_password_var),
        trigger_user: resolve_env(&names.trigger_user_var),
        trigger_password: resolve_env(&names.trigger_password_var),
        names,
    };

    let n = &resolved.names;
    let marketplace = [
        (&resolved.marketplace_user, n.marketplace_user_var.as_str(), "marketplace user"),
        (
            &resolved.marketplace_password,
            n.marketplace_password_var.as_str(),
            "marketplace password",
        ),
    ];
    let trigger = [
        (&resolved.trigger_user, n.trigger_user_var.as_str(), "trigger user"),
        (
            &resolved.trigger_password,
            n.trigger_password_var.as_str(),
            "trigger password",
        ),
    ];
    let required: Vec<(&Option<String>, &str, &str)> = match scope {
        SecretsScope::Daemon => marketplace.into_iter().chain(trigger).collect(),
        SecretsScope::Marketplace => marketplace.into_iter().collect(),
        SecretsScope::Offline => Vec::new(),
    };

    for (value, var, what) in required {
        if value.is_none() {
            bail!(
                "SECRETS_MISSING scope={}: required env var '{}' ({}) is not set or empty",
                scope.as_str(),
                var,
                what,
            );
        }
    }

    Ok(resolved)
}
