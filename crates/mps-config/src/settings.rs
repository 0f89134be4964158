//! Typed view over the merged config document.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use mps_catalog::TranslatorConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub marketplace: MarketplaceSettings,
    pub storefront: TranslatorConfig,
    pub engine: EngineSettings,
    pub daemon: DaemonSettings,
    pub display: DisplaySettings,
}

impl SyncConfig {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: SyncConfig = serde_json::from_value(config_json.clone())
            .context("config does not match the SyncConfig schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.marketplace.base_url.trim().is_empty() {
            anyhow::bail!("CONFIG_INVALID marketplace.base_url is empty");
        }
        if self.marketplace.timeout_secs == 0 {
            anyhow::bail!("CONFIG_INVALID marketplace.timeout_secs must be > 0");
        }
        for (name, s) in [
            ("sync", &self.engine.sync),
            ("tickets", &self.engine.tickets),
            ("audit", &self.engine.audit),
        ] {
            if s.period_secs == 0 {
                anyhow::bail!("CONFIG_INVALID engine.{name}.period_secs must be > 0");
            }
        }
        if self.engine.ticket_deadline_secs == 0 {
            anyhow::bail!("CONFIG_INVALID engine.ticket_deadline_secs must be > 0");
        }
        if self.engine.max_item_rejections == 0 {
            anyhow::bail!("CONFIG_INVALID engine.max_item_rejections must be > 0");
        }
        self.display.tz()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Remote catalog size at which the audit logs a capacity warning.
    pub capacity_warn: usize,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.marketplace.example/v1".to_string(),
            timeout_secs: 30,
            capacity_warn: 500,
        }
    }
}

impl MarketplaceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// First run after `initial_delay_secs`, then every `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSchedule {
    pub initial_delay_secs: u64,
    pub period_secs: u64,
}

impl PassSchedule {
    pub const fn new(initial_delay_secs: u64, period_secs: u64) -> Self {
        Self {
            initial_delay_secs,
            period_secs,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub sync: PassSchedule,
    pub tickets: PassSchedule,
    pub audit: PassSchedule,
    pub ticket_deadline_secs: u64,
    /// When false the audit only reports drift.
    pub audit_corrective: bool,
    pub trigger_debounce_ms: u64,
    /// Receipt rejections after which an ID leaves the retry queue.
    pub max_item_rejections: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync: PassSchedule::new(60, 300),
            tickets: PassSchedule::new(120, 300),
            audit: PassSchedule::new(600, 1200),
            ticket_deadline_secs: 3600,
            audit_corrective: true,
            trigger_debounce_ms: 2000,
            max_item_rejections: 3,
        }
    }
}

impl EngineSettings {
    pub fn ticket_deadline(&self) -> Duration {
        Duration::from_secs(self.ticket_deadline_secs)
    }

    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_millis(self.trigger_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub bind_addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub timezone: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            timezone: "America/Sao_Paulo".to_string(),
        }
    }
}

impl DisplaySettings {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("CONFIG_INVALID display.timezone: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = SyncConfig::from_json(&json!({})).unwrap();
        assert_eq!(cfg, SyncConfig::default());
        assert_eq!(cfg.engine.sync, PassSchedule::new(60, 300));
        assert_eq!(cfg.engine.tickets, PassSchedule::new(120, 300));
        assert_eq!(cfg.engine.audit, PassSchedule::new(600, 1200));
        assert_eq!(cfg.engine.ticket_deadline(), Duration::from_secs(3600));
        assert!(cfg.engine.audit_corrective);
        assert_eq!(cfg.engine.max_item_rejections, 3);
        assert_eq!(cfg.storefront.installment_months, 3);
    }

    #[test]
    fn partial_sections_keep_sibling_defaults() {
        let cfg = SyncConfig::from_json(&json!({
            "engine": { "audit_corrective": false },
            "storefront": { "storefront_url": "https://loja.test" }
        }))
        .unwrap();
        assert!(!cfg.engine.audit_corrective);
        assert_eq!(cfg.engine.trigger_debounce_ms, 2000);
        assert_eq!(cfg.storefront.storefront_url, "https://loja.test");
        assert_eq!(cfg.storefront.cross_docking_days, 2);
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = SyncConfig::from_json(&json!({
            "engine": { "audit": { "initial_delay_secs": 1, "period_secs": 0 } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("engine.audit.period_secs"));
    }

    #[test]
    fn zero_rejection_limit_is_rejected() {
        let err = SyncConfig::from_json(&json!({ "engine": { "max_item_rejections": 0 } }))
            .unwrap_err();
        assert!(err.to_string().contains("engine.max_item_rejections"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let err = SyncConfig::from_json(&json!({ "display": { "timezone": "Mars/Olympus" } }))
            .unwrap_err();
        assert!(err.to_string().contains("display.timezone"));
    }

    #[test]
    fn default_timezone_parses() {
        assert_eq!(
            DisplaySettings::default().tz().unwrap(),
            chrono_tz::America::Sao_Paulo
        );
    }
}
