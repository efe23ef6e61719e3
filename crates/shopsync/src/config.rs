//! Configuration for shopsync
//!
//! One YAML file describes both remote systems, the two sync streams and
//! process settings. `${VAR}` and `${VAR:-default}` are expanded from the
//! environment before parsing.

use crate::connectors::mailbluster::MailBlusterConfig;
use crate::connectors::shopware::ShopwareConfig;
use crate::dispatcher::DispatcherConfig;
use crate::poller::PollerConfig;
use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use validator::Validate;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct SyncConfig {
    /// Shop the records are read from
    #[validate(nested)]
    pub shopware: ShopwareConfig,

    /// Marketing platform the records are pushed to
    #[validate(nested)]
    pub mailbluster: MailBlusterConfig,

    #[serde(default)]
    pub streams: StreamsConfig,

    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct StreamsConfig {
    /// Orders -> MailBluster orders
    #[serde(default)]
    pub orders: StreamConfig,

    /// Customers -> MailBluster leads
    #[serde(default)]
    pub customers: StreamConfig,
}

/// Polling and checkpoint settings of one stream
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StreamConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll period while pages come back non-empty (default: 1ms)
    #[serde(default = "default_active_poll_interval_ms")]
    pub active_poll_interval_ms: u64,

    /// Poll period after an empty page (default: 30s)
    #[serde(default = "default_empty_poll_backoff_ms")]
    pub empty_poll_backoff_ms: u64,

    /// Forget the cursor this often and rescan (orders only)
    #[serde(default)]
    pub cursor_reset_interval_ms: Option<u64>,

    /// How often the cursor is written to disk (default: 5s)
    #[serde(default = "default_checkpoint_interval_ms")]
    pub checkpoint_interval_ms: u64,

    /// Records requested ahead of the rate limiter (default: 16)
    #[serde(default = "default_prefetch")]
    pub prefetch: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            active_poll_interval_ms: default_active_poll_interval_ms(),
            empty_poll_backoff_ms: default_empty_poll_backoff_ms(),
            cursor_reset_interval_ms: None,
            checkpoint_interval_ms: default_checkpoint_interval_ms(),
            prefetch: default_prefetch(),
        }
    }
}

impl StreamConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poller: PollerConfig {
                active_interval: Duration::from_millis(self.active_poll_interval_ms),
                empty_interval: Duration::from_millis(self.empty_poll_backoff_ms),
                cursor_reset_interval: self.cursor_reset_interval_ms.map(Duration::from_millis),
            },
            prefetch: self.prefetch,
            checkpoint_interval: Duration::from_millis(self.checkpoint_interval_ms),
        }
    }

    fn validate(&self, name: &str) -> anyhow::Result<()> {
        let intervals = [
            ("active_poll_interval_ms", self.active_poll_interval_ms),
            ("empty_poll_backoff_ms", self.empty_poll_backoff_ms),
            ("checkpoint_interval_ms", self.checkpoint_interval_ms),
            ("prefetch", self.prefetch),
        ];
        for (field, value) in intervals {
            if value == 0 {
                anyhow::bail!("Stream '{}': {} must be greater than 0", name, field);
            }
        }
        if self.cursor_reset_interval_ms == Some(0) {
            anyhow::bail!(
                "Stream '{}': cursor_reset_interval_ms must be greater than 0",
                name
            );
        }
        Ok(())
    }
}

/// Process-wide settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GlobalSettings {
    /// Directory holding the cursor files (default: ./state)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_active_poll_interval_ms() -> u64 {
    1
}

fn default_empty_poll_backoff_ms() -> u64 {
    30_000
}

fn default_checkpoint_interval_ms() -> u64 {
    5_000
}

fn default_prefetch() -> u64 {
    16
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SyncConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let expanded = Self::expand_env_vars(content);

        let config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate_all()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Field rules plus the checks spanning several fields
    pub fn validate_all(&self) -> anyhow::Result<()> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("Config validation failed: {}", e))?;

        if self.shopware.password.is_empty() {
            anyhow::bail!("shopware.password must not be empty");
        }
        if self.mailbluster.api_key.is_empty() {
            anyhow::bail!("mailbluster.api_key must not be empty");
        }

        if let Some(pattern) = &self.mailbluster.campaign_pass_through_pattern {
            regex::Regex::new(pattern).map_err(|e| {
                anyhow::anyhow!("Invalid campaign_pass_through_pattern '{}': {}", pattern, e)
            })?;
        }

        self.streams.orders.validate("orders")?;
        self.streams.customers.validate("customers")?;
        if self.streams.customers.cursor_reset_interval_ms.is_some() {
            anyhow::bail!("Stream 'customers': cursor_reset_interval_ms is only supported for orders");
        }
        if !self.streams.orders.enabled && !self.streams.customers.enabled {
            tracing::warn!("Both streams are disabled, nothing will be synced");
        }

        Ok(())
    }

    /// JSON schema of the configuration file
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SyncConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
shopware:
  base_url: https://shop.example.com
  username: api
  password: secret
mailbluster:
  api_key: mb-key
  requests_per_minute: 60
"#;

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("SHOPSYNC_TEST_VAR", "hello");
        let content = "value: ${SHOPSYNC_TEST_VAR}";
        let expanded = SyncConfig::expand_env_vars(content);
        assert_eq!(expanded, "value: hello");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("SHOPSYNC_MISSING_VAR");
        let content = "value: ${SHOPSYNC_MISSING_VAR:-default_value}";
        let expanded = SyncConfig::expand_env_vars(content);
        assert_eq!(expanded, "value: default_value");
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = SyncConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.shopware.exported_attribute, "mbExported");
        assert_eq!(config.shopware.page_limit, 100);
        assert_eq!(config.mailbluster.rate_limit_period_ms, 65_000);
        assert!(config.streams.orders.enabled);
        assert!(config.streams.customers.enabled);
        assert_eq!(config.settings.state_dir, PathBuf::from("./state"));
        assert_eq!(config.settings.log_level, "info");

        let dispatcher = config.streams.orders.dispatcher_config();
        assert_eq!(dispatcher.prefetch, 16);
        assert_eq!(dispatcher.poller.active_interval, Duration::from_millis(1));
        assert_eq!(dispatcher.poller.empty_interval, Duration::from_secs(30));
        assert_eq!(dispatcher.checkpoint_interval, Duration::from_secs(5));
        assert!(dispatcher.poller.cursor_reset_interval.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
shopware:
  base_url: https://shop.example.com/shop
  username: api
  password: ${SHOPSYNC_UNSET_PASSWORD:-secret}
  order_filters:
    - property: status
      value: "2"
      expression: "="
  page_limit: 50
mailbluster:
  api_key: mb-key
  requests_per_minute: 30
  rate_limit_period_ms: 60000
  campaign_mappings:
    - partner: foobar
      campaign: 23
  campaign_pass_through_pattern: "mb-(\\d+)"
streams:
  orders:
    cursor_reset_interval_ms: 3600000
    prefetch: 4
  customers:
    enabled: false
settings:
  state_dir: /var/lib/shopsync
  log_level: debug
"#;
        let config = SyncConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.shopware.password.expose_secret(), "secret");
        assert_eq!(config.shopware.order_filters.len(), 1);
        assert_eq!(config.shopware.order_filters[0].expression, "=");
        assert_eq!(config.mailbluster.campaign_mappings[0].campaign, 23);
        assert!(!config.streams.customers.enabled);

        let orders = config.streams.orders.dispatcher_config();
        assert_eq!(
            orders.poller.cursor_reset_interval,
            Some(Duration::from_secs(3600))
        );
        assert_eq!(orders.prefetch, 4);
    }

    #[test]
    fn test_invalid_base_url() {
        let yaml = MINIMAL.replace("https://shop.example.com", "not a url");
        assert!(SyncConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let yaml = MINIMAL.replace("requests_per_minute: 60", "requests_per_minute: 0");
        assert!(SyncConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_customer_cursor_reset_rejected() {
        let yaml = format!(
            "{}streams:\n  customers:\n    cursor_reset_interval_ms: 1000\n",
            MINIMAL
        );
        let err = SyncConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("customers"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let yaml = format!(
            "{}streams:\n  orders:\n    empty_poll_backoff_ms: 0\n",
            MINIMAL
        );
        let err = SyncConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("empty_poll_backoff_ms"));
    }

    #[test]
    fn test_invalid_pass_through_pattern() {
        let yaml = format!("{}  campaign_pass_through_pattern: \"mb-(\"\n", MINIMAL);
        assert!(SyncConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_json_schema() {
        let schema = serde_json::to_value(SyncConfig::json_schema()).unwrap();
        let properties = &schema["properties"];
        assert!(properties.get("shopware").is_some());
        assert!(properties.get("mailbluster").is_some());
        assert!(properties.get("streams").is_some());
    }
}
