//! Layered application configuration.
//!
//! Precedence, lowest to highest: struct defaults, the YAML file passed
//! with `--config`, environment variables (`CUMULUS__` prefix, `__` as the
//! nesting separator), CLI overrides.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use emukit::context::Timeouts;
use emukit::contracts::EmulatorKind;
use emukit::telemetry::LoggingConfig;
use emulator_suite::SuiteSettings;

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_cache_dir() -> String {
    "~/.cumulus/cache".to_owned()
}

const fn default_readiness_timeout_ms() -> u64 {
    30_000
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_stop_grace_ms() -> u64 {
    2_000
}

const fn default_shutdown_grace_ms() -> u64 {
    5_000
}

/// Suite-wide settings shared by every emulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSection {
    pub host: String,
    /// Tilde-expanded before use.
    pub cache_dir: String,
    pub readiness_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub stop_grace_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for SuiteSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            cache_dir: default_cache_dir(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub suite: SuiteSection,
    pub logging: LoggingConfig,
    /// Per-emulator sections keyed by kind name (`database`, `firestore`,
    /// `functions`, `hosting`). Presence enables an emulator.
    pub emulators: BTreeMap<String, serde_json::Value>,
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// # Errors
    /// Fails when the YAML file or an env override does not match the
    /// schema.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed("CUMULUS__").split("__"));

        let config: AppConfig = figment
            .extract()
            .context("failed to load configuration")?;
        Ok(config)
    }

    pub fn apply_cli_overrides(&mut self, cache_dir: Option<&Path>, host: Option<&str>) {
        if let Some(dir) = cache_dir {
            self.suite.cache_dir = dir.display().to_string();
        }
        if let Some(host) = host {
            self.suite.host = host.to_owned();
        }
    }

    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            readiness: Duration::from_millis(self.suite.readiness_timeout_ms),
            connect_wait: Duration::from_millis(self.suite.connect_timeout_ms),
            stop_grace: Duration::from_millis(self.suite.stop_grace_ms),
            shutdown_grace: Duration::from_millis(self.suite.shutdown_grace_ms),
        }
    }

    #[must_use]
    pub fn suite_settings(&self) -> SuiteSettings {
        SuiteSettings {
            host: self.suite.host.clone(),
            cache_dir: expand_tilde(&self.suite.cache_dir),
        }
    }

    /// Effective configuration as pretty JSON, for `--print-config`.
    ///
    /// # Errors
    /// Serialization failures only.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to render configuration")
    }
}

/// Expand a leading `~/` against the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Adapter exposing per-emulator config sections to the suite builder.
pub struct AppConfigProvider {
    config: AppConfig,
}

impl AppConfigProvider {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl emukit::ConfigProvider for AppConfigProvider {
    fn emulator_config(&self, kind: EmulatorKind) -> Option<&serde_json::Value> {
        self.config.emulators.get(kind.as_str())
    }
}
