//! Configuration loading from TOML files
//!
//! The binary picks the file with `--config <path>`, then the `CONFIG_FILE`
//! environment variable, then `config/dev.toml`. A file that cannot be read
//! falls back to defaults.
//!
//! Conversions API credentials may also come from `META_PIXEL_ID` and
//! `META_CAPI_ACCESS_TOKEN`, which take precedence over the file. Missing
//! credentials disable dispatch.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const PIXEL_ID_ENV: &str = "META_PIXEL_ID";
pub const ACCESS_TOKEN_ENV: &str = "META_CAPI_ACCESS_TOKEN";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CapiSection {
    #[serde(default)]
    pub pixel_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Routes events to the platform's test pipeline
    #[serde(default)]
    pub test_event_code: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_capi_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_version() -> String {
    "v21.0".to_string()
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_capi_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClassifierSection {
    /// JSON file with custom bot rules
    #[serde(default)]
    pub rules_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSection {
    /// Step name whose selected value is the monthly budget answer
    #[serde(default = "default_budget_step")]
    pub budget_step: String,
    /// Selected values that disqualify a lead (case-insensitive)
    #[serde(default)]
    pub disqualify_values: Vec<String>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self { budget_step: default_budget_step(), disqualify_values: Vec::new() }
    }
}

fn default_budget_step() -> String {
    "budget".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressSection {
    /// File path for processed event records (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressSection {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "processed_events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSection {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub capi: CapiSection,
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub egress: EgressSection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    pixel_id: Option<String>,
    access_token: Option<String>,
    test_event_code: Option<String>,
    api_version: String,
    capi_base_url: String,
    capi_timeout_ms: u64,
    rules_file: Option<String>,
    budget_step: String,
    disqualify_values: Vec<String>,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pixel_id: None,
            access_token: None,
            test_event_code: None,
            api_version: default_api_version(),
            capi_base_url: default_base_url(),
            capi_timeout_ms: default_capi_timeout_ms(),
            rules_file: None,
            budget_step: default_budget_step(),
            disqualify_values: Vec::new(),
            egress_file: default_egress_file(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

/// Treat blank strings as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            pixel_id: non_blank(toml_config.capi.pixel_id),
            access_token: non_blank(toml_config.capi.access_token),
            test_event_code: non_blank(toml_config.capi.test_event_code),
            api_version: toml_config.capi.api_version,
            capi_base_url: toml_config.capi.base_url,
            capi_timeout_ms: toml_config.capi.timeout_ms,
            rules_file: non_blank(toml_config.classifier.rules_file),
            budget_step: toml_config.scoring.budget_step,
            disqualify_values: toml_config.scoring.disqualify_values,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load from an explicit path, falling back to defaults if it cannot be read
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Apply credential overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_credential_overrides(env::var(PIXEL_ID_ENV).ok(), env::var(ACCESS_TOKEN_ENV).ok())
    }

    /// Override credentials when a non-blank value is given
    pub fn with_credential_overrides(
        mut self,
        pixel_id: Option<String>,
        access_token: Option<String>,
    ) -> Self {
        if let Some(id) = non_blank(pixel_id) {
            self.pixel_id = Some(id);
        }
        if let Some(token) = non_blank(access_token) {
            self.access_token = Some(token);
        }
        self
    }

    /// Both credentials present
    pub fn capi_enabled(&self) -> bool {
        self.pixel_id.is_some() && self.access_token.is_some()
    }

    /// Check whether a selected value disqualifies the lead
    pub fn is_disqualifying(&self, selected_value: &str) -> bool {
        let value = selected_value.trim();
        self.disqualify_values.iter().any(|d| d.trim().eq_ignore_ascii_case(value))
    }

    pub fn pixel_id(&self) -> Option<&str> {
        self.pixel_id.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn test_event_code(&self) -> Option<&str> {
        self.test_event_code.as_deref()
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn capi_base_url(&self) -> &str {
        &self.capi_base_url
    }

    pub fn capi_timeout(&self) -> Duration {
        Duration::from_millis(self.capi_timeout_ms)
    }

    pub fn rules_file(&self) -> Option<&str> {
        self.rules_file.as_deref()
    }

    pub fn budget_step(&self) -> &str {
        &self.budget_step
    }

    pub fn disqualify_values(&self) -> &[String] {
        &self.disqualify_values
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the client at a mock server
    pub fn with_capi_base_url(mut self, base_url: &str) -> Self {
        self.capi_base_url = base_url.to_string();
        self
    }

    /// Builder method for tests to set disqualifying answers
    pub fn with_disqualify_values(mut self, values: &[&str]) -> Self {
        self.disqualify_values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}
