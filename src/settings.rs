use crate::cache::CacheConfig;
use crate::types::EvaluationOptions;
use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Deserializer};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Server {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Arweave gateway used for transaction tags and ownership queries.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Gateway {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default = "default_gateway_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_gateway_url() -> String {
    "https://arweave.net".to_string()
}
fn default_gateway_request_timeout_ms() -> u64 {
    10_000
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            request_timeout_ms: default_gateway_request_timeout_ms(),
        }
    }
}

/// Remote evaluation engine.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Evaluator {
    #[serde(default = "default_evaluator_url")]
    pub url: String,
    #[serde(default = "default_evaluator_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_evaluator_url() -> String {
    "https://dre-1.warp.cc".to_string()
}
fn default_evaluator_request_timeout_ms() -> u64 {
    60_000
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            url: default_evaluator_url(),
            request_timeout_ms: default_evaluator_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CacheSettings {
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: u64,
    #[serde(default = "default_state_capacity")]
    pub state_capacity: usize,
    #[serde(default = "default_manifest_ttl_seconds")]
    pub manifest_ttl_seconds: u64,
    #[serde(default = "default_manifest_capacity")]
    pub manifest_capacity: usize,
}

fn default_state_ttl_seconds() -> u64 {
    30 // roughly a quarter of a block interval
}
fn default_state_capacity() -> usize {
    100
}
fn default_manifest_ttl_seconds() -> u64 {
    365 * 24 * 60 * 60
}
fn default_manifest_capacity() -> usize {
    1000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            state_ttl_seconds: default_state_ttl_seconds(),
            state_capacity: default_state_capacity(),
            manifest_ttl_seconds: default_manifest_ttl_seconds(),
            manifest_capacity: default_manifest_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Evaluation {
    #[serde(default = "default_evaluation_timeout_ms")]
    pub timeout_ms: u64,
    /// Used for contracts whose manifest declares no evaluation options.
    /// Written as a JSON object string; the config loader lowercases table
    /// keys, which would mangle camelCase option names.
    #[serde(default, deserialize_with = "options_from_json")]
    pub default_options: EvaluationOptions,
}

fn options_from_json<'de, D>(deserializer: D) -> Result<EvaluationOptions, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.trim().is_empty() {
        return Ok(EvaluationOptions::default());
    }
    serde_json::from_str(&raw).map_err(serde::de::Error::custom)
}

fn default_evaluation_timeout_ms() -> u64 {
    10_000
}

impl Default for Evaluation {
    fn default() -> Self {
        Self {
            timeout_ms: default_evaluation_timeout_ms(),
            default_options: EvaluationOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub gateway: Gateway,
    #[serde(default)]
    pub evaluator: Evaluator,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub evaluation: Evaluation,
}

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then applies
    /// environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;
        Self::finish(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        Self::finish(s)
    }

    /// Parses settings from TOML text. Environment overrides are not applied.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn finish(s: Config) -> Result<Self, ConfigError> {
        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `PORT`, `GATEWAY_URL`, `EVALUATOR_URL`, `EVALUATION_TIMEOUT_MS`
    /// and `DEFAULT_EVALUATION_OPTIONS` (JSON object) from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(raw) = non_empty("PORT") {
            match raw.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => warn!("Ignoring PORT={}: {}", raw, e),
            }
        }
        if let Some(url) = non_empty("GATEWAY_URL") {
            self.gateway.url = url;
        }
        if let Some(url) = non_empty("EVALUATOR_URL") {
            self.evaluator.url = url;
        }
        if let Some(raw) = non_empty("EVALUATION_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => self.evaluation.timeout_ms = ms,
                Err(e) => warn!("Ignoring EVALUATION_TIMEOUT_MS={}: {}", raw, e),
            }
        }
        if let Some(raw) = non_empty("DEFAULT_EVALUATION_OPTIONS") {
            match serde_json::from_str::<EvaluationOptions>(&raw) {
                Ok(options) => self.evaluation.default_options = options,
                Err(e) => warn!(
                    "Failed to parse DEFAULT_EVALUATION_OPTIONS as a JSON object: {}",
                    e
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.state_capacity == 0 {
            return Err(ConfigError::Message(
                "cache.state_capacity must be greater than zero".into(),
            ));
        }
        if self.cache.manifest_capacity == 0 {
            return Err(ConfigError::Message(
                "cache.manifest_capacity must be greater than zero".into(),
            ));
        }
        if self.evaluation.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "evaluation.timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn state_cache_config(&self) -> CacheConfig {
        CacheConfig::new(
            self.cache.state_capacity,
            Duration::from_secs(self.cache.state_ttl_seconds),
        )
    }

    pub fn manifest_cache_config(&self) -> CacheConfig {
        CacheConfig::new(
            self.cache.manifest_capacity,
            Duration::from_secs(self.cache.manifest_ttl_seconds),
        )
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation.timeout_ms)
    }

    pub fn gateway_request_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.request_timeout_ms)
    }

    pub fn evaluator_request_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluator.request_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
