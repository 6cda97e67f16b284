//! Configuration management for toolshell
//!
//! Loads and saves client settings and resolves client profiles. Nothing in
//! here reads process state on its own: environment overrides go through
//! [`Config::apply_env`] with an explicit lookup function.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;
pub mod profiles;

pub use paths::{config_path, data_dir, expand_home};
pub use profiles::{builtin_profiles, CommandStyleConfig, ProfileConfig, ThoughtToolConfig};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variables consulted for the translator key, highest priority first
pub const API_KEY_ENV_VARS: &[&str] = &[
    "TOOLSHELL_API_KEY",
    "GOOGLE_API_KEY",
    "OPENROUTER_API_KEY",
    "OPENAI_API_KEY",
];

/// Environment variable overriding the endpoint URL
pub const ENDPOINT_URL_ENV_VAR: &str = "TOOLSHELL_ENDPOINT_URL";

/// Natural-language translator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_translator_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_keep_history")]
    pub keep_history: bool,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_translator_timeout(),
            keep_history: default_keep_history(),
            max_history_messages: default_max_history_messages(),
        }
    }
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_translator_timeout() -> u64 {
    30
}

fn default_keep_history() -> bool {
    true
}

fn default_max_history_messages() -> usize {
    20
}

/// Tool server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_endpoint_url")]
    pub url: String,
    #[serde(default = "default_endpoint_timeout")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            timeout_secs: default_endpoint_timeout(),
        }
    }
}

fn default_endpoint_url() -> String {
    "http://localhost:5001".to_string()
}

fn default_endpoint_timeout() -> u64 {
    60
}

/// Sequence driver bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_step_pause_ms")]
    pub step_pause_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            step_pause_ms: default_step_pause_ms(),
        }
    }
}

fn default_max_iterations() -> u32 {
    25
}

fn default_step_pause_ms() -> u64 {
    500
}

fn default_profile_name() -> String {
    "generic".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default = "default_profile_name")]
    pub default_profile: String,
    /// User profiles; a name shared with a built-in replaces it
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translator: TranslatorConfig::default(),
            endpoint: EndpointConfig::default(),
            driver: DriverConfig::default(),
            default_profile: default_profile_name(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("◆ loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// `TOOLSHELL_API_KEY` always wins; the vendor variables only fill an
    /// empty key. `TOOLSHELL_ENDPOINT_URL` replaces the endpoint URL.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let found = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = found(API_KEY_ENV_VARS[0]) {
            self.translator.api_key = key;
        } else if self.translator.api_key.is_empty() {
            if let Some(key) = API_KEY_ENV_VARS[1..].iter().find_map(|name| found(*name)) {
                self.translator.api_key = key;
            }
        }

        if let Some(url) = found(ENDPOINT_URL_ENV_VAR) {
            self.endpoint.url = url;
        }
    }

    /// Translator key, if one is configured
    pub fn api_key(&self) -> Option<String> {
        let key = self.translator.api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Resolve a profile: user profiles first, then built-ins
    pub fn profile(&self, name: &str) -> Result<ProfileConfig> {
        if let Some(profile) = self.profiles.get(name) {
            return Ok(profile.clone());
        }
        builtin_profiles()
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// All profile names, built-ins merged with user profiles
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = builtin_profiles().into_keys().collect();
        for name in self.profiles.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    /// Endpoint URL for a profile (profile override, else global)
    pub fn endpoint_url_for(&self, profile: &ProfileConfig) -> String {
        profile
            .endpoint_url
            .clone()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.endpoint.url.clone())
    }

    pub fn translator_timeout(&self) -> Duration {
        Duration::from_secs(self.translator.timeout_secs)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint.timeout_secs)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.driver.step_pause_ms)
    }
}

/// Write a default config at the default location unless one exists
pub async fn init() -> Result<Config> {
    let path = config_path();

    if path.exists() {
        warn!("◆ config already present at {:?}", path);
    } else {
        Config::default().save_to(&path).await?;
        info!("◆ config written to {:?}", path);
    }

    Config::load_from(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_profile, "generic");
        assert_eq!(config.driver.max_iterations, 25);
        assert_eq!(config.driver.step_pause_ms, 500);
        assert_eq!(config.endpoint.url, "http://localhost:5001");
        assert_eq!(config.endpoint.timeout_secs, 60);
        assert_eq!(config.translator.timeout_secs, 30);
        assert_eq!(config.translator.temperature, 0.1);
        assert!(config.translator.keep_history);
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_apply_env_primary_key_wins() {
        let mut config = Config::default();
        config.translator.api_key = "from-file".to_string();
        config.apply_env(env(&[
            ("TOOLSHELL_API_KEY", "primary"),
            ("GOOGLE_API_KEY", "google"),
        ]));
        assert_eq!(config.api_key(), Some("primary".to_string()));
    }

    #[test]
    fn test_apply_env_vendor_key_fills_only_empty() {
        let mut config = Config::default();
        config.apply_env(env(&[("GOOGLE_API_KEY", "google")]));
        assert_eq!(config.api_key(), Some("google".to_string()));

        let mut config = Config::default();
        config.translator.api_key = "from-file".to_string();
        config.apply_env(env(&[("OPENAI_API_KEY", "openai")]));
        assert_eq!(config.api_key(), Some("from-file".to_string()));
    }

    #[test]
    fn test_apply_env_ignores_blank_values() {
        let mut config = Config::default();
        config.apply_env(env(&[("TOOLSHELL_API_KEY", "  "), ("OPENROUTER_API_KEY", "or")]));
        assert_eq!(config.api_key(), Some("or".to_string()));
    }

    #[test]
    fn test_apply_env_endpoint_url() {
        let mut config = Config::default();
        config.apply_env(env(&[("TOOLSHELL_ENDPOINT_URL", "http://tools:9000")]));
        assert_eq!(config.endpoint.url, "http://tools:9000");
    }

    #[test]
    fn test_unknown_profile() {
        let config = Config::default();
        match config.profile("nope") {
            Err(ConfigError::UnknownProfile(name)) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownProfile, got {:?}", other),
        }
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.translator_timeout(), Duration::from_secs(30));
        assert_eq!(config.endpoint_timeout(), Duration::from_secs(60));
        assert_eq!(config.step_pause(), Duration::from_millis(500));
    }
}
