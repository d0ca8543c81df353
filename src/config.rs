use std::{env, path::PathBuf, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use schema_bridge::DEFAULT_REQUEST_TIMEOUT;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const REQUEST_TIMEOUT_KEY: &str = "META_SCHEMA_REQUEST_TIMEOUT_MS";
pub const LOG_LEVEL_KEY: &str = "META_SCHEMA_LOG_LEVEL";
pub const LOG_DIR_KEY: &str = "META_SCHEMA_LOG_DIR";
pub const HANDSHAKE_EVENT_KEY: &str = "META_SCHEMA_HANDSHAKE_EVENT";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} is read-only")]
    ReadOnly(&'static str),
}

#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn as_vec(&self) -> Vec<(String, String)> {
        let mut config = vec![];
        for key in self.keys().await {
            if let Some(value) = self.get(&key).await {
                config.push((key, value));
            }
        }
        config
    }
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
    fn clone_box(&self) -> Box<dyn ConfigSource>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigSource>);

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Process environment, optionally seeded from a `.env` file.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: Option<PathBuf>,
}

impl EnvConfigManager {
    pub fn new(env_file: Option<PathBuf>) -> Box<Self> {
        if let Some(path) = &env_file {
            match dotenvy::from_path(path) {
                Ok(()) => info!("Loaded .env from {}", path.display()),
                Err(e) => warn!("could not load .env from {}: {e}", path.display()),
            }
        }
        Box::new(Self { env_file })
    }
}

#[async_trait]
impl ConfigSource for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), ConfigError> {
        Err(ConfigError::ReadOnly("process environment"))
    }

    fn clone_box(&self) -> Box<dyn ConfigSource> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        match &self.env_file {
            Some(path) => format!("EnvConfigManager({})", path.display()),
            None => "EnvConfigManager".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MapConfigManager {
    #[schemars(with = "std::collections::HashMap<String, String>")]
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Box<Self> {
        let mgr = Self::new();
        for (k, v) in pairs {
            mgr.map.insert(k.to_string(), v.to_string());
        }
        mgr
    }
}

#[async_trait]
impl ConfigSource for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn ConfigSource> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

/// Runtime settings for an embedded editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditorConfig {
    pub request_timeout_ms: u64,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub handshake_event: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            log_level: "info".to_string(),
            log_dir: None,
            handshake_event: "WIDGET_READY".to_string(),
        }
    }
}

impl EditorConfig {
    /// Defaults overlaid with whatever `config` provides.
    pub async fn load(config: &ConfigManager) -> Result<Self, ConfigError> {
        let mut out = Self::default();

        if let Some(raw) = config.0.get(REQUEST_TIMEOUT_KEY).await {
            out.request_timeout_ms = match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        key: REQUEST_TIMEOUT_KEY,
                        value: raw,
                        reason: "must be greater than zero".into(),
                    });
                }
                Ok(ms) => ms,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: REQUEST_TIMEOUT_KEY,
                        value: raw,
                        reason: e.to_string(),
                    });
                }
            };
        }

        if let Some(raw) = config.0.get(LOG_LEVEL_KEY).await {
            let level = raw.trim().to_lowercase();
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::Invalid {
                    key: LOG_LEVEL_KEY,
                    value: raw,
                    reason: format!("expected one of {}", LOG_LEVELS.join("|")),
                });
            }
            out.log_level = level;
        }

        if let Some(raw) = config.0.get(LOG_DIR_KEY).await {
            let raw = raw.trim();
            if !raw.is_empty() {
                out.log_dir = Some(PathBuf::from(raw));
            }
        }

        if let Some(raw) = config.0.get(HANDSHAKE_EVENT_KEY).await {
            let raw = raw.trim();
            if !raw.is_empty() {
                out.handshake_event = raw.to_string();
            }
        }

        Ok(out)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
