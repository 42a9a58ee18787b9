//! Persisted config (Ollama endpoint, models, search defaults, etc.) in the app data directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.1";
pub const DEFAULT_COLLECTION: &str = "products";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Ollama server used for embeddings and chat.
    pub ollama_url: String,
    pub embed_model: String,
    pub chat_model: String,
    /// Vector store collection that product embeddings are written to.
    pub collection: String,
    pub search: SearchDefaults,
    pub chat: ChatSettings,
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            search: SearchDefaults::default(),
            chat: ChatSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

/// Defaults for searches typed by a user (CLI and HTTP). The chat tool has its own fixed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub limit: usize,
    pub min_score: f32,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            limit: 20,
            min_score: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Upper bound on one assistant reply, tool calls included.
    pub max_duration_secs: u64,
    /// Maximum model turns per reply.
    pub max_steps: usize,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
            max_steps: 5,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Config {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Set a single value by its dotted key (e.g. `search.min_score`).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        };
        match key {
            "ollama_url" => {
                url::Url::parse(value).map_err(|e| invalid(e.to_string()))?;
                self.ollama_url = value.to_string();
            }
            "embed_model" => self.embed_model = value.to_string(),
            "chat_model" => self.chat_model = value.to_string(),
            "collection" => {
                if value.is_empty() || value.contains(['/', '\\']) {
                    return Err(invalid("expected a plain, non-empty name".to_string()));
                }
                self.collection = value.to_string();
            }
            "search.limit" => {
                let limit: usize = value.parse().map_err(|e| invalid(format!("{e}")))?;
                if limit == 0 {
                    return Err(invalid("must be positive".to_string()));
                }
                self.search.limit = limit;
            }
            "search.min_score" => {
                let score: f32 = value.parse().map_err(|e| invalid(format!("{e}")))?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(invalid("must be between 0 and 1".to_string()));
                }
                self.search.min_score = score;
            }
            "chat.max_duration_secs" => {
                self.chat.max_duration_secs = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "chat.max_steps" => {
                self.chat.max_steps = value.parse().map_err(|e| invalid(format!("{e}")))?;
            }
            "chat.system_prompt" => {
                self.chat.system_prompt = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            "server.listen_addr" => self.server.listen_addr = value.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    load_config_from(&data_dir.join(CONFIG_FILENAME))
}

/// Load config from an explicit file. Returns default config if missing or invalid.
pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    match toml::from_str(&s) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            Config::default()
        }
    }
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, config.to_toml()?).map_err(ConfigError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
