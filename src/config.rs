//! Configuration loading.
//!
//! Settings live in a TOML file (`~/.nudge/config.toml` by default, or
//! `NUDGE_CONFIG`). Every field has a default; a missing config file yields
//! the defaults with a warning, matching the fail-soft handling of the data
//! files. The API key additionally falls back to the `AI_API_KEY`
//! environment variable.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identity and persona of the assistant.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub user_name: String,
    pub bot_name: String,
    /// Free-form persona instructions woven into the system prompt.
    pub persona: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            user_name: "User".into(),
            bot_name: "Nudge".into(),
            persona: "Be warm, concise, and practical.".into(),
        }
    }
}

/// LLM endpoint settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
        }
    }
}

/// On-disk locations for state files.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root for tasks, archives, and the memory index. Defaults to
    /// `~/.nudge`.
    pub state_dir: Option<PathBuf>,
    /// Optional directory of prompt template overrides.
    pub prompt_dir: Option<PathBuf>,
}

/// Full application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub user: UserConfig,
    pub ai: AiConfig,
    pub paths: PathsConfig,
}

impl AppConfig {
    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// Missing or malformed files produce the defaults with a warning.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var_os("NUDGE_CONFIG") {
                Some(p) => PathBuf::from(p),
                None => default_state_dir().join("config.toml"),
            },
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                return Self::default().with_env_fallbacks();
            }
            Err(e) => {
                warn!("cannot read config {}: {e}, using defaults", path.display());
                return Self::default().with_env_fallbacks();
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => config.with_env_fallbacks(),
            Err(e) => {
                warn!("malformed config {}: {e}, using defaults", path.display());
                Self::default().with_env_fallbacks()
            }
        }
    }

    fn with_env_fallbacks(mut self) -> Self {
        if self.ai.api_key.is_empty() {
            if let Ok(key) = std::env::var("AI_API_KEY") {
                self.ai.api_key = key;
            }
        }
        self
    }

    /// Root directory for all persisted state.
    pub fn state_dir(&self) -> PathBuf {
        self.paths
            .state_dir
            .clone()
            .unwrap_or_else(default_state_dir)
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.state_dir().join("tasks.json")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.state_dir().join("memory")
    }

    pub fn memory_index_file(&self) -> PathBuf {
        self.state_dir().join("memory.json")
    }
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nudge")
}
