use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration shared by the CLI and the GUI.
///
/// Stored as `config.json` next to the executable. Environment variables
/// `OPENAI_API_KEY` and `IMAGE_PATH` override the file (see [`Config::apply_env`]).
///
/// # Loading
///
/// ```rust,no_run
/// use geotitle::config::Config;
///
/// let mut config = Config::load(Some("config.json".as_ref())).unwrap();
/// config.apply_env();
/// config.openai.api_key = "sk-...".into();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Captioning service credentials and model.
    pub openai: OpenAiConfig,
    /// Prompts and preprocessing for title inference.
    pub title: TitleConfig,
    /// Geocoding service.
    pub geocoder: GeocoderConfig,
    /// Limits applied to every outgoing request.
    pub network: NetworkConfig,
    /// Folder pre-filled in the front ends.
    pub image_path: Option<String>,
}

/// OpenAI chat-completions configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

/// How titles are requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Longest edge of the image sent for captioning.
    pub max_edge: u32,
    /// JPEG quality of the re-encoded copy.
    pub jpeg_quality: u8,
}

/// Nominatim-compatible geocoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    /// Sent as `User-Agent`; Nominatim rejects anonymous clients.
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are an AI specialized in generating creative photography titles in Japanese. Respond with only the title in Japanese, no additional text.".to_string(),
            user_prompt: "この写真のための創造的で芸術的なタイトルを提供してください。".to_string(),
            max_edge: 512,
            jpeg_quality: 85,
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("geotitle/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            title: TitleConfig::default(),
            geocoder: GeocoderConfig::default(),
            network: NetworkConfig::default(),
            image_path: None,
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` in the executable's directory.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Overlay `OPENAI_API_KEY` and `IMAGE_PATH` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("IMAGE_PATH").ok(),
        );
    }

    fn apply_overrides(&mut self, api_key: Option<String>, image_path: Option<String>) {
        if let Some(key) = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            self.openai.api_key = key;
        }
        if let Some(dir) = image_path.filter(|p| !p.trim().is_empty()) {
            self.image_path = Some(dir);
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.openai.api_key.trim().is_empty()
    }
}
