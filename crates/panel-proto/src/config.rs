use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Music API application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_client_id")]
    pub client_id: u64,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Permissions requested on login.
    #[serde(default = "default_scope")]
    pub scope: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PanelSize {
    pub width: u32,
    pub height: u32,
}

impl PanelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Panel dimensions for each visible section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_login_size")]
    pub login: PanelSize,
    #[serde(default = "default_playlist_size")]
    pub playlist: PanelSize,
    #[serde(default = "default_empty_playlist_size")]
    pub empty_playlist: PanelSize,
    #[serde(default = "default_error_size")]
    pub error: PanelSize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Markup for one playlist row.  Recognised placeholders:
    /// `%number%`, `%author%`, `%title%`, `%duration%`.
    #[serde(default = "default_item_template")]
    pub item_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Key/value store holding the access token.
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            api_version: default_api_version(),
            scope: default_scope(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            login: default_login_size(),
            playlist: default_playlist_size(),
            empty_playlist: default_empty_playlist_size(),
            error: default_error_size(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            item_template: default_item_template(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

fn default_client_id() -> u64 {
    5655803
}

fn default_api_version() -> String {
    "5.57".to_string()
}

fn default_scope() -> String {
    "audio,offline".to_string()
}

fn default_login_size() -> PanelSize {
    PanelSize::new(250, 180)
}

fn default_playlist_size() -> PanelSize {
    PanelSize::new(500, 900)
}

fn default_empty_playlist_size() -> PanelSize {
    PanelSize::new(250, 100)
}

fn default_error_size() -> PanelSize {
    PanelSize::new(250, 100)
}

fn default_item_template() -> String {
    "<li class=\"audio audio-%number%\" data-number=\"%number%\">%author% - %title% <span>%duration%</span></li>".to_string()
}

fn default_store_file() -> PathBuf {
    platform::data_dir().join("store.json")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
