use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::image::ImageFormat;
use crate::project::Model;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_width: u32,
    pub max_height: u32,
    pub image_format: ImageFormat,
    // Archive entries smaller than this are not real images
    pub min_archive_entry_bytes: u64,
    pub endpoint: String,
    pub model: Model,
    // Name of the environment variable holding the provider key
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    pub store_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            image_format: ImageFormat::default(),
            min_archive_entry_bytes: 1000,
            endpoint: "https://fal.run".to_string(),
            model: Model::GeminiFlashEdit,
            api_key_env: "FAL_KEY".to_string(),
            request_timeout_secs: 120,
            store_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Option<Self> {
        let config_path = Self::config_path()?;

        fs::read_to_string(&config_path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
    }

    pub fn save(&self) -> Option<()> {
        let config_path = Self::config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).ok()?;
        }

        serde_json::to_string_pretty(self)
            .ok()
            .and_then(|json| fs::write(&config_path, json).ok())
    }

    fn config_path() -> Option<PathBuf> {
        let home = std::env::home_dir()?;
        Some(home.join(".config").join("restyle").join("config.json"))
    }

    /// The project store file: the configured path, else `~/.local/share/restyle/projects.json`
    pub fn store_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.store_path {
            return Some(path.clone());
        }
        let home = std::env::home_dir()?;
        Some(
            home.join(".local")
                .join("share")
                .join("restyle")
                .join("projects.json"),
        )
    }

    pub fn max_dimensions(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[test]
fn partial_config_file_fills_defaults() {
    let config: Config = serde_json::from_str(r#"{ "max_width": 1024 }"#).unwrap();

    assert_eq!(config.max_width, 1024);
    assert_eq!(config.max_height, 800);
    assert_eq!(config.image_format, ImageFormat::Jpeg { quality: 80 });
    assert_eq!(config.api_key_env, "FAL_KEY");
}

#[test]
fn explicit_store_path_wins() {
    let config = Config {
        store_path: Some(PathBuf::from("/tmp/elsewhere.json")),
        ..Config::default()
    };
    assert_eq!(config.store_path(), Some(PathBuf::from("/tmp/elsewhere.json")));
}
