use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
/// Persisted UI/application settings for ImageSpark.
pub struct AppConfig {
    pub window_width: Option<f32>,
    pub window_height: Option<f32>,
    /// `"light"` forces light mode; anything else means dark.
    pub theme: Option<String>,
    /// Bare username string; there is no verification behind it.
    pub username: Option<String>,
    pub backend_endpoint: Option<String>,
    pub backend_api_key: Option<String>,
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("imagespark").join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        toml::from_str(&contents).unwrap_or_default()
    }

    /// Writes config to disk, ignoring filesystem/serialization errors.
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(s) = toml::to_string_pretty(self) {
            let _ = std::fs::write(&path, s);
        }
    }

    pub fn dark_mode(&self) -> bool {
        self.theme.as_deref() != Some("light")
    }

    /// Endpoint and key for the hosted backend, with env overrides.
    pub fn backend_settings(&self) -> (String, String) {
        let endpoint = std::env::var("IMAGESPARK_ENDPOINT")
            .ok()
            .or_else(|| self.backend_endpoint.clone())
            .unwrap_or_else(|| "https://api.imagespark.dev/v1/generate".to_string());
        let api_key = std::env::var("IMAGESPARK_API_KEY")
            .ok()
            .or_else(|| self.backend_api_key.clone())
            .unwrap_or_default();
        (endpoint, api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dark_mode_is_the_default_theme() {
        assert!(AppConfig::default().dark_mode());
        let light = AppConfig {
            theme: Some("light".to_string()),
            ..Default::default()
        };
        assert!(!light.dark_mode());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = AppConfig {
            username: Some("ada".to_string()),
            theme: Some("light".to_string()),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.username.as_deref(), Some("ada"));
        assert_eq!(parsed.theme.as_deref(), Some("light"));
    }
}
