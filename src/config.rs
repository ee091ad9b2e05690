//! Client configuration management.
//!
//! Configuration is stored at `~/.config/splitsync/config.json`. The ledger
//! service URL can also be supplied through a `.env` file or the
//! `SPLITSYNC_API_URL` environment variable, which takes precedence over the
//! file.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "splitsync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured service URL
const API_URL_ENV: &str = "SPLITSYNC_API_URL";

/// Default base URL for a locally running ledger service
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    /// Id of the user to sync as; falls back to the first user the service
    /// knows about when unset.
    pub last_user_id: Option<i64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Pick up a .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Resolved service URL: environment override first, then the config
    /// file, then the localhost default.
    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }
}
