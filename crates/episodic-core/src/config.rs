use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::EpisodicError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub trakt: TraktConfig,
    pub tvdb: TvdbConfig,
    pub cloud: CloudConfig,
    pub outbound: OutboundConfig,
    pub network: NetworkConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktConfig {
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TvdbConfig {
    pub api_key: String,
}

/// Secondary cloud backup account. When signed in, watched and collected
/// state comes from the backup instead of trakt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    pub signed_in: bool,
}

/// Retry policy of the outbound queue replay worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub probe_addr: String,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub number_format: NumberFormat,
}

/// How season and episode numbers are shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    /// `1x02`
    #[default]
    Default,
    /// `S01E02`
    English,
}

impl NumberFormat {
    /// Format an episode number. An episode of `-1` names the whole season.
    pub fn format(self, season: i32, episode: i32) -> String {
        if episode < 0 {
            return format!("Season {season}");
        }
        match self {
            Self::Default => format!("{season}x{episode:02}"),
            Self::English => format!("S{season:02}E{episode:02}"),
        }
    }
}

impl AppConfig {
    /// Load config: the user file if it exists, otherwise the built-in defaults.
    pub fn load() -> Result<Self, EpisodicError> {
        let defaults: AppConfig =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| EpisodicError::Config(e.to_string()))?;

        let user_path = Self::config_path();
        if user_path.exists() {
            let user_str = std::fs::read_to_string(&user_path)?;
            let user: AppConfig =
                toml::from_str(&user_str).map_err(|e| EpisodicError::Config(e.to_string()))?;
            Ok(user)
        } else {
            Ok(defaults)
        }
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the database file.
    pub fn db_path() -> PathBuf {
        Self::data_dir().join("episodic.db")
    }

    /// Directory for the database and rolling log files.
    pub fn data_dir() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, EpisodicError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "episodic")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert!(!config.cloud.signed_in);
        assert_eq!(config.outbound.retry_base_secs, 5);
        assert_eq!(config.outbound.max_attempts, 10);
        assert_eq!(config.display.number_format, NumberFormat::Default);
        assert_eq!(config.network.probe_addr, "api.trakt.tv:443");
    }

    #[test]
    fn test_number_format() {
        assert_eq!(NumberFormat::Default.format(1, 2), "1x02");
        assert_eq!(NumberFormat::English.format(1, 2), "S01E02");
        assert_eq!(NumberFormat::English.format(3, -1), "Season 3");
    }

    #[test]
    fn test_partial_user_config_is_rejected() {
        // User files replace the defaults wholesale, so every section is required.
        let result: Result<AppConfig, _> = toml::from_str("[trakt]\nclient_id = \"abc\"\n");
        assert!(result.is_err());
    }
}
